use std::{sync::Arc, time::Duration};

use crate::{
    acquire::Acquirer,
    auth::AllowList,
    cleanup::CleanupPolicy,
    config::Config,
    transcode::Transcoder,
    transport::TransferGate,
};

/// Read-only state shared by all handlers.
pub struct State {
    pub allow_list: AllowList,
    pub self_hosted: bool,
    pub acquirer: Acquirer,
    pub transcoder: Transcoder,
    pub cleanup: CleanupPolicy,
    pub gate: Arc<TransferGate>,
    pub write_timeout: Duration,
}

impl State {
    pub fn new(config: &Config, http: reqwest::Client) -> Self {
        let gate = Arc::new(TransferGate::new(
            config.http.max_connections,
            config.http.pool_timeout(),
        ));
        Self {
            allow_list: config.telegram.allowed_users.clone(),
            self_hosted: config.telegram.self_hosted(),
            acquirer: Acquirer::new(config, http, gate.clone()),
            transcoder: Transcoder::new(config),
            cleanup: CleanupPolicy::new(config),
            gate,
            write_timeout: config.http.write_timeout(),
        }
    }
}

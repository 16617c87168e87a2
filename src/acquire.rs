//! Getting the source video onto local disk.
//!
//! Strategies are tried in [`Strategy::ORDER`]; the first one that resolves
//! wins. A strategy that does not apply is skipped, a failing one is
//! recorded and the next one is tried.

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::{
    config::{Param, TelegramConfig},
    constants::DOWNLOAD_FILE_NAME,
    transport::{ChatTransport, RemoteFile, TransferGate},
    utils::redact_token,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Read the file from the self-hosted server's cache directory.
    LocalCache,
    /// Plain GET against the file-serving url.
    DirectHttp,
    /// The transport's own download primitive.
    BotApi,
}

impl Strategy {
    pub const ORDER: [Strategy; 3] = [Self::LocalCache, Self::DirectHttp, Self::BotApi];
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::LocalCache => "local-cache",
            Self::DirectHttp => "direct-http",
            Self::BotApi => "bot-api",
        })
    }
}

/// A readable video on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSource {
    pub path: PathBuf,
    /// The file lives in the Bot API cache rather than our working directory.
    pub in_shared_cache: bool,
}

pub enum Attempt {
    Resolved(LocalSource),
    NotApplicable,
    Failed(anyhow::Error),
}

#[derive(Debug, Error)]
#[error("all download strategies failed: {}", fmt_failures(.failures))]
pub struct AcquireError {
    pub failures: Vec<(Strategy, String)>,
}

fn fmt_failures(failures: &[(Strategy, String)]) -> String {
    if failures.is_empty() {
        return "no strategy applied".to_string();
    }
    failures
        .iter()
        .map(|(s, e)| format!("{s}: {e}"))
        .collect::<Vec<_>>()
        .join("; ")
}

pub struct Acquirer {
    self_hosted: bool,
    cache_root: PathBuf,
    file_url_prefix: String,
    token: String,
    http: reqwest::Client,
    gate: Arc<TransferGate>,
}

impl Acquirer {
    pub fn new<C: Param<TelegramConfig>>(
        cfg: &C,
        http: reqwest::Client,
        gate: Arc<TransferGate>,
    ) -> Self {
        let tg = cfg.param();
        Self {
            self_hosted: tg.self_hosted(),
            file_url_prefix: tg.file_url_prefix(),
            cache_root: tg.cache_root,
            token: tg.token,
            http,
            gate,
        }
    }

    pub async fn acquire<T: ChatTransport + ?Sized>(
        &self,
        transport: &T,
        file: &RemoteFile,
        workdir: &Path,
    ) -> Result<LocalSource, AcquireError> {
        let dest = workdir.join(DOWNLOAD_FILE_NAME);
        let mut failures = Vec::new();
        for strategy in Strategy::ORDER {
            let attempt = match strategy {
                Strategy::LocalCache => self.local_cache(file).await,
                Strategy::DirectHttp => self.direct_http(file, &dest).await,
                Strategy::BotApi => self.bot_api(transport, file, &dest).await,
            };
            match attempt {
                Attempt::Resolved(source) => {
                    tracing::info!(
                        "Source resolved by {strategy}: {}",
                        redact_token(&source.path.display().to_string(), &self.token)
                    );
                    return Ok(source);
                }
                Attempt::NotApplicable => {
                    tracing::debug!("Strategy {strategy} not applicable");
                }
                Attempt::Failed(e) => {
                    let reason = redact_token(&format!("{e:#}"), &self.token);
                    tracing::warn!("Strategy {strategy} failed: {reason}");
                    failures.push((strategy, reason));
                }
            }
        }
        Err(AcquireError { failures })
    }

    async fn local_cache(&self, file: &RemoteFile) -> Attempt {
        if !self.self_hosted {
            return Attempt::NotApplicable;
        }
        let Some(candidate) = pick_local_path(&file.path, &self.cache_root) else {
            return Attempt::NotApplicable;
        };
        let readable = match tokio::fs::metadata(&candidate).await {
            Ok(meta) if meta.is_file() => tokio::fs::File::open(&candidate).await.is_ok(),
            _ => false,
        };
        if !readable {
            return Attempt::NotApplicable;
        }
        Attempt::Resolved(LocalSource {
            in_shared_cache: candidate.starts_with(&self.cache_root),
            path: candidate,
        })
    }

    async fn direct_http(&self, file: &RemoteFile, dest: &Path) -> Attempt {
        let url = direct_file_url(&self.file_url_prefix, &file.path);
        tracing::info!("Direct downloading from {}", redact_token(&url, &self.token));
        match self.stream_to_file(&url, dest).await {
            Ok(written) => {
                tracing::info!("Direct download completed: {written} bytes");
                Attempt::Resolved(LocalSource {
                    path: dest.to_path_buf(),
                    in_shared_cache: false,
                })
            }
            Err(e) => Attempt::Failed(e),
        }
    }

    async fn stream_to_file(&self, url: &str, dest: &Path) -> anyhow::Result<u64> {
        let _permit = self.gate.acquire().await?;
        let mut resp = self.http.get(url).send().await?.error_for_status()?;
        let mut out = tokio::fs::File::create(dest)
            .await
            .with_context(|| format!("create {}", dest.display()))?;
        let mut written = 0u64;
        while let Some(chunk) = resp.chunk().await? {
            out.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        out.flush().await?;
        Ok(written)
    }

    async fn bot_api<T: ChatTransport + ?Sized>(
        &self,
        transport: &T,
        file: &RemoteFile,
        dest: &Path,
    ) -> Attempt {
        let _permit = match self.gate.acquire().await {
            Ok(permit) => permit,
            Err(e) => return Attempt::Failed(e),
        };
        match transport.download_file(&file.path, dest).await {
            Ok(()) => Attempt::Resolved(LocalSource {
                path: dest.to_path_buf(),
                in_shared_cache: false,
            }),
            Err(e) => Attempt::Failed(e),
        }
    }
}

/// Find a local filesystem path in what `getFile` returned.
///
/// The path may embed the cache root (sometimes behind a url prefix) or be
/// an absolute path on its own. Existence is not checked here.
pub fn pick_local_path(file_path: &str, cache_root: &Path) -> Option<PathBuf> {
    let file_path = file_path.trim();
    if file_path.is_empty() {
        return None;
    }
    let root = cache_root.to_string_lossy();
    if !root.is_empty() {
        if let Some(idx) = file_path.find(root.as_ref()) {
            return Some(PathBuf::from(&file_path[idx..]));
        }
    }
    if file_path.starts_with('/') {
        return Some(PathBuf::from(file_path));
    }
    None
}

/// Build `<prefix>/<file_path>`; full http(s) urls are used as they are.
pub fn direct_file_url(prefix: &str, file_path: &str) -> String {
    let fp = file_path.trim();
    if fp.starts_with("http://") || fp.starts_with("https://") {
        return fp.to_string();
    }
    format!("{prefix}/{}", fp.trim_start_matches('/'))
}

use thiserror::Error;

use crate::{
    acquire::AcquireError,
    format::{
        MSG_DOWNLOAD_FAILED, MSG_INTERNAL_ERROR, MSG_SEND_FAILED, MSG_TRANSCODE_FAILED,
    },
    transcode::TranscodeError,
};

/// Failures of a single video request. None of them is fatal to the bot.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("get_file failed: {0:#}")]
    Resolve(anyhow::Error),
    #[error(transparent)]
    Download(#[from] AcquireError),
    #[error("unable to create working directory: {0}")]
    Workspace(#[source] std::io::Error),
    #[error("transcode failed: {0}")]
    Transcode(#[from] TranscodeError),
    #[error("send failed: {0:#}")]
    Send(anyhow::Error),
}

impl RelayError {
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Resolve(_) | Self::Download(_) => "download",
            Self::Workspace(_) => "workspace",
            Self::Transcode(_) => "transcode",
            Self::Send(_) => "send",
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Resolve(_) | Self::Download(_) => MSG_DOWNLOAD_FAILED,
            Self::Workspace(_) => MSG_INTERNAL_ERROR,
            Self::Transcode(_) => MSG_TRANSCODE_FAILED,
            Self::Send(_) => MSG_SEND_FAILED,
        }
    }
}

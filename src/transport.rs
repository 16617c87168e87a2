//! Chat transport seam.
//!
//! The relay only talks to telegram through [`ChatTransport`], so the
//! pipeline can be driven by a recording fake in tests.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use teloxide::{
    net::Download,
    payloads::{SendAudioSetters, SendDocumentSetters},
    prelude::*,
    types::{ChatAction, InputFile, MessageId, ReplyParameters},
};
use tokio::{
    io::AsyncWriteExt,
    sync::{Semaphore, SemaphorePermit},
};

use crate::{config::HttpConfig, utils::SendMessageSettersExt};

/// Metadata returned by `getFile`.
#[derive(Clone, Debug)]
pub struct RemoteFile {
    /// Relative path on the public API, absolute local path on a
    /// self-hosted server running with `--local`.
    pub path: String,
    pub size: u32,
}

#[derive(Clone, Debug)]
pub struct Upload {
    pub path: PathBuf,
    pub file_name: String,
    pub caption: String,
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn resolve_file(&self, file_id: &str) -> anyhow::Result<RemoteFile>;

    /// Download through the Bot API file endpoint.
    async fn download_file(&self, file_path: &str, dest: &Path) -> anyhow::Result<()>;

    async fn send_text(
        &self,
        chat_id: ChatId,
        reply_to: Option<MessageId>,
        text: &str,
    ) -> anyhow::Result<MessageId>;

    async fn edit_text(&self, chat_id: ChatId, message_id: MessageId, text: &str)
        -> anyhow::Result<()>;

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> anyhow::Result<()>;

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> anyhow::Result<()>;

    async fn send_audio(
        &self,
        chat_id: ChatId,
        reply_to: MessageId,
        upload: &Upload,
    ) -> anyhow::Result<()>;

    async fn send_document(
        &self,
        chat_id: ChatId,
        reply_to: MessageId,
        upload: &Upload,
    ) -> anyhow::Result<()>;
}

pub struct TelegramTransport {
    bot: Bot,
    write_timeout: Duration,
}

impl TelegramTransport {
    pub fn new(bot: Bot, write_timeout: Duration) -> Self {
        Self { bot, write_timeout }
    }

    async fn bounded_upload<F>(&self, what: &str, fut: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = Result<Message, teloxide::RequestError>> + Send,
    {
        match tokio::time::timeout(self.write_timeout, fut).await {
            Ok(res) => res.map(|_| ()).with_context(|| format!("{what} failed")),
            Err(_) => bail!("{what} timed out after {:?}", self.write_timeout),
        }
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn resolve_file(&self, file_id: &str) -> anyhow::Result<RemoteFile> {
        let file = self.bot.get_file(file_id).await?;
        Ok(RemoteFile {
            path: file.path,
            size: file.meta.size,
        })
    }

    async fn download_file(&self, file_path: &str, dest: &Path) -> anyhow::Result<()> {
        let mut dst = tokio::fs::File::create(dest).await?;
        self.bot.download_file(file_path, &mut dst).await?;
        dst.flush().await?;
        Ok(())
    }

    async fn send_text(
        &self,
        chat_id: ChatId,
        reply_to: Option<MessageId>,
        text: &str,
    ) -> anyhow::Result<MessageId> {
        let msg = self
            .bot
            .send_message(chat_id, text)
            .reply_to_message_id_opt(reply_to)
            .await?;
        Ok(msg.id)
    }

    async fn edit_text(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
    ) -> anyhow::Result<()> {
        self.bot.edit_message_text(chat_id, message_id, text).await?;
        Ok(())
    }

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> anyhow::Result<()> {
        self.bot.delete_message(chat_id, message_id).await?;
        Ok(())
    }

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> anyhow::Result<()> {
        self.bot.send_chat_action(chat_id, action).await?;
        Ok(())
    }

    async fn send_audio(
        &self,
        chat_id: ChatId,
        reply_to: MessageId,
        upload: &Upload,
    ) -> anyhow::Result<()> {
        let audio = InputFile::file(upload.path.clone()).file_name(upload.file_name.clone());
        let req = self
            .bot
            .send_audio(chat_id, audio)
            .caption(upload.caption.clone())
            .reply_parameters(ReplyParameters::new(reply_to));
        self.bounded_upload("send_audio", req.send()).await
    }

    async fn send_document(
        &self,
        chat_id: ChatId,
        reply_to: MessageId,
        upload: &Upload,
    ) -> anyhow::Result<()> {
        let document = InputFile::file(upload.path.clone()).file_name(upload.file_name.clone());
        let req = self
            .bot
            .send_document(chat_id, document)
            .caption(upload.caption.clone())
            .reply_parameters(ReplyParameters::new(reply_to));
        self.bounded_upload("send_document", req.send()).await
    }
}

/// Bounds the number of concurrent file transfers.
///
/// Waiting for a free slot is limited by the pool timeout.
pub struct TransferGate {
    permits: Semaphore,
    wait: Duration,
}

impl TransferGate {
    pub fn new(max_transfers: usize, wait: Duration) -> Self {
        Self {
            permits: Semaphore::new(max_transfers.clamp(1, Semaphore::MAX_PERMITS)),
            wait,
        }
    }

    pub async fn acquire(&self) -> anyhow::Result<SemaphorePermit<'_>> {
        match tokio::time::timeout(self.wait, self.permits.acquire()).await {
            Ok(permit) => permit.map_err(|_| anyhow!("transfer gate closed")),
            Err(_) => bail!("no free transfer slot within {:?}", self.wait),
        }
    }
}

/// HTTP client shared by the bot and direct downloads.
///
/// No total deadline is set, so long transfers survive as long as data keeps
/// arriving within the read timeout. Uploads are bounded by
/// [`TelegramTransport`].
pub fn build_http_client(cfg: &HttpConfig) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .tcp_nodelay(true)
        .connect_timeout(cfg.connect_timeout())
        .read_timeout(cfg.read_timeout())
        .pool_idle_timeout(cfg.pool_timeout())
        .pool_max_idle_per_host(cfg.max_keepalive)
        .build()
}

//! One video request from arrival to cleanup.

use std::path::PathBuf;

use teloxide::types::{ChatAction, ChatId, Message, MessageId};
use tempfile::TempDir;

use crate::{
    acquire::LocalSource,
    cleanup::remove_workdir,
    constants::WORKDIR_PREFIX,
    error::RelayError,
    format::{MsgCaption, MSG_FFMPEG_MISSING, MSG_RECEIVED, MSG_SENDING},
    state::State,
    transport::{ChatTransport, Upload},
    utils::suggest_filename,
};

/// A video-like attachment: video, video note or a `video/*` document.
#[derive(Clone, Debug)]
pub struct VideoAttachment {
    pub file_id: String,
    pub size: u32,
    pub file_name: Option<String>,
}

impl VideoAttachment {
    pub fn from_message(msg: &Message) -> Option<Self> {
        if let Some(video) = msg.video() {
            return Some(Self {
                file_id: video.file.id.clone(),
                size: video.file.size,
                file_name: video.file_name.clone(),
            });
        }
        if let Some(note) = msg.video_note() {
            return Some(Self {
                file_id: note.file.id.clone(),
                size: note.file.size,
                file_name: None,
            });
        }
        let document = msg.document()?;
        let is_video = document
            .mime_type
            .as_ref()
            .is_some_and(|m| m.essence_str().starts_with("video/"));
        is_video.then(|| Self {
            file_id: document.file.id.clone(),
            size: document.file.size,
            file_name: document.file_name.clone(),
        })
    }
}

#[derive(Clone, Debug)]
pub struct VideoRequest {
    /// `None` for messages without a sender, e.g. channel posts.
    pub sender: Option<u64>,
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub attachment: VideoAttachment,
}

/// Handle a video request end to end.
///
/// Unauthorized senders are dropped without any outbound call. Every other
/// failure is reported to the chat and never escapes this function.
pub async fn handle_video<T: ChatTransport + ?Sized>(
    transport: &T,
    state: &State,
    req: VideoRequest,
) {
    if !state.allow_list.permits_sender(req.sender) {
        tracing::debug!("Ignore video from unauthorized sender {:?}", req.sender);
        return;
    }

    if !state.transcoder.available().await {
        tracing::error!("Transcoder is not available");
        if let Err(e) = transport
            .send_text(req.chat_id, Some(req.message_id), MSG_FFMPEG_MISSING)
            .await
        {
            tracing::warn!("Failed to send message: {e:#}");
        }
        return;
    }

    let status = match transport
        .send_text(req.chat_id, Some(req.message_id), MSG_RECEIVED)
        .await
    {
        Ok(id) => Some(id),
        Err(e) => {
            tracing::warn!("Failed to send status message: {e:#}");
            None
        }
    };
    chat_action(transport, req.chat_id, ChatAction::Typing).await;

    let mut job = Job {
        transport,
        state,
        req: &req,
        status,
        workdir: None,
        source: None,
        output: None,
    };
    let result = job.run().await;
    job.cleanup().await;

    match result {
        Ok(()) => {
            tracing::info!("Audio delivered to chat {}", req.chat_id);
            if let Some(status) = job.status {
                if let Err(e) = transport.delete_message(req.chat_id, status).await {
                    tracing::debug!("Failed to delete status message: {e:#}");
                }
            }
        }
        Err(e) => {
            tracing::error!(stage = e.stage(), "Processing error: {e}");
            job.report(e.user_message()).await;
        }
    }
}

struct Job<'a, T: ?Sized> {
    transport: &'a T,
    state: &'a State,
    req: &'a VideoRequest,
    status: Option<MessageId>,
    workdir: Option<TempDir>,
    source: Option<LocalSource>,
    output: Option<PathBuf>,
}

impl<T: ChatTransport + ?Sized> Job<'_, T> {
    async fn run(&mut self) -> Result<(), RelayError> {
        let attachment = &self.req.attachment;
        tracing::info!(
            "Calling get_file for file_id={} size={}",
            attachment.file_id,
            attachment.size
        );
        let file = self
            .transport
            .resolve_file(&attachment.file_id)
            .await
            .map_err(RelayError::Resolve)?;
        tracing::info!("get_file ok: file_size={}", file.size);

        let workdir = tempfile::Builder::new()
            .prefix(WORKDIR_PREFIX)
            .tempdir()
            .map_err(RelayError::Workspace)?;
        let workdir = self.workdir.insert(workdir).path().to_path_buf();

        let source = self
            .state
            .acquirer
            .acquire(self.transport, &file, &workdir)
            .await?;
        let input = source.path.clone();
        self.source = Some(source);

        let format = self.state.transcoder.format();
        let file_name = suggest_filename(attachment.file_name.as_deref(), format.extension());
        let output = workdir.join(&file_name);
        self.output = Some(output.clone());

        // `run` fails unless the output exists, so nothing is sent without it
        self.state.transcoder.run(&input, &output).await?;

        self.report(MSG_SENDING).await;
        chat_action(self.transport, self.req.chat_id, ChatAction::UploadDocument).await;

        let upload = Upload {
            path: output,
            file_name,
            caption: MsgCaption(format).to_string(),
        };
        self.deliver(&upload).await
    }

    /// `sendAudio`, falling back to `sendDocument` once.
    async fn deliver(&self, upload: &Upload) -> Result<(), RelayError> {
        let _permit = self.state.gate.acquire().await.map_err(RelayError::Send)?;
        let (chat_id, reply_to) = (self.req.chat_id, self.req.message_id);
        match self.transport.send_audio(chat_id, reply_to, upload).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!("send_audio failed, fallback to send_document: {e:#}");
                self.transport
                    .send_document(chat_id, reply_to, upload)
                    .await
                    .map_err(RelayError::Send)
            }
        }
    }

    async fn cleanup(&mut self) {
        if let Some(output) = &self.output {
            self.state.cleanup.remove_output(output).await;
        }
        if let Some(source) = &self.source {
            self.state.cleanup.remove_source(source).await;
        }
        if let Some(workdir) = self.workdir.take() {
            remove_workdir(workdir.path()).await;
        }
    }

    /// Edit the status message, or send a new one if there is none.
    async fn report(&self, text: &str) {
        let res = match self.status {
            Some(status) => self.transport.edit_text(self.req.chat_id, status, text).await,
            None => self
                .transport
                .send_text(self.req.chat_id, Some(self.req.message_id), text)
                .await
                .map(|_| ()),
        };
        if let Err(e) = res {
            tracing::warn!("Failed to report to chat {}: {e:#}", self.req.chat_id);
        }
    }
}

async fn chat_action<T: ChatTransport + ?Sized>(transport: &T, chat_id: ChatId, action: ChatAction) {
    if let Err(e) = transport.send_chat_action(chat_id, action).await {
        tracing::debug!("Failed to send chat action: {e:#}");
    }
}

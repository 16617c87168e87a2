//! Shared fixtures for unit tests.

use std::{
    io::Write,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicI32, Ordering},
        Mutex as StdMutex, OnceLock,
    },
    time::Duration,
};

use async_trait::async_trait;
use teloxide::types::{ChatAction, ChatId, MessageId};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
    sync::Mutex,
};

use crate::transport::{ChatTransport, RemoteFile, Upload};

/// Tests that spawn processes hold this lock while writing and running
/// scripts, so no concurrent fork inherits a script opened for writing.
pub fn process_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

pub enum FakeFfmpeg {
    Succeed,
    Fail,
    NoOutput,
    /// Never finishes on its own.
    Hang,
}

/// Write a shell script that behaves like ffmpeg for our purposes.
/// Arguments of the last conversion are recorded in `<dir>/ffmpeg.args`.
pub fn fake_ffmpeg(dir: &Path, mode: FakeFfmpeg) -> PathBuf {
    let args_log = dir.join("ffmpeg.args");
    let body = match mode {
        FakeFfmpeg::Succeed => "for last in \"$@\"; do :; done\nprintf 'ID3fake' > \"$last\"\n",
        FakeFfmpeg::Fail => "echo 'Invalid data found when processing input' >&2\nexit 1\n",
        FakeFfmpeg::NoOutput => "exit 0\n",
        FakeFfmpeg::Hang => "exec sleep 30\n",
    };
    let script = format!(
        "#!/bin/sh\n[ \"$1\" = \"-version\" ] && exit 0\necho \"$@\" > '{}'\n{body}",
        args_log.display()
    );

    let path = dir.join("ffmpeg");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(script.as_bytes()).unwrap();
    file.sync_all().unwrap();
    drop(file);
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

pub fn recorded_args(dir: &Path) -> Option<String> {
    std::fs::read_to_string(dir.join("ffmpeg.args")).ok()
}

/// Serve every request on a local port with the same response.
///
/// With a non-zero `byte_delay` the body is written one byte at a time.
/// Returns the base url of the server.
pub async fn serve_http(status: u16, body: &'static [u8], byte_delay: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let reason = if status == 200 { "OK" } else { "Not Found" };
                let head = format!(
                    "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    body.len()
                );
                if socket.write_all(head.as_bytes()).await.is_err() {
                    return;
                }
                if byte_delay.is_zero() {
                    let _ = socket.write_all(body).await;
                } else {
                    for byte in body {
                        tokio::time::sleep(byte_delay).await;
                        if socket.write_all(&[*byte]).await.is_err() {
                            return;
                        }
                        let _ = socket.flush().await;
                    }
                }
                let _ = socket.shutdown().await;
            });
        }
    });
    format!("http://{addr}")
}

#[derive(Clone, Debug)]
pub struct SentUpload {
    pub path: PathBuf,
    pub file_name: String,
    pub caption: String,
    /// Whether the file was on disk when the upload was attempted.
    pub existed: bool,
}

#[derive(Clone, Debug)]
pub enum Event {
    ResolveFile(String),
    Download(String),
    SendText(String),
    EditText(String),
    Delete(MessageId),
    ChatAction,
    SendAudio(SentUpload),
    SendDocument(SentUpload),
}

/// In-memory [`ChatTransport`] recording every call.
pub struct RecordingTransport {
    file_path: String,
    fail_downloads: bool,
    reject_audio: bool,
    reject_document: bool,
    next_id: AtomicI32,
    events: StdMutex<Vec<Event>>,
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self {
            file_path: "videos/file_0.mp4".into(),
            fail_downloads: false,
            reject_audio: false,
            reject_document: false,
            next_id: AtomicI32::new(100),
            events: StdMutex::new(Vec::new()),
        }
    }
}

impl RecordingTransport {
    /// `getFile` answers with the given path.
    pub fn resolving_to(file_path: String) -> Self {
        Self {
            file_path,
            ..Default::default()
        }
    }

    pub fn failing_downloads() -> Self {
        Self {
            fail_downloads: true,
            ..Default::default()
        }
    }

    pub fn rejecting_audio(mut self) -> Self {
        self.reject_audio = true;
        self
    }

    pub fn rejecting_document(mut self) -> Self {
        self.reject_document = true;
        self
    }

    fn record(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn downloads(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, Event::Download(_)))
            .count()
    }

    pub fn sent_audio(&self) -> Vec<SentUpload> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::SendAudio(u) => Some(u),
                _ => None,
            })
            .collect()
    }

    /// Text of the last message sent or edited.
    pub fn last_text(&self) -> Option<String> {
        self.events().into_iter().rev().find_map(|e| match e {
            Event::SendText(t) | Event::EditText(t) => Some(t),
            _ => None,
        })
    }
}

fn snapshot(upload: &Upload) -> SentUpload {
    SentUpload {
        path: upload.path.clone(),
        file_name: upload.file_name.clone(),
        caption: upload.caption.clone(),
        existed: upload.path.exists(),
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn resolve_file(&self, file_id: &str) -> anyhow::Result<RemoteFile> {
        self.record(Event::ResolveFile(file_id.to_string()));
        Ok(RemoteFile {
            path: self.file_path.clone(),
            size: 45 * 1024 * 1024,
        })
    }

    async fn download_file(&self, file_path: &str, dest: &Path) -> anyhow::Result<()> {
        self.record(Event::Download(file_path.to_string()));
        if self.fail_downloads {
            anyhow::bail!("file is too big");
        }
        tokio::fs::write(dest, b"downloaded video").await?;
        Ok(())
    }

    async fn send_text(
        &self,
        _chat_id: ChatId,
        _reply_to: Option<MessageId>,
        text: &str,
    ) -> anyhow::Result<MessageId> {
        self.record(Event::SendText(text.to_string()));
        Ok(MessageId(self.next_id.fetch_add(1, Ordering::Relaxed)))
    }

    async fn edit_text(
        &self,
        _chat_id: ChatId,
        _message_id: MessageId,
        text: &str,
    ) -> anyhow::Result<()> {
        self.record(Event::EditText(text.to_string()));
        Ok(())
    }

    async fn delete_message(&self, _chat_id: ChatId, message_id: MessageId) -> anyhow::Result<()> {
        self.record(Event::Delete(message_id));
        Ok(())
    }

    async fn send_chat_action(&self, _chat_id: ChatId, _action: ChatAction) -> anyhow::Result<()> {
        self.record(Event::ChatAction);
        Ok(())
    }

    async fn send_audio(
        &self,
        _chat_id: ChatId,
        _reply_to: MessageId,
        upload: &Upload,
    ) -> anyhow::Result<()> {
        self.record(Event::SendAudio(snapshot(upload)));
        if self.reject_audio {
            anyhow::bail!("Bad Request: wrong file type");
        }
        Ok(())
    }

    async fn send_document(
        &self,
        _chat_id: ChatId,
        _reply_to: MessageId,
        upload: &Upload,
    ) -> anyhow::Result<()> {
        self.record(Event::SendDocument(snapshot(upload)));
        if self.reject_document {
            anyhow::bail!("Request Entity Too Large");
        }
        Ok(())
    }
}

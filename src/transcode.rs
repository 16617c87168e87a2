//! ffmpeg invocation.
//!
//! The transcoder is an opaque external process: it gets an input path, an
//! output path and codec arguments, and must exit with status zero after
//! writing the output file.

use std::{
    ffi::OsString,
    fmt,
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
    str::FromStr,
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;
use tokio::process::Command;

use crate::{
    config::{ConfigError, Param, TranscodeConfig},
    constants::FFMPEG_STDERR_TAIL,
};

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(try_from = "String")]
pub enum AudioFormat {
    Mp3,
    M4a,
    Aac,
    Opus,
    Ogg,
    Oga,
    Flac,
    Wav,
}

impl AudioFormat {
    pub const ALL: [AudioFormat; 8] = [
        Self::Mp3,
        Self::M4a,
        Self::Aac,
        Self::Opus,
        Self::Ogg,
        Self::Oga,
        Self::Flac,
        Self::Wav,
    ];

    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::M4a => "m4a",
            Self::Aac => "aac",
            Self::Opus => "opus",
            Self::Ogg => "ogg",
            Self::Oga => "oga",
            Self::Flac => "flac",
            Self::Wav => "wav",
        }
    }

    pub fn codec(self) -> &'static str {
        match self {
            Self::Mp3 => "libmp3lame",
            Self::M4a | Self::Aac => "aac",
            Self::Opus | Self::Ogg | Self::Oga => "libopus",
            Self::Flac => "flac",
            Self::Wav => "pcm_s16le",
        }
    }

    /// Lossless formats ignore the configured bitrate.
    pub fn is_lossy(self) -> bool {
        !matches!(self, Self::Flac | Self::Wav)
    }

    fn variable_bitrate(self) -> bool {
        self.codec() == "libopus"
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for AudioFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ext = s.trim().trim_start_matches('.').to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|f| f.extension() == ext)
            .ok_or_else(|| ConfigError::UnknownFormat(s.to_string()))
    }
}

impl TryFrom<String> for AudioFormat {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("unable to run {bin}: {source}")]
    Spawn {
        bin: String,
        #[source]
        source: std::io::Error,
    },
    #[error("ffmpeg exited with {status}")]
    Exit { status: ExitStatus, stderr: String },
    #[error("ffmpeg did not finish within {0:?}")]
    Timeout(Duration),
    #[error("ffmpeg reported success but {0} is missing")]
    MissingOutput(PathBuf),
}

#[derive(Clone, Debug)]
pub struct Transcoder {
    bin: String,
    format: AudioFormat,
    bitrate: String,
    timeout: Duration,
}

impl Transcoder {
    pub fn new<C: Param<TranscodeConfig>>(cfg: &C) -> Self {
        let cfg = cfg.param();
        let timeout = cfg.timeout();
        Self {
            bin: cfg.ffmpeg_bin,
            format: cfg.format,
            timeout,
            bitrate: cfg.bitrate,
        }
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn bitrate(&self) -> &str {
        &self.bitrate
    }

    /// Whether `<bin> -version` runs successfully.
    pub async fn available(&self) -> bool {
        Command::new(&self.bin)
            .arg("-version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    pub fn args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-y".into(),
            "-i".into(),
            input.into(),
            "-vn".into(),
            "-acodec".into(),
            self.format.codec().into(),
        ];
        if self.format.is_lossy() && !self.bitrate.is_empty() {
            args.push("-b:a".into());
            args.push(self.bitrate.as_str().into());
        }
        if self.format.variable_bitrate() {
            args.push("-vbr".into());
            args.push("on".into());
        }
        args.push(output.into());
        args
    }

    /// Run ffmpeg and make sure the output file exists afterwards.
    ///
    /// A run exceeding the timeout is killed.
    pub async fn run(&self, input: &Path, output: &Path) -> Result<(), TranscodeError> {
        let args = self.args(input, output);
        tracing::info!("Running ffmpeg: {} {:?}", self.bin, args);
        let mut cmd = Command::new(&self.bin);
        cmd.args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let out = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| TranscodeError::Timeout(self.timeout))?
            .map_err(|source| TranscodeError::Spawn {
                bin: self.bin.clone(),
                source,
            })?;

        if !out.status.success() {
            let tail = out.stderr.len().saturating_sub(FFMPEG_STDERR_TAIL);
            let stderr = String::from_utf8_lossy(&out.stderr[tail..]).into_owned();
            tracing::error!("ffmpeg failed: {stderr}");
            return Err(TranscodeError::Exit {
                status: out.status,
                stderr,
            });
        }
        if !tokio::fs::try_exists(output).await.unwrap_or(false) {
            return Err(TranscodeError::MissingOutput(output.to_path_buf()));
        }
        Ok(())
    }
}

//! User facing texts.

use std::fmt::{Display, Formatter, Result};

use crate::transcode::AudioFormat;

pub const MSG_HELP: &str =
    "Just send me a video and I will extract its audio track. Use /start to see the current settings.";
pub const MSG_NOT_VIDEO: &str = "Please send me a video file.";
pub const MSG_FFMPEG_MISSING: &str =
    "ffmpeg is not installed or not working on the server. Please try again later.";
pub const MSG_RECEIVED: &str = "Video received, preparing and converting audio, please wait...";
pub const MSG_SENDING: &str = "Conversion done, sending audio...";
pub const MSG_DOWNLOAD_FAILED: &str = "Processing failed: could not fetch the video. It may be too large, or the network or volume permissions are misconfigured. Please try again later.";
pub const MSG_TRANSCODE_FAILED: &str =
    "Conversion failed: ffmpeg could not process this video. Make sure the video is valid or try again later.";
pub const MSG_SEND_FAILED: &str = "Sending the audio failed, please try again later.";
pub const MSG_INTERNAL_ERROR: &str = "Something went wrong and has been logged. Please try again later.";

pub struct MsgStart<'a> {
    pub format: AudioFormat,
    pub bitrate: &'a str,
    pub self_hosted: bool,
}

impl Display for MsgStart<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        writeln!(
            f,
            "Send me a video and I will convert it to audio and send it back."
        )?;
        writeln!(f, "- Output format: {}", self.format)?;
        if self.format.is_lossy() {
            writeln!(f, "- Bitrate: {}", self.bitrate)?;
        }
        if self.self_hosted {
            write!(f, "\nRunning against a self-hosted Bot API server, large files are welcome.")
        } else {
            write!(f, "\nVideos are limited to the public Bot API size limit.")
        }
    }
}

pub struct MsgCaption(pub AudioFormat);

impl Display for MsgCaption {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(
            f,
            "Audio extracted from video ({})",
            self.0.extension().to_ascii_uppercase()
        )
    }
}

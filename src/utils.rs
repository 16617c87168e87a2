use std::path::Path;

use teloxide::types::{MessageId, ReplyParameters};

use crate::constants::DEFAULT_OUTPUT_STEM;

/// Build the output file name from the name of the original upload.
///
/// Only alphanumerics, spaces, `-` and `_` of the stem survive; if nothing
/// is left the stem falls back to `audio`.
pub fn suggest_filename(original: Option<&str>, ext: &str) -> String {
    let stem = original
        .and_then(|name| Path::new(name).file_stem())
        .map(|stem| stem.to_string_lossy())
        .unwrap_or_default();
    let safe: String = stem
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let safe = safe.trim();
    let stem = if safe.is_empty() {
        DEFAULT_OUTPUT_STEM
    } else {
        safe
    };
    format!("{stem}.{}", ext.trim_start_matches('.'))
}

/// Hide the bot token before a url hits the logs.
pub fn redact_token(text: &str, token: &str) -> String {
    if token.is_empty() {
        return text.to_string();
    }
    text.replace(token, "<token>")
}

pub trait SendMessageSettersExt {
    fn reply_to_message_id_opt(self, message_id: Option<MessageId>) -> Self;
}

impl<T: teloxide::payloads::SendMessageSetters> SendMessageSettersExt for T {
    fn reply_to_message_id_opt(self, message_id: Option<MessageId>) -> Self {
        if let Some(message_id) = message_id {
            self.reply_parameters(ReplyParameters::new(message_id))
        } else {
            self
        }
    }
}

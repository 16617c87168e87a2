//! Centralized constants for the tgv2a bot.
//!
//! Defaults here are used when neither the config file nor the
//! environment provides a value.

// ============================================================================
// Telegram / Bot API Settings
// ============================================================================

/// Public Bot API endpoint, used when no self-hosted server is configured.
pub const PUBLIC_API_URL: &str = "https://api.telegram.org";

/// Directory where a self-hosted Bot API server in `--local` mode keeps files.
/// Layout below it is `<root>/<bot-token>/<file-path>`.
pub const DEFAULT_CACHE_ROOT: &str = "/var/lib/telegram-bot-api";

// ============================================================================
// HTTP Settings
// ============================================================================

pub const DEFAULT_CONNECT_TIMEOUT_SECS: f64 = 30.0;
pub const DEFAULT_READ_TIMEOUT_SECS: f64 = 600.0;
pub const DEFAULT_WRITE_TIMEOUT_SECS: f64 = 600.0;
pub const DEFAULT_POOL_TIMEOUT_SECS: f64 = 60.0;

/// Upper bound of concurrent file transfers (downloads and uploads).
pub const DEFAULT_MAX_CONNECTIONS: usize = 100;

/// Idle keep-alive connections kept per host.
pub const DEFAULT_MAX_KEEPALIVE: usize = 20;

// ============================================================================
// Transcode Settings
// ============================================================================

pub const DEFAULT_FFMPEG_BIN: &str = "ffmpeg";
pub const DEFAULT_AUDIO_BITRATE: &str = "192k";

/// Upper bound of a single ffmpeg run.
pub const DEFAULT_TRANSCODE_TIMEOUT_SECS: f64 = 3600.0;

/// Bytes of ffmpeg stderr kept for logging on failure.
pub const FFMPEG_STDERR_TAIL: usize = 2000;

// ============================================================================
// Working Directory Settings
// ============================================================================

/// Prefix of the per-request temporary directory.
pub const WORKDIR_PREFIX: &str = "tg_v2a_";

/// File name a downloaded source video is stored under.
pub const DOWNLOAD_FILE_NAME: &str = "input_video";

/// Stem of the output file when the original name is unusable.
pub const DEFAULT_OUTPUT_STEM: &str = "audio";

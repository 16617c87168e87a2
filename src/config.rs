use std::{
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;

use crate::{
    auth::AllowList,
    constants::{
        DEFAULT_AUDIO_BITRATE, DEFAULT_CACHE_ROOT, DEFAULT_CONNECT_TIMEOUT_SECS,
        DEFAULT_FFMPEG_BIN, DEFAULT_MAX_CONNECTIONS, DEFAULT_MAX_KEEPALIVE,
        DEFAULT_POOL_TIMEOUT_SECS, DEFAULT_READ_TIMEOUT_SECS, DEFAULT_TRANSCODE_TIMEOUT_SECS,
        DEFAULT_WRITE_TIMEOUT_SECS, PUBLIC_API_URL,
    },
    transcode::AudioFormat,
};

pub trait Param<T> {
    fn param(&self) -> T;
}

impl<T: Clone> Param<T> for T {
    fn param(&self) -> T {
        self.clone()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unable to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unable to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("bot token is missing, set BOT_TOKEN or telegram.token")]
    MissingToken,
    #[error("unsupported audio format `{0}`")]
    UnknownFormat(String),
    #[error("invalid url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },
}

#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub http: HttpConfig,
    pub transcode: TranscodeConfig,
    pub cleanup: CleanupConfig,
}

impl Config {
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config_context = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = toml::from_str(&config_context)?;
        Ok(config)
    }

    /// Override file values with environment style variables.
    ///
    /// `lookup` is usually `std::env::var(..).ok()`; tests pass a map.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let tg = &mut self.telegram;
        if let Some(token) = lookup("BOT_TOKEN") {
            tg.token = token.trim().to_string();
        }
        if let Some(url) = lookup("TG_BASE_URL") {
            tg.api_url = Some(url);
        }
        if let Some(url) = lookup("TG_FILE_BASE_URL") {
            tg.file_url = Some(url);
        }
        if let Some(root) = lookup("BOT_API_LOCAL_ROOT") {
            tg.cache_root = PathBuf::from(root.trim());
        }
        if let Some(ids) = lookup("ALLOWED_USER_IDS") {
            tg.allowed_users = AllowList::parse(&ids);
        }

        let http = &mut self.http;
        env_parse(&lookup, "TG_CONNECT_TIMEOUT", &mut http.connect_timeout_secs);
        env_parse(&lookup, "TG_READ_TIMEOUT", &mut http.read_timeout_secs);
        env_parse(&lookup, "TG_WRITE_TIMEOUT", &mut http.write_timeout_secs);
        env_parse(&lookup, "TG_POOL_TIMEOUT", &mut http.pool_timeout_secs);
        env_parse(&lookup, "TG_MAX_CONNECTIONS", &mut http.max_connections);
        env_parse(&lookup, "TG_MAX_KEEPALIVE", &mut http.max_keepalive);

        let transcode = &mut self.transcode;
        if let Some(bin) = lookup("FFMPEG_BIN") {
            transcode.ffmpeg_bin = bin.trim().to_string();
        }
        if let Some(ext) = lookup("AUDIO_EXT") {
            transcode.format = ext.parse()?;
        }
        if let Some(bitrate) = lookup("AUDIO_BITRATE") {
            transcode.bitrate = bitrate.trim().to_string();
        }
        env_parse(&lookup, "FFMPEG_TIMEOUT", &mut transcode.timeout_secs);

        if let Some(v) = lookup("CLEANUP_OUTPUT") {
            self.cleanup.output = parse_bool(&v);
        }
        if let Some(v) = lookup("CLEANUP_LOCAL_SOURCE") {
            self.cleanup.local_source = parse_bool(&v);
        }
        Ok(())
    }

    /// Normalize urls and check the fields required at startup.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        let tg = &mut self.telegram;
        if tg.token.is_empty() {
            return Err(ConfigError::MissingToken);
        }
        tg.api_url = tg.api_url.as_deref().and_then(normalize_base_url);
        tg.file_url = tg.file_url.as_deref().and_then(normalize_base_url);
        for url in [tg.api_url.as_deref(), tg.file_url.as_deref()]
            .into_iter()
            .flatten()
        {
            reqwest::Url::parse(url).map_err(|e| ConfigError::InvalidUrl {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        }

        let http = &mut self.http;
        for (name, slot, default) in [
            ("connect timeout", &mut http.connect_timeout_secs, DEFAULT_CONNECT_TIMEOUT_SECS),
            ("read timeout", &mut http.read_timeout_secs, DEFAULT_READ_TIMEOUT_SECS),
            ("write timeout", &mut http.write_timeout_secs, DEFAULT_WRITE_TIMEOUT_SECS),
            ("pool timeout", &mut http.pool_timeout_secs, DEFAULT_POOL_TIMEOUT_SECS),
            (
                "ffmpeg timeout",
                &mut self.transcode.timeout_secs,
                DEFAULT_TRANSCODE_TIMEOUT_SECS,
            ),
        ] {
            positive_or_default(name, slot, default);
        }
        Ok(())
    }
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct TelegramConfig {
    pub token: String,
    /// Base url of a self-hosted Bot API server.
    pub api_url: Option<String>,
    /// Base url serving files, defaults to `api_url`.
    pub file_url: Option<String>,
    pub cache_root: PathBuf,
    pub allowed_users: AllowList,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_url: None,
            file_url: None,
            cache_root: PathBuf::from(DEFAULT_CACHE_ROOT),
            allowed_users: AllowList::default(),
        }
    }
}

impl TelegramConfig {
    pub fn self_hosted(&self) -> bool {
        self.api_url.is_some()
    }

    pub fn api_base(&self) -> &str {
        self.api_url.as_deref().unwrap_or(PUBLIC_API_URL)
    }

    pub fn file_base(&self) -> &str {
        self.file_url
            .as_deref()
            .or(self.api_url.as_deref())
            .unwrap_or(PUBLIC_API_URL)
    }

    /// `<file-base>/file/bot<token>`, direct file urls are built on it.
    pub fn file_url_prefix(&self) -> String {
        format!("{}/file/bot{}", self.file_base(), self.token)
    }
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct HttpConfig {
    pub connect_timeout_secs: f64,
    pub read_timeout_secs: f64,
    pub write_timeout_secs: f64,
    pub pool_timeout_secs: f64,
    pub max_connections: usize,
    pub max_keepalive: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
            write_timeout_secs: DEFAULT_WRITE_TIMEOUT_SECS,
            pool_timeout_secs: DEFAULT_POOL_TIMEOUT_SECS,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            max_keepalive: DEFAULT_MAX_KEEPALIVE,
        }
    }
}

impl HttpConfig {
    pub fn connect_timeout(&self) -> Duration {
        secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        secs(self.write_timeout_secs)
    }

    pub fn pool_timeout(&self) -> Duration {
        secs(self.pool_timeout_secs)
    }
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct TranscodeConfig {
    pub ffmpeg_bin: String,
    pub format: AudioFormat,
    pub bitrate: String,
    pub timeout_secs: f64,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        Self {
            ffmpeg_bin: DEFAULT_FFMPEG_BIN.to_string(),
            format: AudioFormat::Mp3,
            bitrate: DEFAULT_AUDIO_BITRATE.to_string(),
            timeout_secs: DEFAULT_TRANSCODE_TIMEOUT_SECS,
        }
    }
}

impl TranscodeConfig {
    pub fn timeout(&self) -> Duration {
        secs(self.timeout_secs)
    }
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct CleanupConfig {
    /// Delete the generated audio right after sending.
    pub output: bool,
    /// Delete the source video from the Bot API cache.
    pub local_source: bool,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            output: true,
            local_source: true,
        }
    }
}

impl Param<TelegramConfig> for Config {
    fn param(&self) -> TelegramConfig {
        self.telegram.clone()
    }
}

impl Param<HttpConfig> for Config {
    fn param(&self) -> HttpConfig {
        self.http.clone()
    }
}

impl Param<TranscodeConfig> for Config {
    fn param(&self) -> TranscodeConfig {
        self.transcode.clone()
    }
}

impl Param<CleanupConfig> for Config {
    fn param(&self) -> CleanupConfig {
        self.cleanup.clone()
    }
}

fn secs(v: f64) -> Duration {
    if v.is_finite() && v > 0.0 {
        Duration::from_secs_f64(v)
    } else {
        Duration::ZERO
    }
}

/// A zero or negative timeout would fail every request at once.
fn positive_or_default(name: &str, slot: &mut f64, default: f64) {
    if !(slot.is_finite() && *slot > 0.0) {
        tracing::warn!("Ignore non-positive {name} {slot}, using {default}s");
        *slot = default;
    }
}

pub fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn env_parse<F, T>(lookup: &F, name: &str, slot: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let Some(raw) = lookup(name) else {
        return;
    };
    match raw.trim().parse() {
        Ok(v) => *slot = v,
        Err(_) => tracing::warn!("Ignore invalid value of {name}: {raw:?}"),
    }
}

/// Trim whitespace, trailing slashes and the `/bot`, `/file/bot` suffixes
/// some deployments put into their base url.
pub fn normalize_base_url(raw: &str) -> Option<String> {
    let mut url = raw.trim().trim_end_matches('/');
    for suffix in ["/file/bot", "/bot"] {
        if let Some(stripped) = url.strip_suffix(suffix) {
            url = stripped.trim_end_matches('/');
            break;
        }
    }
    if url.is_empty() {
        None
    } else {
        Some(url.to_string())
    }
}

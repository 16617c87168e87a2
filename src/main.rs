mod acquire;
mod auth;
mod cleanup;
mod config;
mod constants;
mod error;
mod format;
mod handlers;
mod relay;
mod state;
#[cfg(test)]
mod testing;
mod transcode;
mod transport;
mod utils;

use std::{error::Error, path::Path, sync::Arc};

use clap::Parser;
use config::Config;
use state::State;
use teloxide::{prelude::*, utils::command::BotCommands};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// These commands are supported:
#[derive(BotCommands)]
#[command(rename_rule = "lowercase")]
enum Command {
    /// Display this text
    Help,
    /// Show current output settings
    Start,
}

#[derive(Parser, Debug, Default, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path of config toml file.
    #[arg(short, long)]
    pub config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config_file = Args::parse().config.or_else(|| {
        std::env::var("CONFIG_PATH")
            .ok()
            .and_then(|s| if s.is_empty() { None } else { Some(s) })
    });
    let mut config = match config_file {
        Some(path) => {
            tracing::info!("Use config file: {path}");
            Config::load_from(&path)?
        }
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            tracing::info!("Use config file: {DEFAULT_CONFIG_FILE}");
            Config::load_from(DEFAULT_CONFIG_FILE)?
        }
        None => {
            tracing::info!("No config file, using environment only");
            Config::default()
        }
    };
    config.apply_env(|key| std::env::var(key).ok())?;
    config.validate()?;
    tracing::info!("Config load successfully");

    let http = transport::build_http_client(&config.http)?;
    let mut bot = Bot::with_client(&config.telegram.token, http.clone());
    if config.telegram.self_hosted() {
        bot = bot.set_api_url(reqwest::Url::parse(config.telegram.api_base())?);
        tracing::info!(
            "Using self-hosted Bot API server: api_url={} | file_url={}",
            config.telegram.api_base(),
            config.telegram.file_base()
        );
    }

    let allow_list = &config.telegram.allowed_users;
    if allow_list.is_open() {
        tracing::info!("Authorization disabled (allow list empty). Bot is open to all users.");
    } else {
        tracing::info!(
            "Authorization enabled. Allowed user IDs: {:?}",
            allow_list.sorted()
        );
    }

    let state = Arc::new(State::new(&config, http));
    if !state.transcoder.available().await {
        tracing::warn!("ffmpeg is not available, videos will be rejected until it is installed");
    }

    let handler = Update::filter_message()
        .filter(handlers::authorized)
        .endpoint(handlers::message_handler);

    tracing::info!("Bot created and running");
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
    Ok(())
}

mod bot;
mod channels;
mod config;
mod db;
mod menus;
mod watermark;

use std::sync::Arc;

use anyhow::{Context, Result};
use teloxide::dispatching::UpdateFilterExt;
use teloxide::dptree;
use teloxide::prelude::*;
use tracing::{info, warn};

use crate::bot::{handle_callback, handle_commands, handle_photo, BotCommand};
use crate::channels::{handle_channel_post, handle_forwarded};
use crate::config::Config;
use crate::db::Db;
use crate::watermark::FontRegistry;

const DEFAULT_LOG_FILTER: &str = "info,reqwest=warn,teloxide=info";

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Parse CLI args for --config-json
    let mut config_json_arg: Option<String> = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if let Some(rest) = arg.strip_prefix("--config-json=") {
            config_json_arg = Some(rest.to_string());
            break;
        }
        if arg == "--config-json" {
            config_json_arg = args.next();
            break;
        }
    }

    let config = if let Some(json) = config_json_arg.as_deref() {
        Config::from_json_str(json).context("failed to parse --config-json")?
    } else {
        Config::load().context("failed to load config")?
    };

    // RUST_LOG wins, then log_level from config
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| {
            tracing_subscriber::EnvFilter::try_new(
                config.log_level.as_deref().unwrap_or(DEFAULT_LOG_FILTER),
            )
        })
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(env_filter).compact().init();
    if config_json_arg.is_some() {
        info!("Loaded config from --config-json");
    }

    let fonts = FontRegistry::load(&config.fonts_config, config.platform()).with_context(|| {
        format!(
            "failed to load fonts from {} for platform {}",
            config.fonts_config,
            config.platform()
        )
    })?;
    info!(
        platform = config.platform(),
        fonts = fonts.len(),
        default = %fonts.default_font().id,
        "Fonts loaded"
    );
    let fonts = Arc::new(fonts);

    let db = Db::open(&config.db_path).await.context("failed to open sqlite db")?;
    let db = Arc::new(db);

    // Seed the default channel from config if present and DB empty
    if db.default_channel_id().await?.is_none() {
        if let Some(id) = config.channel_id {
            db.set_default_channel_id(id).await?;
        }
    }

    // teloxide reads TELOXIDE_TOKEN from env by default
    let bot = match config.teloxide_token.as_deref() {
        Some(token) => Bot::new(token),
        None => Bot::from_env(),
    };
    let config_storage = Arc::new(tokio::sync::RwLock::new(config));

    // Log bot identity
    match bot.get_me().await {
        Ok(me) => {
            info!(
                id = me.id.0,
                username = me.user.username.as_deref().unwrap_or(""),
                "Bot started"
            );
        }
        Err(err) => warn!(error = %err, "Failed to fetch bot info"),
    }

    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .branch(
                    dptree::entry()
                        .filter_command::<BotCommand>()
                        .endpoint(handle_commands),
                )
                .branch(
                    dptree::filter(|msg: Message| msg.forward_origin().is_some())
                        .endpoint(handle_forwarded),
                )
                .branch(
                    dptree::filter(|msg: Message| msg.photo().is_some())
                        .endpoint(handle_photo),
                ),
        )
        .branch(Update::filter_channel_post().endpoint(handle_channel_post))
        .branch(Update::filter_callback_query().endpoint(handle_callback));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![config_storage, db, fonts])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

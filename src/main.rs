mod env_loader;
mod event;
mod handlers;
mod health;
mod log_config;
mod pending;
mod platform;
mod policy;
mod replies;
mod telegram;

use crate::env_loader::{Config, UpdateMode, load_env};
use crate::handlers::Handlers;
use crate::health::StatusState;
use crate::log_config::init_logging;
use crate::pending::PendingRegistry;
use crate::telegram::{BotContext, TelegramPlatform, run_polling, run_webhook, webhook_listener};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use teloxide::prelude::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment (including .env) and configure logging with defaults
    load_env();
    let config = Config::from_env()?;
    init_logging(&config.log_file, config.log_level)?;

    let bot = Bot::new(&config.token);
    if config.mode == UpdateMode::Polling {
        // A webhook left over from another deployment would block getUpdates.
        if let Err(e) = bot.delete_webhook().await {
            log::warn!("Could not delete webhook: {}", e);
        }
    }

    let (bot_user_id, bot_username) = match bot.get_me().await {
        Ok(me) => (Some(me.user.id.0 as i64), me.user.username.clone()),
        Err(e) => {
            log::warn!("Could not fetch bot identity via getMe: {}", e);
            (None, None)
        }
    };
    log::info!(
        "Starting verification bot as {} ({} mode)",
        bot_username.as_deref().unwrap_or("<unknown>"),
        config.mode.as_str()
    );

    let handlers = Handlers::new(
        TelegramPlatform::new(bot.clone()),
        Arc::new(PendingRegistry::new()),
        bot_user_id,
    );
    let registry = Arc::clone(handlers.registry());
    let status = StatusState {
        bot_username: bot_username.clone(),
        mode: config.mode.as_str(),
        registry: Arc::clone(&registry),
        started_at: Instant::now(),
    };
    let ctx = Arc::new(BotContext {
        handlers,
        bot_username,
    });

    let addr = SocketAddr::new(config.host, config.port);
    let mut app = health::router(status);
    let listener = match config.mode {
        UpdateMode::Polling => None,
        UpdateMode::Webhook(url) => {
            let (listener, routes) = webhook_listener(bot.clone(), addr, url).await?;
            app = app.merge(routes);
            Some(listener)
        }
    };

    // In polling mode a failing HTTP server is logged but never takes the bot down.
    let server = tokio::spawn(async move {
        if let Err(e) = health::serve(addr, app).await {
            log::error!("HTTP server failed: {:#}", e);
        }
    });

    match listener {
        Some(listener) => run_webhook(bot, ctx, listener).await,
        None => run_polling(bot, ctx).await,
    }
    log::info!("Dispatcher stopped, shutting down.");
    server.abort();

    if !registry.is_empty() {
        log::warn!(
            "{} pending verifications are dropped; those members stay restricted",
            registry.len()
        );
    }
    Ok(())
}

//! Liveness and status endpoint served next to the bot.

use crate::pending::PendingRegistry;
use axum::{Json, Router, extract::State, routing::get};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct StatusState {
    pub bot_username: Option<String>,
    /// `polling` or `webhook`.
    pub mode: &'static str,
    pub registry: Arc<PendingRegistry>,
    pub started_at: Instant,
}

/// Build the JSON body returned by `/status`.
pub fn status_report(state: &StatusState) -> Value {
    json!({
        "status": "ok",
        "bot": state.bot_username,
        "mode": state.mode,
        "pending": state.registry.len(),
        "uptime_secs": state.started_at.elapsed().as_secs(),
    })
}

async fn index() -> &'static str {
    "Bot is running"
}

async fn status(State(state): State<StatusState>) -> Json<Value> {
    Json(status_report(&state))
}

pub fn router(state: StatusState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/status", get(status))
        .with_state(state)
}

/// Serve `app` until the task is dropped. In webhook mode `app` also carries
/// the update route.
pub async fn serve(addr: SocketAddr, app: Router) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("HTTP server listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

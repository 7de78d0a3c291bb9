//! Webhook transport: Telegram POSTs each update to `/<bot token>`.

use std::{net::SocketAddr, sync::Arc};

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use teloxide::{
    prelude::*,
    types::{Update, UpdateKind},
};
use tracing::{info, warn};
use url::Url;

use kexo_core::config::Config;

use crate::{handlers, router::AppState};

pub const HEALTH_TEXT: &str = "Kexodrop bot is running";

#[derive(Clone)]
struct WebhookState {
    app: Arc<AppState>,
    token: Arc<str>,
}

/// Routes for the webhook server.
pub fn app(state: Arc<AppState>) -> Router {
    let token: Arc<str> = Arc::from(state.cfg.telegram_bot_token.as_str());
    Router::new()
        .route("/", get(health))
        .route("/{token}", post(handle_update))
        .with_state(WebhookState { app: state, token })
}

async fn health() -> &'static str {
    HEALTH_TEXT
}

async fn handle_update(
    State(state): State<WebhookState>,
    Path(token): Path<String>,
    body: Bytes,
) -> (StatusCode, &'static str) {
    if token.as_str() != &*state.token {
        warn!("webhook request with wrong token path");
        return (StatusCode::NOT_FOUND, "not found");
    }

    let update: Update = match serde_json::from_slice(&body) {
        Ok(u) => u,
        Err(e) => {
            // Acknowledge anyway so Telegram does not redeliver it forever.
            warn!(error = %e, "unparseable update");
            return (StatusCode::OK, "ok");
        }
    };

    if let UpdateKind::Message(msg) = &update.kind {
        if let Some(incoming) = handlers::text_message(msg) {
            handlers::process_text(state.app.clone(), incoming).await;
        }
    }

    (StatusCode::OK, "ok")
}

async fn register_webhook(bot: &Bot, cfg: &Config) -> anyhow::Result<()> {
    let Some(base) = &cfg.webhook_url else {
        info!("WEBHOOK_URL not set; assuming the webhook is registered externally");
        return Ok(());
    };
    let url = Url::parse(&format!("{base}/{}", cfg.telegram_bot_token))?;
    bot.set_webhook(url).await?;
    info!(base = %base, "webhook registered");
    Ok(())
}

pub async fn run_webhook(cfg: Arc<Config>) -> anyhow::Result<()> {
    let bot = crate::build_bot(&cfg.telegram_bot_token)?;
    let state = crate::router::build_state(cfg.clone(), bot.clone())?;
    crate::router::log_startup(&bot, &state).await;

    if let Err(e) = register_webhook(&bot, &cfg).await {
        warn!(error = %e, "setWebhook failed");
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.webhook_port));
    info!(addr = %addr, "webhook server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    info!("webhook server stopped");
    Ok(())
}

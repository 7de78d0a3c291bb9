//! Telegram update handlers.
//!
//! Each incoming text message is reduced to a `TextMessage`, routed through
//! `kexo-core`, and any resulting download job is dispatched according to
//! the configured `JobDispatch` mode.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

use kexo_core::{
    commands::{route, JobRequest},
    config::JobDispatch,
    domain::{ChatId, UserId},
    messaging::types::TextMessage,
};

use crate::router::AppState;

/// `None` for updates without text (photos, stickers, service messages).
pub fn text_message(msg: &Message) -> Option<TextMessage> {
    let text = msg.text()?;
    let user = msg.from();
    Some(TextMessage {
        chat_id: ChatId(msg.chat.id.0),
        user_id: user.map(|u| UserId(u.id.0 as i64)),
        username: user.and_then(|u| u.username.clone()),
        text: text.to_string(),
    })
}

pub async fn handle_message(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    if let Some(incoming) = text_message(&msg) {
        process_text(state, incoming).await;
    }
    Ok(())
}

/// Send the routed replies, then start the download job if there is one.
pub async fn process_text(state: Arc<AppState>, incoming: TextMessage) {
    let routed = route(&incoming, &state.ads);

    for reply in &routed.replies {
        if let Err(e) = state.messenger.send_text(incoming.chat_id, reply).await {
            tracing::warn!(chat_id = incoming.chat_id.0, error = %e, "failed to send reply");
        }
    }

    if let Some(job) = routed.job {
        dispatch_job(state, job).await;
    }
}

async fn dispatch_job(state: Arc<AppState>, job: JobRequest) {
    match state.cfg.dispatch {
        JobDispatch::Spawn => {
            tokio::spawn(async move {
                state.pipeline.run(&job).await;
            });
        }
        JobDispatch::Inline => {
            state.pipeline.run(&job).await;
        }
    }
}

//! Telegram adapter (teloxide).
//!
//! This crate implements the `kexo-core` MessagingPort over the Telegram Bot
//! API and hosts both update transports: long polling and the axum webhook.

use std::time::Duration;

use async_trait::async_trait;

use teloxide::{prelude::*, types::InputFile};

use tokio::time::sleep;

pub mod handlers;
pub mod router;
pub mod webhook;

#[cfg(test)]
mod test_support;

use kexo_core::{
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    media::MediaKind,
    messaging::{
        port::MessagingPort,
        types::{ChatAction, OutgoingMedia},
    },
    Result,
};

/// Uploads of a few hundred MB outlive teloxide's default 17s request timeout.
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(15 * 60);

/// Bot client with a timeout long enough for file uploads.
pub fn build_bot(token: &str) -> Result<Bot> {
    let client = teloxide::net::default_reqwest_settings()
        .timeout(UPLOAD_TIMEOUT)
        .build()
        .map_err(|e| Error::Config(format!("telegram client build error: {e}")))?;
    Ok(Bot::with_client(token, client))
}

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    fn msg_ref(chat_id: ChatId, msg: &Message) -> MessageRef {
        MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        }
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }
}

fn tg_action(action: ChatAction) -> teloxide::types::ChatAction {
    use teloxide::types::ChatAction as Tg;
    match action {
        ChatAction::UploadVideo => Tg::UploadVideo,
        // Telegram has no dedicated audio upload indicator.
        ChatAction::UploadAudio => Tg::UploadVoice,
        ChatAction::UploadPhoto => Tg::UploadPhoto,
        ChatAction::UploadDocument => Tg::UploadDocument,
    }
}

fn into_upload_error(e: Error) -> Error {
    match e {
        Error::External(msg) => Error::Upload(msg),
        other => other,
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| self.bot.send_message(Self::tg_chat(chat_id), text.to_string()))
            .await?;
        Ok(Self::msg_ref(chat_id, &msg))
    }

    async fn send_media(&self, chat_id: ChatId, media: OutgoingMedia) -> Result<MessageRef> {
        let chat = Self::tg_chat(chat_id);
        let file = InputFile::file(media.path.clone());
        let caption = media.caption;

        let msg = match media.kind {
            MediaKind::Video => {
                self.with_retry(|| {
                    let req = self.bot.send_video(chat, file.clone());
                    if caption.is_empty() {
                        req
                    } else {
                        req.caption(caption.clone())
                    }
                })
                .await
            }
            MediaKind::Audio => {
                self.with_retry(|| {
                    let req = self.bot.send_audio(chat, file.clone());
                    if caption.is_empty() {
                        req
                    } else {
                        req.caption(caption.clone())
                    }
                })
                .await
            }
            MediaKind::Photo => {
                self.with_retry(|| {
                    let req = self.bot.send_photo(chat, file.clone());
                    if caption.is_empty() {
                        req
                    } else {
                        req.caption(caption.clone())
                    }
                })
                .await
            }
            MediaKind::Document => {
                self.with_retry(|| {
                    let req = self.bot.send_document(chat, file.clone());
                    if caption.is_empty() {
                        req
                    } else {
                        req.caption(caption.clone())
                    }
                })
                .await
            }
        }
        .map_err(into_upload_error)?;

        tracing::debug!(chat_id = chat_id.0, kind = media.kind.label(), "media uploaded");
        Ok(Self::msg_ref(chat_id, &msg))
    }

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()> {
        let action = tg_action(action);
        self.with_retry(|| self.bot.send_chat_action(Self::tg_chat(chat_id), action))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_maps_to_voice_indicator() {
        assert_eq!(
            tg_action(ChatAction::UploadAudio),
            teloxide::types::ChatAction::UploadVoice
        );
        assert_eq!(
            tg_action(ChatAction::from(MediaKind::Document)),
            teloxide::types::ChatAction::UploadDocument
        );
    }

    #[test]
    fn transport_errors_on_upload_become_upload_errors() {
        let err = into_upload_error(Error::External("telegram error: Bad Request".into()));
        assert!(matches!(err, Error::Upload(_)));
        assert!(err.to_string().starts_with("upload failed: "));

        let io = into_upload_error(Error::Io(std::io::Error::other("disk")));
        assert!(matches!(io, Error::Io(_)));
    }

    #[test]
    fn bot_builds_with_upload_timeout() {
        assert!(build_bot("123:abc").is_ok());
    }
}

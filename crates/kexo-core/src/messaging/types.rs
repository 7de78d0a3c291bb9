use std::path::PathBuf;

use crate::{
    domain::{ChatId, UserId},
    media::MediaKind,
};

/// Incoming plain-text message, already stripped of Telegram specifics.
#[derive(Clone, Debug)]
pub struct TextMessage {
    pub chat_id: ChatId,
    pub user_id: Option<UserId>,
    pub username: Option<String>,
    pub text: String,
}

#[derive(Clone, Debug)]
pub struct OutgoingMedia {
    pub kind: MediaKind,
    pub path: PathBuf,
    pub caption: String,
}

/// Outgoing "chat action" (upload indicator).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatAction {
    UploadVideo,
    UploadAudio,
    UploadPhoto,
    UploadDocument,
}

impl From<MediaKind> for ChatAction {
    fn from(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Video => Self::UploadVideo,
            MediaKind::Audio => Self::UploadAudio,
            MediaKind::Photo => Self::UploadPhoto,
            MediaKind::Document => Self::UploadDocument,
        }
    }
}

//! In-memory ports shared by the handler and webhook tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use kexo_core::{
    config::{Config, ServiceProfile},
    domain::{ChatId, MessageId, MessageRef},
    messaging::{
        port::MessagingPort,
        types::{ChatAction, OutgoingMedia},
    },
    ports::{FetchRequest, FetchedFile, Fetcher, SizeProbe, SizeProber},
    Result,
};

use crate::router::AppState;

#[derive(Default)]
pub(crate) struct FakeMessenger {
    texts: Mutex<Vec<String>>,
    captions: Mutex<Vec<String>>,
}

impl FakeMessenger {
    pub(crate) fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }

    /// Captions of uploaded media, in upload order.
    pub(crate) fn uploads(&self) -> Vec<String> {
        self.captions.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        self.texts.lock().unwrap().push(text.to_string());
        Ok(MessageRef {
            chat_id,
            message_id: MessageId(1),
        })
    }

    async fn send_media(&self, chat_id: ChatId, media: OutgoingMedia) -> Result<MessageRef> {
        assert!(media.path.exists(), "uploaded file must exist at send time");
        self.captions.lock().unwrap().push(media.caption);
        Ok(MessageRef {
            chat_id,
            message_id: MessageId(2),
        })
    }

    async fn send_chat_action(&self, _chat_id: ChatId, _action: ChatAction) -> Result<()> {
        Ok(())
    }
}

struct UnknownSize;

#[async_trait]
impl SizeProber for UnknownSize {
    async fn probe(&self, _url: &str) -> SizeProbe {
        SizeProbe::Unknown
    }
}

struct WriteFile;

#[async_trait]
impl Fetcher for WriteFile {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchedFile> {
        let path = req.dest_dir.join("a.mp4");
        tokio::fs::write(&path, b"video").await?;
        Ok(FetchedFile {
            path,
            bytes: 5,
            display_name: "a.mp4".to_string(),
        })
    }
}

/// App state over fake ports. Admin id is 1.
pub(crate) fn state_with(
    dispatch: &str,
    messenger: FakeMessenger,
) -> (Arc<AppState>, Arc<FakeMessenger>) {
    let ts = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let temp_dir = std::env::temp_dir()
        .join(format!("kexo-telegram-test-{ts}"))
        .to_string_lossy()
        .into_owned();
    let dispatch = dispatch.to_string();

    let cfg = Config::from_source(ServiceProfile::polling(), |key| match key {
        "TELEGRAM_BOT_TOKEN" => Some("123:abc".to_string()),
        "ADMIN_IDS" => Some("1".to_string()),
        "TEMP_DIR" => Some(temp_dir.clone()),
        "JOB_DISPATCH" => Some(dispatch.clone()),
        _ => None,
    })
    .unwrap();

    let messenger = Arc::new(messenger);
    let state = AppState::new(
        Arc::new(cfg),
        messenger.clone(),
        Arc::new(UnknownSize),
        Arc::new(WriteFile),
    );
    (Arc::new(state), messenger)
}

//! Classification of inbound text messages.
//!
//! There is no conversation state: every message is classified on its own.

use crate::{
    ads::{AdTextStore, AdUpdate},
    domain::{ChatId, UserId},
    formatting::{ad_confirmation, NOT_AUTHORIZED_TEXT, START_TEXT, WELCOME_TEXT},
    messaging::types::TextMessage,
    urls::parse_download_url,
};

const GREETINGS: &[&str] = &["hello", "hi", "hey"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Start,
    SetAd(String),
    Download(String),
    Greeting,
    Fallback,
}

/// A URL message that should become a download job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobRequest {
    pub url: String,
    pub chat_id: ChatId,
    pub requester: Option<UserId>,
    pub username: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Routed {
    pub replies: Vec<String>,
    pub job: Option<JobRequest>,
}

/// Split `/cmd@botname args` into a lowercase command name and its arguments.
pub fn parse_command(text: &str) -> Option<(String, String)> {
    let text = text.trim();
    if !text.starts_with('/') {
        return None;
    }

    let mut parts = text.splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("");
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    Some((cmd, rest))
}

pub fn classify(text: &str) -> Action {
    if let Some((cmd, args)) = parse_command(text) {
        return match cmd.as_str() {
            "start" => Action::Start,
            "setad" => Action::SetAd(args.split_whitespace().collect::<Vec<_>>().join(" ")),
            _ => Action::Fallback,
        };
    }

    // URLs win over greetings: "hi" is a substring of too many links.
    if let Some(url) = parse_download_url(text) {
        return Action::Download(url.to_string());
    }

    let lower = text.to_lowercase();
    if GREETINGS.iter().any(|g| lower.contains(g)) {
        return Action::Greeting;
    }

    Action::Fallback
}

/// Apply the classification of `msg`: update the ad text when asked and
/// return the replies to send plus the download job, if any.
pub fn route(msg: &TextMessage, ads: &AdTextStore) -> Routed {
    match classify(&msg.text) {
        Action::Start => Routed {
            replies: vec![START_TEXT.to_string()],
            job: None,
        },
        Action::SetAd(text) => {
            let reply = match ads.set(msg.user_id, &text) {
                AdUpdate::Applied(applied) => {
                    tracing::info!(user_id = ?msg.user_id, ad_text = %applied, "ad text updated");
                    ad_confirmation(&applied)
                }
                AdUpdate::Denied => {
                    tracing::warn!(user_id = ?msg.user_id, "unauthorized /setad attempt");
                    NOT_AUTHORIZED_TEXT.to_string()
                }
            };
            Routed {
                replies: vec![reply],
                job: None,
            }
        }
        Action::Download(url) => Routed {
            replies: Vec::new(),
            job: Some(JobRequest {
                url,
                chat_id: msg.chat_id,
                requester: msg.user_id,
                username: msg.username.clone(),
            }),
        },
        Action::Greeting | Action::Fallback => Routed {
            replies: vec![WELCOME_TEXT.to_string()],
            job: None,
        },
    }
}

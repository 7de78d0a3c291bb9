//! Download → upload → cleanup sequence for a single URL message.

use std::{path::PathBuf, sync::Arc};

use crate::{
    admission::JobLimiter,
    ads::AdTextStore,
    commands::JobRequest,
    errors::Error,
    formatting::{
        compose_caption, error_message, too_large_message, SENT_TEXT, STARTING_TEXT,
        UPLOADING_TEXT,
    },
    media::MediaKind,
    messaging::{
        port::MessagingPort,
        types::{ChatAction, OutgoingMedia},
    },
    ports::{FetchRequest, Fetcher, SizeProbe, SizeProber},
    workspace::JobWorkspace,
    Result,
};

pub const QUEUED_TEXT: &str = "All download slots are busy. Your link is queued...";

#[derive(Clone, Debug)]
pub struct PipelineSettings {
    pub max_file_size: u64,
    pub temp_dir: PathBuf,
}

/// Terminal state of a download job. Exactly one per job.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobOutcome {
    Sent { bytes: u64, kind: MediaKind },
    TooLarge { size: u64, limit: u64 },
    Failed(String),
}

#[derive(Clone, Copy, Debug)]
struct Delivered {
    bytes: u64,
    kind: MediaKind,
}

pub struct Pipeline {
    prober: Arc<dyn SizeProber>,
    fetcher: Arc<dyn Fetcher>,
    messenger: Arc<dyn MessagingPort>,
    ads: Arc<AdTextStore>,
    limiter: JobLimiter,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        prober: Arc<dyn SizeProber>,
        fetcher: Arc<dyn Fetcher>,
        messenger: Arc<dyn MessagingPort>,
        ads: Arc<AdTextStore>,
        limiter: JobLimiter,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            prober,
            fetcher,
            messenger,
            ads,
            limiter,
            settings,
        }
    }

    /// Run one job to completion. The job's workspace is gone when this returns.
    pub async fn run(&self, job: &JobRequest) -> JobOutcome {
        let chat_id = job.chat_id;
        tracing::info!(
            chat_id = %chat_id,
            user_id = ?job.requester,
            username = job.username.as_deref().unwrap_or("unknown"),
            url = %job.url,
            "download requested"
        );

        if self.limiter.available() == 0 {
            self.notify(job, QUEUED_TEXT).await;
        }
        let _permit = match self.limiter.acquire().await {
            Ok(p) => p,
            Err(e) => return self.finish(job, Err(e)).await,
        };

        self.notify(job, STARTING_TEXT).await;

        let mut workspace = match JobWorkspace::create(&self.settings.temp_dir).await {
            Ok(ws) => ws,
            Err(e) => return self.finish(job, Err(e)).await,
        };

        let result = self.execute(job, &workspace).await;

        if let Err(e) = workspace.cleanup().await {
            tracing::error!(dir = %workspace.path().display(), error = %e, "workspace cleanup failed");
        }

        self.finish(job, result).await
    }

    async fn execute(&self, job: &JobRequest, workspace: &JobWorkspace) -> Result<Delivered> {
        let limit = self.settings.max_file_size;

        let probe = self.prober.probe(&job.url).await;
        if let SizeProbe::Known(size) = probe {
            tracing::debug!(url = %job.url, size, "probed size");
            if size > limit {
                return Err(Error::TooLarge { size, limit });
            }
        }

        let fetched = self
            .fetcher
            .fetch(&FetchRequest {
                url: job.url.clone(),
                dest_dir: workspace.path().to_path_buf(),
                max_bytes: limit,
            })
            .await?;

        if fetched.bytes > limit {
            return Err(Error::TooLarge {
                size: fetched.bytes,
                limit,
            });
        }

        self.notify(job, UPLOADING_TEXT).await;

        let kind = MediaKind::from_path(&fetched.path);
        if let Err(e) = self
            .messenger
            .send_chat_action(job.chat_id, ChatAction::from(kind))
            .await
        {
            tracing::debug!(error = %e, "chat action failed");
        }

        let caption = compose_caption(&fetched.display_name, &self.ads.get());
        self.messenger
            .send_media(
                job.chat_id,
                OutgoingMedia {
                    kind,
                    path: fetched.path.clone(),
                    caption,
                },
            )
            .await?;

        Ok(Delivered {
            bytes: fetched.bytes,
            kind,
        })
    }

    async fn finish(&self, job: &JobRequest, result: Result<Delivered>) -> JobOutcome {
        let (outcome, reply) = match result {
            Ok(Delivered { bytes, kind }) => {
                tracing::info!(chat_id = %job.chat_id, url = %job.url, bytes, kind = kind.label(), "file sent");
                (JobOutcome::Sent { bytes, kind }, SENT_TEXT.to_string())
            }
            Err(Error::TooLarge { size, limit }) => {
                tracing::info!(chat_id = %job.chat_id, url = %job.url, size, limit, "rejected: too large");
                (
                    JobOutcome::TooLarge { size, limit },
                    too_large_message(size, limit),
                )
            }
            Err(e) => {
                tracing::error!(chat_id = %job.chat_id, url = %job.url, error = %e, "download job failed");
                (JobOutcome::Failed(e.to_string()), error_message(&e))
            }
        };

        self.notify(job, &reply).await;
        outcome
    }

    async fn notify(&self, job: &JobRequest, text: &str) {
        if let Err(e) = self.messenger.send_text(job.chat_id, text).await {
            tracing::warn!(chat_id = %job.chat_id, error = %e, "failed to send progress message");
        }
    }
}

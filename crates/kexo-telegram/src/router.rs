use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use kexo_core::{
    admission::JobLimiter,
    ads::AdTextStore,
    config::{Config, FetchBackend},
    messaging::port::MessagingPort,
    pipeline::{Pipeline, PipelineSettings},
    ports::{Fetcher, SizeProber},
    security::AdminAllowlist,
};
use kexo_http::{HttpFetcher, HttpProber};
use kexo_ytdlp::{YtDlpConfig, YtDlpFetcher, YtDlpProber};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub ads: Arc<AdTextStore>,
    pub messenger: Arc<dyn MessagingPort>,
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    /// Wire the pipeline from explicit ports.
    pub fn new(
        cfg: Arc<Config>,
        messenger: Arc<dyn MessagingPort>,
        prober: Arc<dyn SizeProber>,
        fetcher: Arc<dyn Fetcher>,
    ) -> Self {
        let ads = Arc::new(AdTextStore::new(
            cfg.default_ad_text.clone(),
            AdminAllowlist::new(cfg.admin_ids.iter().copied()),
        ));
        let pipeline = Arc::new(Pipeline::new(
            prober,
            fetcher,
            messenger.clone(),
            ads.clone(),
            JobLimiter::new(cfg.max_concurrent_jobs),
            PipelineSettings {
                max_file_size: cfg.max_file_size,
                temp_dir: cfg.temp_dir.clone(),
            },
        ));
        Self {
            cfg,
            ads,
            messenger,
            pipeline,
        }
    }
}

fn download_backend(cfg: &Config) -> anyhow::Result<(Arc<dyn SizeProber>, Arc<dyn Fetcher>)> {
    let prober: Arc<dyn SizeProber>;
    let fetcher: Arc<dyn Fetcher>;
    match cfg.fetch_backend {
        FetchBackend::Http => {
            prober = Arc::new(HttpProber::new(cfg.probe_timeout)?);
            fetcher = Arc::new(HttpFetcher::new(cfg.fetch_timeout)?);
        }
        FetchBackend::Media => {
            let yt = YtDlpConfig::from_config(cfg);
            prober = Arc::new(YtDlpProber::new(yt.clone()));
            fetcher = Arc::new(YtDlpFetcher::new(yt));
        }
    }
    Ok((prober, fetcher))
}

/// Production state: Telegram messenger plus the configured download backend.
pub fn build_state(cfg: Arc<Config>, bot: Bot) -> anyhow::Result<Arc<AppState>> {
    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot));
    let (prober, fetcher) = download_backend(&cfg)?;
    Ok(Arc::new(AppState::new(cfg, messenger, prober, fetcher)))
}

pub(crate) async fn log_startup(bot: &Bot, state: &AppState) {
    match bot.get_me().await {
        Ok(me) => tracing::info!(bot = %me.username(), service = %state.cfg.service_name, "bot started"),
        Err(e) => tracing::warn!(error = %e, "getMe failed"),
    }
    tracing::info!(
        admins = state.ads.admins().count(),
        max_file_size = state.cfg.max_file_size,
        backend = ?state.cfg.fetch_backend,
        dispatch = ?state.cfg.dispatch,
        max_concurrent_jobs = state.cfg.max_concurrent_jobs,
        temp_dir = %state.cfg.temp_dir.display(),
        "configuration loaded"
    );
}

pub async fn run_polling(cfg: Arc<Config>) -> anyhow::Result<()> {
    let bot = crate::build_bot(&cfg.telegram_bot_token)?;
    let state = build_state(cfg, bot.clone())?;
    log_startup(&bot, &state).await;

    // A webhook left over from the other transport would block getUpdates.
    if let Err(e) = bot.delete_webhook().await {
        tracing::warn!(error = %e, "deleteWebhook failed");
    }

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    tracing::info!("polling stopped");
    Ok(())
}

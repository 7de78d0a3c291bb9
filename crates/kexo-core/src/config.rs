use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

const MIB: u64 = 1024 * 1024;

/// Which backend turns a URL into a local file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchBackend {
    /// Direct HTTP download of the URL.
    Http,
    /// Media extractor (`yt-dlp`) for pages that wrap the actual media.
    Media,
}

impl FetchBackend {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "http" | "direct" => Some(Self::Http),
            "media" | "ytdlp" | "yt-dlp" => Some(Self::Media),
            _ => None,
        }
    }
}

/// How the message handler runs a download job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobDispatch {
    /// Spawn a task so the receive loop keeps handling other chats.
    Spawn,
    /// Run the job inside the handler (webhook: one request per update).
    Inline,
}

impl JobDispatch {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "spawn" | "task" => Some(Self::Spawn),
            "inline" | "sync" => Some(Self::Inline),
            _ => None,
        }
    }
}

/// Per-binary defaults. Every field can be overridden from the environment.
#[derive(Clone, Copy, Debug)]
pub struct ServiceProfile {
    pub service_name: &'static str,
    pub max_file_size_mb: u64,
    pub fetch_backend: FetchBackend,
    pub dispatch: JobDispatch,
}

impl ServiceProfile {
    pub const fn polling() -> Self {
        Self {
            service_name: "kexo",
            max_file_size_mb: 50,
            fetch_backend: FetchBackend::Http,
            dispatch: JobDispatch::Spawn,
        }
    }

    pub const fn webhook() -> Self {
        Self {
            service_name: "kexo-webhook",
            max_file_size_mb: 500,
            fetch_backend: FetchBackend::Media,
            dispatch: JobDispatch::Inline,
        }
    }
}

/// Typed configuration shared by both services.
#[derive(Clone, Debug)]
pub struct Config {
    pub service_name: String,

    // Telegram
    pub telegram_bot_token: String,
    pub admin_ids: Vec<i64>,
    pub default_ad_text: String,

    // Jobs
    pub max_file_size: u64,
    pub fetch_backend: FetchBackend,
    pub dispatch: JobDispatch,
    pub max_concurrent_jobs: usize,
    pub temp_dir: PathBuf,

    // Network
    pub probe_timeout: Duration,
    pub fetch_timeout: Duration,

    // Media extractor
    pub ytdlp_path: PathBuf,
    pub ytdlp_format: String,
    pub ytdlp_timeout: Duration,

    // Webhook
    pub webhook_port: u16,
    pub webhook_url: Option<String>,
}

impl Config {
    /// Load from the process environment, reading `.env` first.
    pub fn load(profile: ServiceProfile) -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        let cfg = Self::from_source(profile, |key| env::var(key).ok())?;
        fs::create_dir_all(&cfg.temp_dir)?;
        Ok(cfg)
    }

    /// Build a config from an arbitrary key lookup (tests pass a map).
    pub fn from_source(
        profile: ServiceProfile,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        let telegram_bot_token = get("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let admin_ids = parse_csv_i64(get("ADMIN_IDS"));
        if admin_ids.is_empty() {
            tracing::warn!("ADMIN_IDS is empty; /setad is disabled");
        }
        let default_ad_text = get("AD_TEXT").unwrap_or_default();

        let max_file_size_mb = parse_u64("MAX_FILE_SIZE_MB", get("MAX_FILE_SIZE_MB"))?
            .unwrap_or(profile.max_file_size_mb);
        if max_file_size_mb == 0 {
            return Err(Error::Config("MAX_FILE_SIZE_MB must be positive".to_string()));
        }
        let max_file_size = max_file_size_mb
            .checked_mul(MIB)
            .ok_or_else(|| Error::Config("MAX_FILE_SIZE_MB is too large".to_string()))?;

        let fetch_backend = match get("FETCH_BACKEND") {
            Some(v) => FetchBackend::parse(&v).ok_or_else(|| {
                Error::Config(format!("FETCH_BACKEND must be `http` or `media`, got `{v}`"))
            })?,
            None => profile.fetch_backend,
        };
        let dispatch = match get("JOB_DISPATCH") {
            Some(v) => JobDispatch::parse(&v).ok_or_else(|| {
                Error::Config(format!("JOB_DISPATCH must be `spawn` or `inline`, got `{v}`"))
            })?,
            None => profile.dispatch,
        };

        let max_concurrent_jobs = parse_u64("MAX_CONCURRENT_JOBS", get("MAX_CONCURRENT_JOBS"))?
            .unwrap_or(4)
            .max(1) as usize;
        let temp_dir = PathBuf::from(get("TEMP_DIR").unwrap_or("/tmp/kexodrop".to_string()));

        let probe_timeout = Duration::from_millis(
            parse_u64("PROBE_TIMEOUT_MS", get("PROBE_TIMEOUT_MS"))?.unwrap_or(10_000),
        );
        let fetch_timeout = Duration::from_millis(
            parse_u64("FETCH_TIMEOUT_MS", get("FETCH_TIMEOUT_MS"))?.unwrap_or(30_000),
        );

        let ytdlp_path = get("YTDLP_PATH")
            .map(PathBuf::from)
            .or_else(|| which_in_path("yt-dlp"))
            .unwrap_or_else(|| PathBuf::from("yt-dlp"));
        let ytdlp_format = get("YTDLP_FORMAT").unwrap_or("best".to_string());
        let ytdlp_timeout = Duration::from_secs(
            parse_u64("YTDLP_TIMEOUT_SECS", get("YTDLP_TIMEOUT_SECS"))?.unwrap_or(600),
        );

        let webhook_port = match get("PORT") {
            Some(v) => v
                .trim()
                .parse::<u16>()
                .map_err(|_| Error::Config(format!("PORT must be a port number, got `{v}`")))?,
            None => 8080,
        };
        let webhook_url = get("WEBHOOK_URL").map(|u| u.trim().trim_end_matches('/').to_string());

        Ok(Self {
            service_name: profile.service_name.to_string(),
            telegram_bot_token,
            admin_ids,
            default_ad_text,
            max_file_size,
            fetch_backend,
            dispatch,
            max_concurrent_jobs,
            temp_dir,
            probe_timeout,
            fetch_timeout,
            ytdlp_path,
            ytdlp_format,
            ytdlp_timeout,
            webhook_port,
            webhook_url,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = &val[1..val.len() - 1];
        }

        out.push((key.to_string(), val.to_string()));
    }
    out
}

fn parse_u64(key: &str, v: Option<String>) -> Result<Option<u64>> {
    let Some(v) = v else {
        return Ok(None);
    };
    v.trim()
        .parse::<u64>()
        .map(Some)
        .map_err(|_| Error::Config(format!("{key} must be a non-negative integer, got `{v}`")))
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| match s.parse::<i64>() {
            Ok(id) => Some(id),
            Err(_) => {
                tracing::warn!(value = s, "ignoring non-numeric admin id");
                None
            }
        })
        .collect()
}

fn which_in_path(binary: &str) -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    env::split_paths(&path)
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.is_file())
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

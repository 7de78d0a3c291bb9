//! yt-dlp adapter (media-site download backend).
//!
//! Runs `yt-dlp` as a subprocess per job. The finished file path comes from
//! `--print after_move:filepath`; if that line is missing the job workspace
//! is scanned instead. The selected format's size is printed before the
//! download so a run that `--max-filesize` skipped can be told apart from a
//! failed one.

use std::{
    collections::VecDeque,
    io::ErrorKind,
    path::{Path, PathBuf},
    process::Stdio,
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use kexo_core::{
    config::Config,
    errors::Error,
    ports::{FetchRequest, FetchedFile, Fetcher, SizeProbe, SizeProber},
    Result,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::Command,
    sync::Mutex,
};

const STDERR_TAIL_MAX_BYTES: usize = 16 * 1024;
const STDERR_TAIL_MAX_LINES: usize = 200;
const OUTPUT_TEMPLATE: &str = "%(title).80B.%(ext)s";
const SIZE_PREFIX: &str = "size=";

#[derive(Clone, Debug)]
pub struct YtDlpConfig {
    pub program: PathBuf,
    pub format: String,
    /// Whole-run limit for a download.
    pub timeout: Duration,
    pub probe_timeout: Duration,
}

impl YtDlpConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            program: cfg.ytdlp_path.clone(),
            format: cfg.ytdlp_format.clone(),
            timeout: cfg.ytdlp_timeout,
            probe_timeout: cfg.probe_timeout,
        }
    }
}

#[derive(Clone, Debug, Default)]
struct StderrTail {
    lines: VecDeque<String>,
    bytes: usize,
}

impl StderrTail {
    fn push_line(&mut self, line: String) {
        self.bytes = self.bytes.saturating_add(line.len() + 1);
        self.lines.push_back(line);

        while self.lines.len() > STDERR_TAIL_MAX_LINES || self.bytes > STDERR_TAIL_MAX_BYTES {
            if let Some(front) = self.lines.pop_front() {
                self.bytes = self.bytes.saturating_sub(front.len() + 1);
            } else {
                break;
            }
        }
    }

    /// Last line that looks like a yt-dlp error, else the last line.
    fn summary(&self) -> Option<String> {
        let mut lines = self.lines.iter().map(|l| l.trim()).filter(|l| !l.is_empty());
        let last = lines.clone().next_back()?;
        Some(
            lines
                .rfind(|l| l.starts_with("ERROR"))
                .unwrap_or(last)
                .to_string(),
        )
    }
}

struct RunOutput {
    stdout: Vec<String>,
}

async fn run(program: &Path, args: &[String], limit: Duration) -> Result<RunOutput> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                Error::Fetch(format!("{} is not installed", program.display()))
            } else {
                Error::Fetch(format!("failed to start {}: {e}", program.display()))
            }
        })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::External("yt-dlp stdout was not captured".to_string()))?;
    let stderr_tail = Arc::new(Mutex::new(StderrTail::default()));

    // Drain stderr in background to avoid blocking on a full pipe.
    let stderr_task = child.stderr.take().map(|stderr| {
        let tail = stderr_tail.clone();
        tokio::spawn(async move {
            let mut r = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = r.next_line().await {
                tail.lock().await.push_line(line);
            }
        })
    });

    let collect = async {
        let mut lines = Vec::new();
        let mut r = BufReader::new(stdout).lines();
        while let Some(line) = r.next_line().await? {
            lines.push(line);
        }
        let status = child.wait().await?;
        Ok::<_, std::io::Error>((lines, status))
    };

    let (stdout, status) = match tokio::time::timeout(limit, collect).await {
        Ok(res) => res?,
        Err(_) => {
            // `collect` borrowed the child; it is dropped now, so kill explicitly.
            let _ = child.kill().await;
            return Err(Error::Fetch(format!(
                "yt-dlp timed out after {}s",
                limit.as_secs()
            )));
        }
    };

    if !status.success() {
        if let Some(task) = stderr_task {
            let _ = tokio::time::timeout(Duration::from_secs(1), task).await;
        }
        let detail = stderr_tail
            .lock()
            .await
            .summary()
            .unwrap_or_else(|| "no error output".to_string());
        return Err(Error::Fetch(format!("yt-dlp exited with {status}: {detail}")));
    }

    Ok(RunOutput { stdout })
}

pub fn build_fetch_args(format: &str, req: &FetchRequest) -> Vec<String> {
    let template = req.dest_dir.join(OUTPUT_TEMPLATE);
    vec![
        "--no-playlist".to_string(),
        "--no-progress".to_string(),
        "--no-warnings".to_string(),
        "--restrict-filenames".to_string(),
        "-f".to_string(),
        format.to_string(),
        "--max-filesize".to_string(),
        req.max_bytes.to_string(),
        "-o".to_string(),
        template.to_string_lossy().into_owned(),
        "--print".to_string(),
        format!("before_dl:{SIZE_PREFIX}%(filesize,filesize_approx)s"),
        "--print".to_string(),
        "after_move:filepath".to_string(),
        "--".to_string(),
        req.url.clone(),
    ]
}

pub fn build_probe_args(url: &str) -> Vec<String> {
    vec![
        "--no-playlist".to_string(),
        "--no-warnings".to_string(),
        "--skip-download".to_string(),
        "--print".to_string(),
        "%(filesize,filesize_approx)s".to_string(),
        "--".to_string(),
        url.to_string(),
    ]
}

/// Last non-empty stdout line that is not the size line.
pub fn extract_printed_path(stdout: &[String]) -> Option<String> {
    stdout
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty() && !l.starts_with(SIZE_PREFIX))
        .next_back()
        .map(ToString::to_string)
}

/// Size of the selected format as printed before the download started.
pub fn extract_printed_size(stdout: &[String]) -> SizeProbe {
    stdout
        .iter()
        .find_map(|l| l.trim().strip_prefix(SIZE_PREFIX))
        .map(parse_filesize)
        .unwrap_or(SizeProbe::Unknown)
}

/// Parse `%(filesize,filesize_approx)s`; `NA` and junk are unknown.
pub fn parse_filesize(printed: &str) -> SizeProbe {
    let s = printed.trim();
    if let Ok(n) = s.parse::<u64>() {
        return SizeProbe::Known(n);
    }
    match s.parse::<f64>() {
        Ok(f) if f.is_finite() && f >= 0.0 => SizeProbe::Known(f.round() as u64),
        _ => SizeProbe::Unknown,
    }
}

async fn resolve_output(dir: &Path, printed: Option<&str>) -> Result<PathBuf> {
    let root = tokio::fs::canonicalize(dir).await?;

    if let Some(p) = printed {
        for candidate in [PathBuf::from(p), dir.join(p)] {
            if let Ok(c) = tokio::fs::canonicalize(&candidate).await {
                if c.starts_with(&root) && c.is_file() {
                    return Ok(c);
                }
            }
        }
    }

    // Fall back to the largest finished file in the workspace.
    let mut best: Option<(u64, PathBuf)> = None;
    let mut entries = tokio::fs::read_dir(&root).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let meta = entry.metadata().await?;
        let partial = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e == "part" || e == "ytdl");
        if !meta.is_file() || partial {
            continue;
        }
        if best.as_ref().map_or(true, |(len, _)| meta.len() > *len) {
            best = Some((meta.len(), path));
        }
    }

    best.map(|(_, p)| p)
        .ok_or_else(|| Error::Fetch("yt-dlp produced no file".to_string()))
}

#[derive(Clone, Debug)]
pub struct YtDlpFetcher {
    cfg: YtDlpConfig,
}

impl YtDlpFetcher {
    pub fn new(cfg: YtDlpConfig) -> Self {
        Self { cfg }
    }
}

#[async_trait]
impl Fetcher for YtDlpFetcher {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchedFile> {
        let args = build_fetch_args(&self.cfg.format, req);
        tracing::debug!(program = %self.cfg.program.display(), ?args, "running yt-dlp");

        let out = run(&self.cfg.program, &args, self.cfg.timeout).await?;
        let printed = extract_printed_path(&out.stdout);
        let path = match resolve_output(&req.dest_dir, printed.as_deref()).await {
            Ok(path) => path,
            // yt-dlp exits 0 without a file when --max-filesize skips the download.
            Err(e) => match extract_printed_size(&out.stdout) {
                SizeProbe::Known(size) if size > req.max_bytes => {
                    return Err(Error::TooLarge {
                        size,
                        limit: req.max_bytes,
                    });
                }
                _ => return Err(e),
            },
        };
        let bytes = tokio::fs::metadata(&path).await?.len();
        let display_name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("downloaded_file")
            .to_string();

        tracing::info!(url = %req.url, path = %path.display(), bytes, "yt-dlp download complete");

        Ok(FetchedFile {
            path,
            bytes,
            display_name,
        })
    }
}

#[derive(Clone, Debug)]
pub struct YtDlpProber {
    cfg: YtDlpConfig,
}

impl YtDlpProber {
    pub fn new(cfg: YtDlpConfig) -> Self {
        Self { cfg }
    }
}

#[async_trait]
impl SizeProber for YtDlpProber {
    async fn probe(&self, url: &str) -> SizeProbe {
        let args = build_probe_args(url);
        match run(&self.cfg.program, &args, self.cfg.probe_timeout).await {
            Ok(out) => extract_printed_path(&out.stdout)
                .map(|s| parse_filesize(&s))
                .unwrap_or(SizeProbe::Unknown),
            Err(e) => {
                tracing::warn!(url, error = %e, "yt-dlp size probe failed");
                SizeProbe::Unknown
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("kexo-ytdlp-{tag}-{ts}"));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn request(dir: &Path) -> FetchRequest {
        FetchRequest {
            url: "https://video.example/watch?v=abc".to_string(),
            dest_dir: dir.to_path_buf(),
            max_bytes: 1000,
        }
    }

    #[test]
    fn fetch_args_carry_format_ceiling_and_template() {
        let dir = PathBuf::from("/tmp/job_1");
        let args = build_fetch_args("best", &request(&dir));

        let pos = |flag: &str| args.iter().position(|a| a == flag).unwrap();
        assert_eq!(args[pos("-f") + 1], "best");
        assert_eq!(args[pos("--max-filesize") + 1], "1000");
        assert_eq!(args[pos("-o") + 1], "/tmp/job_1/%(title).80B.%(ext)s");
        assert_eq!(
            args[pos("--print") + 1],
            "before_dl:size=%(filesize,filesize_approx)s"
        );
        assert_eq!(args[args.len() - 3], "after_move:filepath");
        assert_eq!(args.last().unwrap(), "https://video.example/watch?v=abc");
        assert!(args.contains(&"--no-playlist".to_string()));
    }

    #[test]
    fn filesize_parsing() {
        assert_eq!(parse_filesize("12345\n"), SizeProbe::Known(12345));
        assert_eq!(parse_filesize("1048576.4"), SizeProbe::Known(1048576));
        assert_eq!(parse_filesize("NA"), SizeProbe::Unknown);
        assert_eq!(parse_filesize(""), SizeProbe::Unknown);
    }

    #[test]
    fn printed_path_is_last_non_empty_line() {
        let out = vec![
            "size=2048".to_string(),
            "[info] something".to_string(),
            "/tmp/job/clip.mp4".to_string(),
            "  ".to_string(),
        ];
        assert_eq!(
            extract_printed_path(&out).as_deref(),
            Some("/tmp/job/clip.mp4")
        );
        assert_eq!(extract_printed_size(&out), SizeProbe::Known(2048));
        assert_eq!(extract_printed_path(&[]), None);

        let skipped = vec!["size=NA".to_string()];
        assert_eq!(extract_printed_path(&skipped), None);
        assert_eq!(extract_printed_size(&skipped), SizeProbe::Unknown);
    }

    #[test]
    fn stderr_tail_prefers_error_lines_and_stays_bounded() {
        let mut tail = StderrTail::default();
        for i in 0..(STDERR_TAIL_MAX_LINES + 50) {
            tail.push_line(format!("line {i}"));
        }
        assert_eq!(tail.lines.len(), STDERR_TAIL_MAX_LINES);

        tail.push_line("ERROR: Unsupported URL".to_string());
        tail.push_line("hint: update yt-dlp".to_string());
        assert_eq!(tail.summary().as_deref(), Some("ERROR: Unsupported URL"));
    }

    #[tokio::test]
    async fn resolve_output_falls_back_to_workspace_scan() {
        let dir = temp_dir("scan");
        std::fs::write(dir.join("small.txt"), b"a").unwrap();
        std::fs::write(dir.join("video.mp4"), b"abcdef").unwrap();
        std::fs::write(dir.join("video.mp4.part"), b"abcdefghijkl").unwrap();

        let got = resolve_output(&dir, Some("/etc/passwd")).await.unwrap();
        assert_eq!(got.file_name().unwrap(), "video.mp4");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn empty_workspace_is_a_fetch_error() {
        let dir = temp_dir("empty");
        let err = resolve_output(&dir, None).await.unwrap_err();
        assert!(matches!(err, Error::Fetch(_)));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn missing_binary_is_reported() {
        let cfg = YtDlpConfig {
            program: PathBuf::from("/nonexistent/yt-dlp"),
            format: "best".to_string(),
            timeout: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(5),
        };
        let dir = temp_dir("missing");

        let err = YtDlpFetcher::new(cfg.clone())
            .fetch(&request(&dir))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not installed"));
        assert_eq!(
            YtDlpProber::new(cfg).probe("https://x.example").await,
            SizeProbe::Unknown
        );
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[cfg(unix)]
    mod scripted {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        const FAKE_YTDLP: &str = r#"#!/bin/sh
tmpl=""
probe=0
prev=""
for a in "$@"; do
  if [ "$prev" = "-o" ]; then tmpl="$a"; fi
  if [ "$a" = "--skip-download" ]; then probe=1; fi
  prev="$a"
done
if [ "$probe" = 1 ]; then echo 12345; exit 0; fi
echo "size=11"
out="$(dirname "$tmpl")/clip.mp4"
printf 'video-bytes' > "$out"
echo "$out"
"#;

        fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
            let path = dir.join(name);
            std::fs::write(&path, body).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path
        }

        fn cfg(program: PathBuf, timeout: Duration) -> YtDlpConfig {
            YtDlpConfig {
                program,
                format: "best".to_string(),
                timeout,
                probe_timeout: timeout,
            }
        }

        #[tokio::test]
        async fn fetch_returns_printed_file() {
            let bin = temp_dir("bin-ok");
            let job = temp_dir("job-ok");
            let program = script(&bin, "yt-dlp", FAKE_YTDLP);

            let got = YtDlpFetcher::new(cfg(program.clone(), Duration::from_secs(10)))
                .fetch(&request(&job))
                .await
                .unwrap();

            assert_eq!(got.display_name, "clip.mp4");
            assert_eq!(got.bytes, 11);
            assert_eq!(std::fs::read(&got.path).unwrap(), b"video-bytes");

            let probe = YtDlpProber::new(cfg(program, Duration::from_secs(10)))
                .probe("https://video.example/watch?v=abc")
                .await;
            assert_eq!(probe, SizeProbe::Known(12345));

            let _ = std::fs::remove_dir_all(&bin);
            let _ = std::fs::remove_dir_all(&job);
        }

        #[tokio::test]
        async fn non_zero_exit_surfaces_error_line() {
            let bin = temp_dir("bin-fail");
            let job = temp_dir("job-fail");
            let program = script(
                &bin,
                "yt-dlp",
                "#!/bin/sh\necho 'ERROR: Unsupported URL: x' >&2\nexit 1\n",
            );

            let err = YtDlpFetcher::new(cfg(program, Duration::from_secs(10)))
                .fetch(&request(&job))
                .await
                .unwrap_err();

            assert!(matches!(err, Error::Fetch(ref m) if m.contains("Unsupported URL")));
            let _ = std::fs::remove_dir_all(&bin);
            let _ = std::fs::remove_dir_all(&job);
        }

        #[tokio::test]
        async fn skipped_oversized_download_is_too_large() {
            let bin = temp_dir("bin-big");
            let job = temp_dir("job-big");
            let program = script(&bin, "yt-dlp", "#!/bin/sh\necho size=99999\nexit 0\n");

            let err = YtDlpFetcher::new(cfg(program, Duration::from_secs(10)))
                .fetch(&request(&job))
                .await
                .unwrap_err();

            assert!(matches!(
                err,
                Error::TooLarge {
                    size: 99999,
                    limit: 1000
                }
            ));
            let _ = std::fs::remove_dir_all(&bin);
            let _ = std::fs::remove_dir_all(&job);
        }

        #[tokio::test]
        async fn missing_file_with_unknown_size_stays_a_fetch_error() {
            let bin = temp_dir("bin-na");
            let job = temp_dir("job-na");
            let program = script(&bin, "yt-dlp", "#!/bin/sh\necho size=NA\nexit 0\n");

            let err = YtDlpFetcher::new(cfg(program, Duration::from_secs(10)))
                .fetch(&request(&job))
                .await
                .unwrap_err();

            assert!(matches!(err, Error::Fetch(ref m) if m.contains("no file")));
            let _ = std::fs::remove_dir_all(&bin);
            let _ = std::fs::remove_dir_all(&job);
        }

        #[tokio::test]
        async fn hung_process_times_out() {
            let bin = temp_dir("bin-hang");
            let job = temp_dir("job-hang");
            let program = script(&bin, "yt-dlp", "#!/bin/sh\nexec sleep 30\n");

            let err = YtDlpFetcher::new(cfg(program, Duration::from_millis(200)))
                .fetch(&request(&job))
                .await
                .unwrap_err();

            assert!(err.to_string().contains("timed out"));
            let _ = std::fs::remove_dir_all(&bin);
            let _ = std::fs::remove_dir_all(&job);
        }
    }
}

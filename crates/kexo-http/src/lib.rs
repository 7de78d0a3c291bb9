//! Plain HTTP(S) download backend.
//!
//! `HttpProber` issues a HEAD request to learn the size up front;
//! `HttpFetcher` streams the GET body into the job workspace.

use std::time::Duration;

use async_trait::async_trait;
use kexo_core::{
    errors::Error,
    ports::{FetchRequest, FetchedFile, Fetcher, SizeProbe, SizeProber},
    urls::file_name_from_url,
    Result,
};
use reqwest::header::CONTENT_LENGTH;
use tokio::io::AsyncWriteExt;

const USER_AGENT: &str = concat!("kexodrop/", env!("CARGO_PKG_VERSION"));
const MAX_REDIRECTS: usize = 10;

fn build_client(timeout: Option<Duration>, connect_timeout: Duration) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .connect_timeout(connect_timeout);
    if let Some(t) = timeout {
        builder = builder.timeout(t);
    }
    builder
        .build()
        .map_err(|e| Error::Config(format!("http client build error: {e}")))
}

/// `Content-Length` of a response, read from the header.
///
/// `Response::content_length` reports the body actually present, which is 0
/// for HEAD.
fn header_content_length(resp: &reqwest::Response) -> Option<u64> {
    resp.headers()
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

#[derive(Clone, Debug)]
pub struct HttpProber {
    http: reqwest::Client,
}

impl HttpProber {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: build_client(Some(timeout), timeout)?,
        })
    }
}

#[async_trait]
impl SizeProber for HttpProber {
    async fn probe(&self, url: &str) -> SizeProbe {
        let resp = match self.http.head(url).send().await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(url, error = %e, "HEAD probe failed");
                return SizeProbe::Unknown;
            }
        };
        if !resp.status().is_success() {
            tracing::debug!(url, status = %resp.status(), "HEAD probe not successful");
            return SizeProbe::Unknown;
        }
        match header_content_length(&resp) {
            Some(size) => SizeProbe::Known(size),
            None => SizeProbe::Unknown,
        }
    }
}

#[derive(Clone, Debug)]
pub struct HttpFetcher {
    http: reqwest::Client,
    /// Longest wait for the next body chunk.
    idle_timeout: Duration,
}

impl HttpFetcher {
    pub fn new(idle_timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: build_client(None, idle_timeout)?,
            idle_timeout,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchedFile> {
        let mut resp = tokio::time::timeout(self.idle_timeout, self.http.get(&req.url).send())
            .await
            .map_err(|_| {
                Error::Fetch(format!(
                    "no response within {}s",
                    self.idle_timeout.as_secs()
                ))
            })?
            .map_err(|e| Error::Fetch(format!("request error: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Fetch(format!("HTTP status {status}")));
        }

        let declared = header_content_length(&resp);
        if let Some(size) = declared {
            if size > req.max_bytes {
                return Err(Error::TooLarge {
                    size,
                    limit: req.max_bytes,
                });
            }
        }

        let display_name = file_name_from_url(resp.url().as_str());
        let path = req.dest_dir.join(&display_name);
        let mut file = tokio::fs::File::create(&path).await?;

        let mut written: u64 = 0;
        loop {
            let chunk = tokio::time::timeout(self.idle_timeout, resp.chunk())
                .await
                .map_err(|_| {
                    Error::Fetch(format!(
                        "no data received for {}s",
                        self.idle_timeout.as_secs()
                    ))
                })?
                .map_err(|e| Error::Fetch(format!("body read error: {e}")))?;

            let Some(chunk) = chunk else { break };
            written += chunk.len() as u64;
            if written > req.max_bytes {
                return Err(Error::TooLarge {
                    size: declared.unwrap_or(written).max(written),
                    limit: req.max_bytes,
                });
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        tracing::info!(url = %req.url, path = %path.display(), bytes = written, "download complete");

        Ok(FetchedFile {
            path,
            bytes: written,
            display_name,
        })
    }
}

//! Ports implemented by the download backends.
//!
//! The pipeline only sees these traits; `kexo-http` and `kexo-ytdlp` provide
//! the concrete probers and fetchers.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::Result;

/// Outcome of a metadata-only size probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SizeProbe {
    Known(u64),
    Unknown,
}

impl SizeProbe {
    pub fn exceeds(self, limit: u64) -> bool {
        matches!(self, Self::Known(size) if size > limit)
    }
}

#[derive(Clone, Debug)]
pub struct FetchRequest {
    pub url: String,
    /// Directory owned by the job; the fetcher writes only inside it.
    pub dest_dir: PathBuf,
    pub max_bytes: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchedFile {
    pub path: PathBuf,
    pub bytes: u64,
    /// Human-readable name used as the caption base.
    pub display_name: String,
}

#[async_trait]
pub trait SizeProber: Send + Sync {
    /// Never fails: probe errors are logged and reported as `Unknown`.
    async fn probe(&self, url: &str) -> SizeProbe;
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, req: &FetchRequest) -> Result<FetchedFile>;
}

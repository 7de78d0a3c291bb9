use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};

use crate::Result;

static JOB_COUNTER: AtomicUsize = AtomicUsize::new(1);

/// Per-job temp directory.
///
/// Created when the job starts and removed by [`JobWorkspace::cleanup`] or,
/// failing that, on drop. Removal treats a missing directory as success.
#[derive(Debug)]
pub struct JobWorkspace {
    dir: PathBuf,
    released: bool,
}

impl JobWorkspace {
    pub async fn create(root: &Path) -> Result<Self> {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let n = JOB_COUNTER.fetch_add(1, Ordering::SeqCst);
        let dir = root.join(format!("job_{}_{ts}_{n}", std::process::id()));

        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            released: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Remove the directory and everything in it. Safe to call repeatedly.
    pub async fn cleanup(&mut self) -> Result<()> {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => {
                tracing::info!(dir = %self.dir.display(), "deleted job workspace");
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.released = true;
        Ok(())
    }
}

impl Drop for JobWorkspace {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => {
                tracing::warn!(dir = %self.dir.display(), "job workspace released on drop");
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                tracing::error!(dir = %self.dir.display(), error = %e, "failed to delete job workspace");
            }
        }
    }
}

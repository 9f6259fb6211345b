//! Scratch directory cleanup
//!
//! Rendered images are never deleted after they are sent. Instead the
//! whole scratch directory is emptied at startup, on a fixed interval and
//! at shutdown. A sweep can remove an image a concurrent request has just
//! written but not yet sent; the interval is long compared to a render.

use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct Janitor {
    dir: PathBuf,
    interval: Duration,
}

impl Janitor {
    pub fn new(dir: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            dir: dir.into(),
            interval,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Delete every regular file directly inside the directory.
    ///
    /// Subdirectories are left alone. Files that cannot be removed are
    /// logged and skipped. Returns how many files were removed.
    pub async fn sweep(&self) -> usize {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Nothing to sweep in {}: {}", self.dir.display(), e);
                return 0;
            }
        };

        let mut removed = 0;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("Failed to list {}: {}", self.dir.display(), e);
                    break;
                }
            };

            match entry.file_type().await {
                Ok(file_type) if file_type.is_file() => {}
                Ok(_) => continue,
                Err(e) => {
                    warn!("Failed to inspect {}: {}", entry.path().display(), e);
                    continue;
                }
            }

            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => warn!("Failed to delete temporary file {}: {}", entry.path().display(), e),
            }
        }

        if removed > 0 {
            info!("Removed {} temporary files", removed);
        }
        removed
    }

    /// Sweep on a background task every interval, starting one interval
    /// from now. Abort the handle to stop it.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + self.interval;
            let mut interval = tokio::time::interval_at(start, self.interval);

            loop {
                interval.tick().await;
                let janitor = self.clone();
                // a panicking sweep must not end the schedule
                if let Err(e) = tokio::spawn(async move { janitor.sweep().await }).await {
                    error!("Periodic cleanup of temporary files failed: {}", e);
                }
            }
        })
    }
}

//! Progress reporting hooks.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

/// Snapshot passed to progress hooks after each accepted chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Bytes accepted by the sink in the current call, across attempts.
    pub downloaded: u64,
    /// Size of the chunk that triggered this report.
    pub chunk_len: u64,
    /// Expected body size of the current response, when the server sent one.
    pub total: Option<u64>,
    /// Time since the current call started.
    pub elapsed: Duration,
}

/// Observer invoked by the transport after every accepted chunk.
///
/// Hooks run inline with the transfer: a hook that awaits slows the
/// transfer down, which is how the throttle enforces its ceiling.
#[async_trait]
pub trait ProgressHook: Send + Sync {
    async fn on_progress(&self, progress: &Progress);
}

/// Appends one progress line per report to a file.
///
/// Write failures are logged once and then ignored; progress logging never
/// fails a transfer.
#[derive(Debug)]
pub struct ProgressLog {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl ProgressLog {
    /// Creates (truncates) the progress file at `path`.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the file cannot be created.
    pub async fn create(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let file = File::create(&path).await?;
        Ok(Self {
            path,
            file: Mutex::new(Some(file)),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub(crate) fn format_progress_line(progress: &Progress) -> String {
    match progress.total {
        Some(total) => format!(
            "downloaded={} total={} elapsed_ms={}\n",
            progress.downloaded,
            total,
            progress.elapsed.as_millis()
        ),
        None => format!(
            "downloaded={} total=unknown elapsed_ms={}\n",
            progress.downloaded,
            progress.elapsed.as_millis()
        ),
    }
}

#[async_trait]
impl ProgressHook for ProgressLog {
    async fn on_progress(&self, progress: &Progress) {
        let mut guard = self.file.lock().await;
        let Some(file) = guard.as_mut() else {
            return;
        };
        let line = format_progress_line(progress);
        let written = match file.write_all(line.as_bytes()).await {
            Ok(()) => file.flush().await,
            Err(error) => Err(error),
        };
        if let Err(error) = written {
            warn!(path = %self.path.display(), %error, "progress log disabled after write failure");
            *guard = None;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_format_progress_line_known_total() {
        let line = format_progress_line(&Progress {
            downloaded: 512,
            chunk_len: 256,
            total: Some(1024),
            elapsed: Duration::from_millis(1500),
        });
        assert_eq!(line, "downloaded=512 total=1024 elapsed_ms=1500\n");
    }

    #[test]
    fn test_format_progress_line_unknown_total() {
        let line = format_progress_line(&Progress {
            downloaded: 1,
            chunk_len: 1,
            total: None,
            elapsed: Duration::ZERO,
        });
        assert!(line.contains("total=unknown"), "got: {line}");
    }

    #[tokio::test]
    async fn test_progress_log_appends_lines() {
        let dir = TempDir::new().unwrap();
        let log = ProgressLog::create(dir.path().join("progress.txt"))
            .await
            .unwrap();
        for downloaded in [10, 20] {
            log.on_progress(&Progress {
                downloaded,
                chunk_len: 10,
                total: Some(20),
                elapsed: Duration::ZERO,
            })
            .await;
        }
        let contents = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(contents.lines().count(), 2, "got: {contents}");
        assert!(contents.lines().last().unwrap().starts_with("downloaded=20"));
    }
}

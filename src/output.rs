//! Terminal output for the CLI: progress bar and run summaries.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use fwdl_core::download::{Progress, ProgressHook};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

/// Progress bar on stderr, sized from the response's content length.
pub(crate) struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub(crate) fn new(visible: bool) -> Self {
        let bar = if visible {
            ProgressBar::new_spinner()
        } else {
            ProgressBar::hidden()
        };
        bar.set_style(
            ProgressStyle::with_template("{spinner} {bytes} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        Self { bar }
    }

    pub(crate) fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

#[async_trait]
impl ProgressHook for BarProgress {
    async fn on_progress(&self, progress: &Progress) {
        if let Some(total) = progress.total
            && self.bar.length() != Some(total)
        {
            self.bar.set_length(total);
            self.bar.set_style(
                ProgressStyle::with_template(
                    "[{bar:40}] {bytes}/{total_bytes} {bytes_per_sec} eta {eta}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
            );
        }
        self.bar.set_position(progress.downloaded);
    }
}

/// Runs several hooks in order as one.
pub(crate) struct HookSet(pub(crate) Vec<Arc<dyn ProgressHook>>);

#[async_trait]
impl ProgressHook for HookSet {
    async fn on_progress(&self, progress: &Progress) {
        for hook in &self.0 {
            hook.on_progress(progress).await;
        }
    }
}

/// One-line JSON summary printed after a file transfer.
#[derive(Debug, Serialize)]
pub(crate) struct FetchSummary {
    pub(crate) url: String,
    pub(crate) http_status: u16,
    pub(crate) bytes_received: u64,
    pub(crate) bytes_transferred: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) path: Option<PathBuf>,
}

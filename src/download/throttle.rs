//! Bandwidth ceiling and pause/resume for a session.
//!
//! The [`Throttle`] is shared between a [`Session`](super::Session) and any
//! [`SessionController`](super::SessionController) handed out for it, so
//! another task can change the rate or pause the transfer while it runs.
//!
//! Rate limiting works on a sliding accounting window: every accepted chunk
//! is added to the window, and if the window is ahead of the allowed rate the
//! transfer sleeps until it is not. The window restarts whenever the rate
//! changes, a transfer begins, or a pause ends, so time spent paused is not
//! credited as bandwidth.

use std::num::NonZeroU64;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use super::error::DownloadError;
use super::progress::{Progress, ProgressHook};

#[derive(Debug)]
struct RateWindow {
    rate: Option<NonZeroU64>,
    started: Instant,
    bytes: u64,
}

impl RateWindow {
    fn restart(&mut self) {
        self.started = Instant::now();
        self.bytes = 0;
    }
}

/// Rate ceiling plus pause gate.
#[derive(Debug)]
pub struct Throttle {
    window: Mutex<RateWindow>,
    paused: AtomicBool,
    resumed: Notify,
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new()
    }
}

impl Throttle {
    /// Creates an unlimited, running throttle.
    #[must_use]
    pub fn new() -> Self {
        Self {
            window: Mutex::new(RateWindow {
                rate: None,
                started: Instant::now(),
                bytes: 0,
            }),
            paused: AtomicBool::new(false),
            resumed: Notify::new(),
        }
    }

    /// Sets the maximum transfer rate in bytes per second.
    ///
    /// There is no "unlimited" value: zero is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidArgument`] for zero.
    pub fn set_max_rate(&self, bytes_per_sec: u64) -> Result<(), DownloadError> {
        let rate = NonZeroU64::new(bytes_per_sec)
            .ok_or_else(|| DownloadError::invalid_argument("throttle rate must be non-zero"))?;
        self.apply_rate(rate);
        Ok(())
    }

    pub(crate) fn apply_rate(&self, rate: NonZeroU64) {
        let mut window = self.lock_window();
        window.rate = Some(rate);
        window.restart();
        debug!(max_bytes_per_sec = rate.get(), "throttle rate set");
    }

    /// Current ceiling, if one was set.
    #[must_use]
    pub fn max_rate(&self) -> Option<u64> {
        self.lock_window().rate.map(NonZeroU64::get)
    }

    pub(crate) fn begin_transfer(&self) {
        self.lock_window().restart();
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// Stops reading from the connection until [`resume`](Self::resume).
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::PauseFailed`] when already paused.
    pub fn pause(&self) -> Result<(), DownloadError> {
        self.paused
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| DownloadError::PauseFailed {
                reason: "transfer is already paused",
            })?;
        debug!("transfer paused");
        Ok(())
    }

    /// Lets a paused transfer continue.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::ResumeFailed`] when not paused.
    pub fn resume(&self) -> Result<(), DownloadError> {
        self.paused
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| DownloadError::ResumeFailed {
                reason: "transfer is not paused",
            })?;
        self.lock_window().restart();
        self.resumed.notify_waiters();
        debug!("transfer resumed");
        Ok(())
    }

    /// Pauses, waits `timeout`, then resumes.
    ///
    /// A zero `timeout` returns immediately without touching the transfer.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::PauseFailed`] if the transfer was already
    /// paused, or [`DownloadError::ResumeFailed`] if something else resumed
    /// it while this call was waiting.
    #[instrument(skip(self), fields(timeout_ms = timeout.as_millis()))]
    pub async fn pause_resume(&self, timeout: Duration) -> Result<(), DownloadError> {
        if timeout.is_zero() {
            return Ok(());
        }
        self.pause()?;
        tokio::time::sleep(timeout).await;
        self.resume().inspect_err(|error| {
            warn!(%error, "transfer left paused state before the interrupt ended");
        })
    }

    /// Returns once the throttle is not paused.
    pub(crate) async fn wait_while_paused(&self) {
        loop {
            let resumed = self.resumed.notified();
            if !self.is_paused() {
                return;
            }
            resumed.await;
        }
    }

    /// Accounts `chunk_len` bytes and returns how long to sleep, if at all.
    fn account(&self, chunk_len: u64) -> Option<Duration> {
        let mut window = self.lock_window();
        let rate = window.rate?;
        window.bytes += chunk_len;
        #[allow(clippy::cast_precision_loss)]
        let due = Duration::from_secs_f64(window.bytes as f64 / rate.get() as f64);
        due.checked_sub(window.started.elapsed())
            .filter(|delay| !delay.is_zero())
    }

    fn lock_window(&self) -> std::sync::MutexGuard<'_, RateWindow> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ProgressHook for Throttle {
    async fn on_progress(&self, progress: &Progress) {
        if let Some(delay) = self.account(progress.chunk_len) {
            tokio::time::sleep(delay).await;
        }
        self.wait_while_paused().await;
    }
}

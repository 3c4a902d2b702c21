//! Sessions: one transport handle plus the throttle and counters around it.
//!
//! Opening the first session in the process runs the one-time transport
//! initialisation. The guard is a [`OnceLock`], so concurrent first callers
//! block on a single initialisation and all observe its result.
//!
//! A [`Session`] is borrowed mutably by every transfer, so at most one transfer
//! runs per session. A [`SessionController`] is a cloneable handle to the
//! session's throttle and byte counter that another task can use while a
//! transfer is in flight.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use reqwest::{Client, Identity};
use tracing::{debug, info, instrument};

use super::constants::{CONNECT_TIMEOUT_SECS, DEFAULT_CONNECTIVITY_URL};
use super::credential::MtlsCredential;
use super::error::DownloadError;
use super::progress::ProgressHook;
use super::throttle::Throttle;
use crate::user_agent;

static SHARED_CLIENT: OnceLock<Result<Client, String>> = OnceLock::new();
static GLOBAL_INIT_RUNS: AtomicUsize = AtomicUsize::new(0);
static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Transport settings applied to every transfer on a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Time allowed to establish a connection.
    pub connect_timeout: Duration,
    /// Cap on a whole transfer. `None` lets transfers run as long as they need.
    pub transfer_timeout: Option<Duration>,
    /// Pause before re-sending after the transient receive error.
    pub retry_delay: Duration,
    /// Probed by [`Session::check_connectivity`] when no URL is given.
    pub connectivity_url: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            transfer_timeout: None,
            retry_delay: Duration::ZERO,
            connectivity_url: DEFAULT_CONNECTIVITY_URL.to_string(),
        }
    }
}

/// Runs the process-wide transport initialisation exactly once.
fn global_init() -> Result<&'static Client, DownloadError> {
    SHARED_CLIENT
        .get_or_init(|| {
            GLOBAL_INIT_RUNS.fetch_add(1, Ordering::SeqCst);
            info!("initialising transport");
            build_client(&SessionConfig::default(), None, true).map_err(|e| e.to_string())
        })
        .as_ref()
        .map_err(|reason| DownloadError::TransportInit {
            reason: reason.clone(),
        })
}

/// How many times the one-time initialisation actually ran.
#[must_use]
pub fn global_init_count() -> usize {
    GLOBAL_INIT_RUNS.load(Ordering::SeqCst)
}

/// Builds a transport client for `config`.
///
/// Content decoding stays off: byte counts and resume offsets refer to the
/// bytes on the wire.
pub(crate) fn build_client(
    config: &SessionConfig,
    identity: Option<Identity>,
    verify_peer: bool,
) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder()
        .connect_timeout(config.connect_timeout)
        .user_agent(user_agent::default_user_agent());
    if let Some(timeout) = config.transfer_timeout {
        builder = builder.timeout(timeout);
    }
    if let Some(identity) = identity {
        builder = builder.identity(identity);
    }
    if !verify_peer {
        builder = builder.danger_accept_invalid_certs(true);
    }
    builder.build()
}

/// One transport handle.
///
/// # Example
///
/// ```no_run
/// use fwdl_core::download::{DownloadRequest, Session};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let mut session = Session::open()?;
/// let request = DownloadRequest::builder("https://example.com/fw.bin")
///     .file("/tmp/fw.bin")
///     .retry_budget(1)
///     .build()?;
/// let outcome = session.download_to_file(&request).await?;
/// println!("HTTP {} after {} bytes", outcome.http_status, session.bytes_transferred());
/// session.close();
/// # Ok(())
/// # }
/// ```
pub struct Session {
    id: u64,
    config: SessionConfig,
    client: Client,
    throttle: Arc<Throttle>,
    bytes_transferred: Arc<AtomicU64>,
    progress_hook: Option<Arc<dyn ProgressHook>>,
}

impl Session {
    /// Opens a session with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::TransportInit`] if the one-time initialisation
    /// failed.
    #[instrument(level = "debug")]
    pub fn open() -> Result<Self, DownloadError> {
        let client = global_init()?.clone();
        Ok(Self::with_client(SessionConfig::default(), client))
    }

    /// Opens a session with its own transport settings.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::TransportInit`] if the one-time initialisation
    /// failed, or [`DownloadError::ClientBuild`] if `config` cannot be applied.
    #[instrument(level = "debug", skip(config))]
    pub fn open_with_config(config: SessionConfig) -> Result<Self, DownloadError> {
        global_init()?;
        let client = build_client(&config, None, true).map_err(DownloadError::client_build)?;
        Ok(Self::with_client(config, client))
    }

    fn with_client(config: SessionConfig, client: Client) -> Self {
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        debug!(session_id = id, "session opened");
        Self {
            id,
            config,
            client,
            throttle: Arc::new(Throttle::new()),
            bytes_transferred: Arc::new(AtomicU64::new(0)),
            progress_hook: None,
        }
    }

    /// Releases the session. Dropping it has the same effect.
    pub fn close(self) {
        debug!(session_id = self.id, "session closed");
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Handle for adjusting the throttle and reading progress from another task.
    #[must_use]
    pub fn controller(&self) -> SessionController {
        SessionController {
            throttle: Arc::clone(&self.throttle),
            bytes_transferred: Arc::clone(&self.bytes_transferred),
        }
    }

    /// Sets the session's maximum transfer rate in bytes per second.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidArgument`] for zero.
    pub fn set_throttle(&self, bytes_per_sec: u64) -> Result<(), DownloadError> {
        self.throttle.set_max_rate(bytes_per_sec)
    }

    /// Pauses the session's transfer for `timeout`, then resumes it.
    ///
    /// # Errors
    ///
    /// See [`Throttle::pause_resume`].
    pub async fn pause_resume(&self, timeout: Duration) -> Result<(), DownloadError> {
        self.throttle.pause_resume(timeout).await
    }

    /// Raw body bytes received during the most recent transfer call.
    #[must_use]
    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred.load(Ordering::Relaxed)
    }

    /// Attaches a hook called after every accepted chunk, replacing any
    /// previous one.
    pub fn set_progress_hook(&mut self, hook: Arc<dyn ProgressHook>) {
        self.progress_hook = Some(hook);
    }

    pub fn clear_progress_hook(&mut self) {
        self.progress_hook = None;
    }

    pub(crate) fn throttle(&self) -> &Arc<Throttle> {
        &self.throttle
    }

    pub(crate) fn bytes_counter(&self) -> &AtomicU64 {
        &self.bytes_transferred
    }

    pub(crate) fn progress_hook(&self) -> Option<&Arc<dyn ProgressHook>> {
        self.progress_hook.as_ref()
    }

    /// Client for one call: the session's own unless the request needs a
    /// client identity or skips peer verification.
    pub(crate) async fn client_for(
        &self,
        credential: Option<&MtlsCredential>,
        verify_peer: bool,
    ) -> Result<Client, DownloadError> {
        if credential.is_none() && verify_peer {
            return Ok(self.client.clone());
        }
        let identity = match credential {
            Some(credential) => {
                debug!(
                    format = credential.format().as_str(),
                    path = %credential.cert_path().display(),
                    "loading client certificate"
                );
                Some(credential.load_identity().await?)
            }
            None => None,
        };
        build_client(&self.config, identity, verify_peer).map_err(DownloadError::client_build)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("throttle", &self.throttle)
            .field("bytes_transferred", &self.bytes_transferred())
            .field("progress_hook", &self.progress_hook.is_some())
            .finish_non_exhaustive()
    }
}

/// Cloneable control handle for a [`Session`].
#[derive(Debug, Clone)]
pub struct SessionController {
    throttle: Arc<Throttle>,
    bytes_transferred: Arc<AtomicU64>,
}

impl SessionController {
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidArgument`] for zero.
    pub fn set_throttle(&self, bytes_per_sec: u64) -> Result<(), DownloadError> {
        self.throttle.set_max_rate(bytes_per_sec)
    }

    /// # Errors
    ///
    /// Returns [`DownloadError::PauseFailed`] when already paused.
    pub fn pause(&self) -> Result<(), DownloadError> {
        self.throttle.pause()
    }

    /// # Errors
    ///
    /// Returns [`DownloadError::ResumeFailed`] when not paused.
    pub fn resume(&self) -> Result<(), DownloadError> {
        self.throttle.resume()
    }

    /// # Errors
    ///
    /// See [`Throttle::pause_resume`].
    pub async fn pause_resume(&self, timeout: Duration) -> Result<(), DownloadError> {
        self.throttle.pause_resume(timeout).await
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.throttle.is_paused()
    }

    #[must_use]
    pub fn max_rate(&self) -> Option<u64> {
        self.throttle.max_rate()
    }

    /// Live view of the byte counter of the session's current transfer.
    #[must_use]
    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred.load(Ordering::Relaxed)
    }
}

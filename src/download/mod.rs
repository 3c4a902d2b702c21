//! HTTP transfer engine.
//!
//! A [`Session`] owns one transport handle. Transfers are described by a
//! [`DownloadRequest`] and deliver their bytes to a file or to memory.
//!
//! # Features
//!
//! - Streaming to a file (truncate or append at a resume offset) or to memory
//! - Retry of the transient receive error, resuming with a byte range
//! - Bandwidth ceiling plus pause/resume through [`SessionController`]
//! - Mutual TLS with PKCS#12 or PEM client certificates
//! - A process-wide cancellation signal ([`cancel`])
//!
//! # Example
//!
//! ```no_run
//! use fwdl_core::download::{DownloadRequest, Session};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut session = Session::open()?;
//! let request = DownloadRequest::builder("https://updates.example.com/manifest.json")
//!     .memory()
//!     .build()?;
//! let outcome = session.download_to_memory(&request).await?;
//! if outcome.http_status == 404 {
//!     println!("no manifest published");
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod cancel;
mod constants;
mod credential;
mod encode;
mod error;
mod orchestrator;
mod probe;
mod progress;
mod request;
mod retry;
mod session;
mod sink;
mod throttle;
mod transport;

pub use auth::{AuthorizationProvider, BearerToken, StaticHeaders};
pub use constants::{
    CONNECT_TIMEOUT_SECS, DEFAULT_CONNECTIVITY_TIMEOUT, DEFAULT_CONNECTIVITY_URL,
    DEFAULT_RETRY_BUDGET, MAX_PATH_LEN, MAX_URL_LEN,
};
pub use credential::{CertificateFormat, MtlsCredential, PKCS12_TAG};
pub use encode::url_encode;
pub use error::{DownloadError, TransferErrorKind};
pub use orchestrator::TransferOutcome;
pub use progress::{Progress, ProgressHook, ProgressLog};
pub use request::{DownloadRequest, DownloadRequestBuilder, HashMetadata, SinkTarget};
pub use retry::{
    Attempt, FailureType, RetryDecision, RetryPolicy, classify_error, retry_transient,
};
pub use session::{Session, SessionConfig, SessionController, global_init_count};
pub use sink::{FileSink, MemorySink, Sink};
pub use throttle::Throttle;

// Note: no module-local Result aliases. Use `Result<T, DownloadError>` explicitly.

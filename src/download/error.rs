//! Error types for the download module.
//!
//! Every failure a transfer can end in is a variant of [`DownloadError`].
//! The variants follow the engine's failure taxonomy: invalid arguments are
//! caught before any network traffic, setup failures happen while a request
//! is being configured, and transfer failures carry whatever the transport
//! had already observed (HTTP status, bytes received).

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Transport-level failure classes observed while a transfer is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferErrorKind {
    /// Could not connect to the remote host (DNS, refused, unreachable).
    Connect,
    /// The transport gave up waiting.
    Timeout,
    /// Failed while sending the request.
    Send,
    /// The connection dropped while receiving the response body.
    ///
    /// This is the one transient class the orchestrator retries.
    Recv,
    /// TLS handshake or certificate failure.
    Tls,
    /// Too many redirects or a broken redirect chain.
    Redirect,
    /// The sink failed to store received bytes (disk full, I/O error).
    Write,
    /// Anything the transport could not classify further.
    Other,
}

impl TransferErrorKind {
    /// Returns true for the single retryable class.
    #[must_use]
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Recv)
    }

    /// Stable label used in logs and error messages.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Timeout => "timeout",
            Self::Send => "send",
            Self::Recv => "receive",
            Self::Tls => "tls",
            Self::Redirect => "redirect",
            Self::Write => "write",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for TransferErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while configuring or running a transfer.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// A precondition was violated. No request was sent.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// What was wrong with the arguments.
        reason: String,
    },

    /// The provided URL is malformed or unsupported.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// An extra header line could not be turned into a request header.
    #[error("invalid header line: {line}")]
    InvalidHeader {
        /// The offending header line (value elided for authorization headers).
        line: String,
    },

    /// The client certificate could not be loaded or was rejected.
    #[error("client certificate {path} ({format}) could not be used: {reason}")]
    Credential {
        /// Certificate path.
        path: PathBuf,
        /// Container format that was attempted.
        format: &'static str,
        /// Loader or TLS backend message.
        reason: String,
    },

    /// The HTTP client could not be built for this request.
    #[error("failed to configure transport: {source}")]
    ClientBuild {
        /// The underlying builder error.
        #[source]
        source: reqwest::Error,
    },

    /// The process-wide transport initialisation failed.
    ///
    /// The failure is remembered: every later `Session::open` reports it too.
    #[error("transport initialisation failed: {reason}")]
    TransportInit {
        /// Builder message from the first attempt.
        reason: String,
    },

    /// File system error opening or writing the destination.
    #[error("IO error on {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The transfer started but did not complete.
    #[error("{kind} error transferring {url} after {bytes_received} bytes{}", status_suffix(.http_status))]
    Transfer {
        /// The URL being transferred.
        url: String,
        /// Failure class.
        kind: TransferErrorKind,
        /// HTTP status, when response headers had been received.
        http_status: Option<u16>,
        /// Bytes accepted by the sink during the call.
        bytes_received: u64,
        /// Transport error, when there is one.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The cancellation signal was observed and the sink refused more bytes.
    #[error("transfer of {url} aborted by cancellation after {bytes_received} bytes")]
    Aborted {
        /// The URL being transferred.
        url: String,
        /// HTTP status of the aborted response.
        http_status: Option<u16>,
        /// Bytes accepted by the sink before the abort.
        bytes_received: u64,
        /// Memory sink contents at the time of the abort (memory transfers only).
        partial_body: Option<Vec<u8>>,
    },

    /// The authorization collaborator could not produce request headers.
    #[error("authorization headers unavailable for {url}")]
    Authorization {
        /// The URL that would have been requested.
        url: String,
    },

    /// The transfer could not enter the paused state.
    #[error("failed to pause transfer: {reason}")]
    PauseFailed {
        /// Why the pause was refused.
        reason: &'static str,
    },

    /// The transfer could not re-enter the running state.
    #[error("failed to resume transfer: {reason}")]
    ResumeFailed {
        /// Why the resume was refused.
        reason: &'static str,
    },
}

#[allow(clippy::ref_option)]
fn status_suffix(status: &Option<u16>) -> String {
    status.map_or_else(String::new, |code| format!(" (HTTP {code})"))
}

impl DownloadError {
    /// Creates an invalid-argument error.
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates an invalid header error.
    pub fn invalid_header(line: impl Into<String>) -> Self {
        Self::InvalidHeader { line: line.into() }
    }

    /// Creates a credential error.
    pub fn credential(
        path: impl Into<PathBuf>,
        format: &'static str,
        reason: impl Into<String>,
    ) -> Self {
        Self::Credential {
            path: path.into(),
            format,
            reason: reason.into(),
        }
    }

    /// Creates a client build error.
    #[must_use]
    pub fn client_build(source: reqwest::Error) -> Self {
        Self::ClientBuild { source }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an authorization failure.
    pub fn authorization(url: impl Into<String>) -> Self {
        Self::Authorization { url: url.into() }
    }

    /// True when the failure was detected before any request was sent.
    #[must_use]
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument { .. })
    }

    /// True for configuration failures (URL, header, certificate, client).
    #[must_use]
    pub fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            Self::InvalidUrl { .. }
                | Self::InvalidHeader { .. }
                | Self::Credential { .. }
                | Self::ClientBuild { .. }
                | Self::TransportInit { .. }
        )
    }

    /// True when the cancellation signal ended the transfer.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted { .. })
    }

    /// HTTP status observed before the failure, if headers had arrived.
    #[must_use]
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Transfer { http_status, .. } | Self::Aborted { http_status, .. } => *http_status,
            _ => None,
        }
    }

    /// Failure class for transfer errors.
    #[must_use]
    pub fn transfer_kind(&self) -> Option<TransferErrorKind> {
        match self {
            Self::Transfer { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

// No `From<reqwest::Error>` / `From<std::io::Error>`: every variant needs a URL
// or path the source error does not carry, so callers go through the helpers.

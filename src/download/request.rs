//! Request descriptors.
//!
//! A [`DownloadRequest`] says what to fetch and where the bytes go. It is
//! built once through [`DownloadRequestBuilder`], validated at `build()`, and
//! then handed by reference to the transfer operations on a
//! [`Session`](super::Session).

use std::num::NonZeroU64;
use std::path::{Path, PathBuf};

use super::constants::{DEFAULT_RETRY_BUDGET, MAX_PATH_LEN, MAX_URL_LEN};
use super::credential::MtlsCredential;
use super::error::DownloadError;

/// Where received bytes are delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkTarget {
    /// Stream into a file at `path`.
    File {
        /// Destination path.
        path: PathBuf,
    },
    /// Accumulate into an owned buffer returned with the outcome.
    Memory,
}

impl SinkTarget {
    #[must_use]
    pub fn is_memory(&self) -> bool {
        matches!(self, Self::Memory)
    }

    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::File { path } => Some(path),
            Self::Memory => None,
        }
    }
}

/// Integrity metadata carried alongside a request.
///
/// The engine does not verify it; it is logged with the transfer so callers
/// can correlate the download with their own verification step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashMetadata {
    pub value: String,
    pub timestamp: String,
}

/// A validated transfer request.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    url: String,
    body: Option<String>,
    header_line: Option<String>,
    sink: SinkTarget,
    resume_from: Option<u64>,
    retry_budget: u32,
    credential: Option<MtlsCredential>,
    max_rate: Option<NonZeroU64>,
    hash: Option<HashMetadata>,
    verify_peer: bool,
    capture_headers: bool,
}

impl DownloadRequest {
    /// Starts building a request for `url`.
    pub fn builder(url: impl Into<String>) -> DownloadRequestBuilder {
        DownloadRequestBuilder::new(url)
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Request body. When present the request is sent as a POST.
    #[must_use]
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }

    /// Extra `Name: value` header line.
    #[must_use]
    pub fn header_line(&self) -> Option<&str> {
        self.header_line.as_deref()
    }

    #[must_use]
    pub fn sink(&self) -> &SinkTarget {
        &self.sink
    }

    /// Byte offset to resume from. File sinks open for append when set.
    #[must_use]
    pub fn resume_from(&self) -> Option<u64> {
        self.resume_from
    }

    /// Extra attempts allowed after the transient receive error.
    #[must_use]
    pub fn retry_budget(&self) -> u32 {
        self.retry_budget
    }

    #[must_use]
    pub fn credential(&self) -> Option<&MtlsCredential> {
        self.credential.as_ref()
    }

    /// Per-request rate ceiling in bytes per second.
    #[must_use]
    pub fn max_rate(&self) -> Option<NonZeroU64> {
        self.max_rate
    }

    #[must_use]
    pub fn hash(&self) -> Option<&HashMetadata> {
        self.hash.as_ref()
    }

    #[must_use]
    pub fn verify_peer(&self) -> bool {
        self.verify_peer
    }

    #[must_use]
    pub fn capture_headers(&self) -> bool {
        self.capture_headers
    }

    /// Copy of this request with a different destination.
    #[must_use]
    pub fn with_sink(&self, sink: SinkTarget) -> Self {
        Self {
            sink,
            ..self.clone()
        }
    }
}

/// Builder for [`DownloadRequest`].
#[derive(Debug, Clone)]
#[must_use]
pub struct DownloadRequestBuilder {
    url: String,
    body: Option<String>,
    header_line: Option<String>,
    sink: Option<SinkTarget>,
    resume_from: Option<u64>,
    retry_budget: u32,
    credential: Option<MtlsCredential>,
    max_rate: u64,
    hash: Option<HashMetadata>,
    verify_peer: bool,
    capture_headers: bool,
}

impl DownloadRequestBuilder {
    fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            body: None,
            header_line: None,
            sink: None,
            resume_from: None,
            retry_budget: DEFAULT_RETRY_BUDGET,
            credential: None,
            max_rate: 0,
            hash: None,
            verify_peer: true,
            capture_headers: false,
        }
    }

    /// Deliver the response into the file at `path`.
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.sink = Some(SinkTarget::File { path: path.into() });
        self
    }

    /// Deliver the response into memory.
    pub fn memory(mut self) -> Self {
        self.sink = Some(SinkTarget::Memory);
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn header(mut self, line: impl Into<String>) -> Self {
        self.header_line = Some(line.into());
        self
    }

    pub fn resume_from(mut self, offset: u64) -> Self {
        self.resume_from = Some(offset);
        self
    }

    pub fn retry_budget(mut self, budget: u32) -> Self {
        self.retry_budget = budget;
        self
    }

    pub fn credential(mut self, credential: MtlsCredential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Rate ceiling for this transfer. Zero leaves the session's setting alone.
    pub fn max_rate(mut self, bytes_per_sec: u64) -> Self {
        self.max_rate = bytes_per_sec;
        self
    }

    pub fn hash(mut self, value: impl Into<String>, timestamp: impl Into<String>) -> Self {
        self.hash = Some(HashMetadata {
            value: value.into(),
            timestamp: timestamp.into(),
        });
        self
    }

    pub fn verify_peer(mut self, verify: bool) -> Self {
        self.verify_peer = verify;
        self
    }

    pub fn capture_headers(mut self, capture: bool) -> Self {
        self.capture_headers = capture;
        self
    }

    /// Validates and builds the request.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidArgument`] when the URL is empty or
    /// longer than 1024 bytes, when no destination was chosen, or when the
    /// file path is empty or too long.
    pub fn build(self) -> Result<DownloadRequest, DownloadError> {
        if self.url.is_empty() {
            return Err(DownloadError::invalid_argument("URL is empty"));
        }
        if self.url.len() > MAX_URL_LEN {
            return Err(DownloadError::invalid_argument(format!(
                "URL is {} bytes, limit is {MAX_URL_LEN}",
                self.url.len()
            )));
        }
        let Some(sink) = self.sink else {
            return Err(DownloadError::invalid_argument(
                "no destination: choose a file path or memory",
            ));
        };
        if let SinkTarget::File { path } = &sink {
            let len = path.as_os_str().len();
            if len == 0 {
                return Err(DownloadError::invalid_argument("destination path is empty"));
            }
            if len > MAX_PATH_LEN {
                return Err(DownloadError::invalid_argument(format!(
                    "destination path is {len} bytes, limit is {MAX_PATH_LEN}"
                )));
            }
        }

        Ok(DownloadRequest {
            url: self.url,
            body: self.body,
            header_line: self.header_line,
            sink,
            resume_from: self.resume_from,
            retry_budget: self.retry_budget,
            credential: self.credential,
            max_rate: NonZeroU64::new(self.max_rate),
            hash: self.hash,
            verify_peer: self.verify_peer,
            capture_headers: self.capture_headers,
        })
    }
}

//! One HTTP exchange, executed against a sink.
//!
//! An [`Exchange`] is the fully configured request (client, method, URL,
//! headers, body). It is built once per call and reused unchanged for every
//! attempt. [`SinkTransfer`] runs one attempt at a time and is what the retry
//! combinator drives.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RANGE};
use reqwest::{Client, Method, Response, StatusCode};
use tokio::time::Instant;
use tracing::{debug, warn};
use url::Url;

use super::error::{DownloadError, TransferErrorKind};
use super::progress::{Progress, ProgressHook};
use super::retry::Attempt;
use super::sink::Sink;

/// A configured request, reusable across attempts.
#[derive(Debug, Clone)]
pub(crate) struct Exchange {
    pub(crate) client: Client,
    pub(crate) method: Method,
    pub(crate) url: Url,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Option<String>,
    pub(crate) capture_headers: bool,
}

impl Exchange {
    pub(crate) fn url_str(&self) -> &str {
        self.url.as_str()
    }

    fn request(&self, range_start: Option<u64>) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(self.method.clone(), self.url.clone())
            .headers(self.headers.clone());
        if let Some(body) = &self.body {
            builder = builder.body(body.clone());
        }
        if let Some(start) = range_start {
            builder = builder.header(RANGE, format!("bytes={start}-"));
        }
        builder
    }

    /// Sends the request and returns the response once headers arrived.
    ///
    /// `bytes_received` is reported in the error if sending fails.
    pub(crate) async fn send(
        &self,
        range_start: Option<u64>,
        bytes_received: u64,
    ) -> Result<Response, DownloadError> {
        self.request(range_start)
            .send()
            .await
            .map_err(|e| transfer_error(self.url_str(), e, None, bytes_received))
    }
}

/// Parses and validates a URL for transfer.
pub(crate) fn parse_url(url: &str) -> Result<Url, DownloadError> {
    let parsed = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        _ => Err(DownloadError::invalid_url(url)),
    }
}

/// Parses one `Name: value` header line.
pub(crate) fn parse_header_line(line: &str) -> Result<(HeaderName, HeaderValue), DownloadError> {
    let Some((name, value)) = line.split_once(':') else {
        return Err(DownloadError::invalid_header(redact_header_line(line)));
    };
    let name = HeaderName::from_bytes(name.trim().as_bytes())
        .map_err(|_| DownloadError::invalid_header(redact_header_line(line)))?;
    let value = HeaderValue::from_str(value.trim())
        .map_err(|_| DownloadError::invalid_header(redact_header_line(line)))?;
    Ok((name, value))
}

/// Keeps the header name, drops the value, so credentials never reach logs.
fn redact_header_line(line: &str) -> String {
    match line.split_once(':') {
        Some((name, _)) => format!("{}: <redacted>", name.trim()),
        None => "<malformed>".to_string(),
    }
}

/// Builds a header map from a list of header lines.
pub(crate) fn header_map<'a>(
    lines: impl IntoIterator<Item = &'a str>,
) -> Result<HeaderMap, DownloadError> {
    let mut headers = HeaderMap::new();
    for line in lines {
        let (name, value) = parse_header_line(line)?;
        headers.append(name, value);
    }
    Ok(headers)
}

/// Renders the status line and response headers as raw header text.
pub(crate) fn render_headers(response: &Response) -> Vec<u8> {
    let mut out = format!("{:?} {}\r\n", response.version(), response.status()).into_bytes();
    for (name, value) in response.headers() {
        out.extend_from_slice(name.as_str().as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b"\r\n");
    out
}

/// Maps a transport error to a failure class.
pub(crate) fn classify_transport_error(error: &reqwest::Error) -> TransferErrorKind {
    if error.is_timeout() {
        TransferErrorKind::Timeout
    } else if is_tls_error(error) {
        TransferErrorKind::Tls
    } else if error.is_connect() {
        TransferErrorKind::Connect
    } else if error.is_redirect() {
        TransferErrorKind::Redirect
    } else if error.is_body() || error.is_decode() {
        TransferErrorKind::Recv
    } else if error.is_request() {
        TransferErrorKind::Send
    } else {
        TransferErrorKind::Other
    }
}

fn is_tls_error(error: &reqwest::Error) -> bool {
    let mut source: Option<&dyn std::error::Error> = Some(error);
    while let Some(current) = source {
        let message = current.to_string().to_lowercase();
        if message.contains("certificate")
            || message.contains("tls")
            || message.contains("ssl")
            || message.contains("handshake")
        {
            return true;
        }
        source = current.source();
    }
    false
}

pub(crate) fn transfer_error(
    url: &str,
    error: reqwest::Error,
    http_status: Option<u16>,
    bytes_received: u64,
) -> DownloadError {
    DownloadError::Transfer {
        url: url.to_string(),
        kind: classify_transport_error(&error),
        http_status,
        bytes_received,
        source: Some(Box::new(error)),
    }
}

fn write_error(
    url: &str,
    error: std::io::Error,
    http_status: u16,
    bytes_received: u64,
) -> DownloadError {
    DownloadError::Transfer {
        url: url.to_string(),
        kind: TransferErrorKind::Write,
        http_status: Some(http_status),
        bytes_received,
        source: Some(Box::new(error)),
    }
}

/// What a successful attempt observed.
#[derive(Debug)]
pub(crate) struct Delivered {
    pub(crate) http_status: u16,
    pub(crate) headers: Option<Vec<u8>>,
}

/// Streams one exchange into a sink, one attempt per [`Attempt::run`].
pub(crate) struct SinkTransfer<'a> {
    exchange: &'a Exchange,
    sink: &'a mut dyn Sink,
    hooks: &'a [Arc<dyn ProgressHook>],
    bytes_transferred: &'a AtomicU64,
    resume_from: Option<u64>,
    started: Instant,
}

impl<'a> SinkTransfer<'a> {
    pub(crate) fn new(
        exchange: &'a Exchange,
        sink: &'a mut dyn Sink,
        hooks: &'a [Arc<dyn ProgressHook>],
        bytes_transferred: &'a AtomicU64,
        resume_from: Option<u64>,
    ) -> Self {
        Self {
            exchange,
            sink,
            hooks,
            bytes_transferred,
            resume_from,
            started: Instant::now(),
        }
    }

    /// Range start for `attempt`: the resume offset on the first attempt, the
    /// offset plus what the sink already holds on later ones. The offset is
    /// dropped once the sink has been restarted from byte 0.
    fn range_start(&self, attempt: u32) -> Option<u64> {
        let held = self.sink.bytes_written();
        if attempt <= 1 || held == 0 {
            return self.resume_from;
        }
        Some(self.resume_from.unwrap_or(0) + held)
    }
}

#[async_trait]
impl<'a> Attempt for SinkTransfer<'a> {
    type Output = Delivered;
    type Error = DownloadError;

    async fn run(&mut self, attempt: u32) -> Result<Delivered, DownloadError> {
        let exchange = self.exchange;
        let url = exchange.url_str();
        let range_start = self.range_start(attempt);
        debug!(attempt, method = %exchange.method, range_start, "sending request");

        let response = exchange
            .send(range_start, self.sink.bytes_written())
            .await?;
        let status = response.status();
        let http_status = status.as_u16();
        debug!(attempt, http_status, "response headers received");

        let range_ignored = range_start.is_some()
            && status.is_success()
            && status != StatusCode::PARTIAL_CONTENT;
        if range_ignored {
            warn!(
                attempt,
                http_status,
                "server ignored the range, restarting destination from byte 0"
            );
            self.sink
                .restart()
                .await
                .map_err(|e| write_error(url, e, http_status, 0))?;
            self.resume_from = None;
        }

        let headers = exchange
            .capture_headers
            .then(|| render_headers(&response));
        let total = response.content_length();
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                transfer_error(url, e, Some(http_status), self.sink.bytes_written())
            })?;
            self.bytes_transferred
                .fetch_add(chunk.len() as u64, Ordering::Relaxed);

            let accepted = self.sink.on_bytes_received(&chunk).await.map_err(|e| {
                write_error(url, e, http_status, self.sink.bytes_written())
            })?;
            if accepted < chunk.len() {
                warn!(
                    offered = chunk.len(),
                    accepted,
                    "sink refused bytes, aborting transfer"
                );
                return Err(DownloadError::Aborted {
                    url: url.to_string(),
                    http_status: Some(http_status),
                    bytes_received: self.sink.bytes_written(),
                    partial_body: None,
                });
            }

            let progress = Progress {
                downloaded: self.sink.bytes_written(),
                chunk_len: chunk.len() as u64,
                total,
                elapsed: self.started.elapsed(),
            };
            for hook in self.hooks {
                hook.on_progress(&progress).await;
            }
        }

        Ok(Delivered {
            http_status,
            headers,
        })
    }
}

//! Transfer orchestration: request + sink + throttle on a session.
//!
//! Every transfer entry point on [`Session`] follows the same steps:
//!
//! 1. validate the request against the operation (no network traffic on failure)
//! 2. build the [`Exchange`]: client (per-call when a client certificate or
//!    insecure TLS is needed), method, headers, body
//! 3. apply the request's rate ceiling to the session throttle
//! 4. open the sink: truncate or append for files, an empty buffer for memory
//! 5. run attempts through [`retry_transient`], retrying only the transient
//!    receive error, up to the request's budget
//! 6. flush the sink and report the HTTP status and byte counts
//!
//! Any HTTP status is a completed transfer. A 404 comes back as
//! `Ok(TransferOutcome { http_status: 404, .. })`; callers check the status.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use reqwest::Method;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use tracing::{debug, info, instrument, warn};

use super::auth::AuthorizationProvider;
use super::error::{DownloadError, TransferErrorKind};
use super::progress::ProgressHook;
use super::request::{DownloadRequest, SinkTarget};
use super::retry::{RetryPolicy, classify_error, retry_transient};
use super::session::Session;
use super::sink::{FileSink, MemorySink, Sink};
use super::transport::{Delivered, Exchange, SinkTransfer, header_map, parse_url};

/// Result of a completed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    /// HTTP status of the final response. Not necessarily 2xx.
    pub http_status: u16,
    /// Bytes held by the destination after the call.
    pub bytes_received: u64,
    /// Response body for memory transfers.
    pub body: Option<Vec<u8>>,
    /// Raw response header block, when the request asked for it.
    pub headers: Option<Vec<u8>>,
}

impl TransferOutcome {
    /// True for 2xx statuses.
    #[must_use]
    pub fn is_success_status(&self) -> bool {
        (200..300).contains(&self.http_status)
    }

    /// Body as UTF-8 text, lossily converted.
    #[must_use]
    pub fn body_text(&self) -> Option<String> {
        self.body
            .as_deref()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }
}

impl Session {
    /// Downloads to whichever destination the request names.
    ///
    /// # Errors
    ///
    /// See [`download_to_file`](Self::download_to_file) and
    /// [`download_to_memory`](Self::download_to_memory).
    pub async fn download(
        &mut self,
        request: &DownloadRequest,
    ) -> Result<TransferOutcome, DownloadError> {
        match request.sink() {
            SinkTarget::File { .. } => self.download_to_file(request).await,
            SinkTarget::Memory => self.download_to_memory(request).await,
        }
    }

    /// Streams the response into the request's file.
    ///
    /// The file is truncated, or opened for append when the request carries a
    /// resume offset. Partial contents are kept on failure.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::InvalidArgument`] if the request targets memory
    /// - setup failures (URL, header, certificate, client, destination file)
    /// - [`DownloadError::Transfer`] once retries are exhausted
    /// - [`DownloadError::Aborted`] when the cancellation signal is raised
    #[instrument(skip(self, request), fields(session_id = self.id(), url = %request.url()))]
    pub async fn download_to_file(
        &mut self,
        request: &DownloadRequest,
    ) -> Result<TransferOutcome, DownloadError> {
        ensure_file_sink(request)?;
        let exchange = self.prepare(request, Method::GET, Vec::new()).await?;
        self.run_file(&exchange, request).await
    }

    /// Collects the response in memory.
    ///
    /// # Errors
    ///
    /// [`DownloadError::InvalidArgument`] if the request targets a file;
    /// otherwise as for [`download_to_file`](Self::download_to_file). An
    /// aborted transfer carries the bytes received so far in `partial_body`.
    #[instrument(skip(self, request), fields(session_id = self.id(), url = %request.url()))]
    pub async fn download_to_memory(
        &mut self,
        request: &DownloadRequest,
    ) -> Result<TransferOutcome, DownloadError> {
        ensure_memory_sink(request)?;
        let exchange = self.prepare(request, Method::GET, Vec::new()).await?;
        self.run_memory(&exchange, request).await
    }

    /// Downloads with headers from an authorization provider.
    ///
    /// # Errors
    ///
    /// [`DownloadError::Authorization`] when the provider returns no headers;
    /// nothing is sent in that case. Otherwise as for [`download`](Self::download).
    #[instrument(skip(self, request, provider), fields(session_id = self.id(), url = %request.url()))]
    pub async fn download_authenticated(
        &mut self,
        request: &DownloadRequest,
        provider: &dyn AuthorizationProvider,
    ) -> Result<TransferOutcome, DownloadError> {
        let Some(auth_headers) = provider.authorization_headers(request).await else {
            warn!("authorization provider returned no headers");
            return Err(DownloadError::authorization(request.url()));
        };
        debug!(count = auth_headers.len(), "authorization headers attached");

        let exchange = self.prepare(request, Method::GET, auth_headers).await?;
        match request.sink() {
            SinkTarget::File { .. } => self.run_file(&exchange, request).await,
            SinkTarget::Memory => self.run_memory(&exchange, request).await,
        }
    }

    /// Sends an empty-bodied PUT and collects the response in memory.
    ///
    /// `token_header` is an extra `Name: value` line, typically `Authorization`.
    ///
    /// # Errors
    ///
    /// [`DownloadError::InvalidArgument`] if the request targets a file;
    /// otherwise as for [`download_to_memory`](Self::download_to_memory).
    #[instrument(skip(self, request, token_header), fields(session_id = self.id(), url = %request.url()))]
    pub async fn put_request(
        &mut self,
        request: &DownloadRequest,
        token_header: Option<&str>,
    ) -> Result<TransferOutcome, DownloadError> {
        ensure_memory_sink(request)?;
        let extra = token_header.map(str::to_string).into_iter().collect();
        let mut exchange = self.prepare(request, Method::PUT, extra).await?;
        exchange.body = None;
        self.run_memory(&exchange, request).await
    }

    /// POSTs the request body as JSON and collects the response in memory.
    ///
    /// # Errors
    ///
    /// [`DownloadError::InvalidArgument`] if the request has no body, the
    /// body is not valid JSON, or the request targets a file; otherwise as
    /// for [`download_to_memory`](Self::download_to_memory).
    #[instrument(skip(self, request, token_header), fields(session_id = self.id(), url = %request.url()))]
    pub async fn json_rpc(
        &mut self,
        request: &DownloadRequest,
        token_header: Option<&str>,
    ) -> Result<TransferOutcome, DownloadError> {
        ensure_memory_sink(request)?;
        let Some(body) = request.body() else {
            return Err(DownloadError::invalid_argument("JSON-RPC request has no body"));
        };
        serde_json::from_str::<serde_json::Value>(body).map_err(|e| {
            DownloadError::invalid_argument(format!("JSON-RPC body is not valid JSON: {e}"))
        })?;

        let extra = token_header.map(str::to_string).into_iter().collect();
        let mut exchange = self.prepare(request, Method::POST, extra).await?;
        exchange
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.run_memory(&exchange, request).await
    }

    /// Turns a request into a ready-to-send exchange.
    ///
    /// A request body upgrades `GET` to `POST`.
    pub(crate) async fn prepare(
        &self,
        request: &DownloadRequest,
        method: Method,
        extra_headers: Vec<String>,
    ) -> Result<Exchange, DownloadError> {
        let url = parse_url(request.url())?;
        let headers = header_map(
            request
                .header_line()
                .into_iter()
                .chain(extra_headers.iter().map(String::as_str)),
        )?;
        if let Some(hash) = request.hash() {
            debug!(hash = %hash.value, timestamp = %hash.timestamp, "expected content hash");
        }
        if !request.verify_peer() {
            warn!("TLS peer verification disabled for this request");
        }
        let client = self
            .client_for(request.credential(), request.verify_peer())
            .await?;

        let method = if method == Method::GET && request.body().is_some() {
            Method::POST
        } else {
            method
        };
        Ok(Exchange {
            client,
            method,
            url,
            headers,
            body: request.body().map(str::to_string),
            capture_headers: request.capture_headers(),
        })
    }

    async fn run_file(
        &self,
        exchange: &Exchange,
        request: &DownloadRequest,
    ) -> Result<TransferOutcome, DownloadError> {
        let Some(path) = request.sink().path() else {
            return Err(DownloadError::invalid_argument(
                "file transfer requested without a destination path",
            ));
        };
        let mut sink = match request.resume_from() {
            Some(offset) => {
                let sink = FileSink::append(path).await?;
                if sink.base_offset() != offset {
                    warn!(
                        resume_from = offset,
                        existing_bytes = sink.base_offset(),
                        "resume offset differs from destination length"
                    );
                }
                sink
            }
            None => FileSink::create(path).await?,
        };

        let delivered = self.execute(exchange, request, &mut sink).await?;
        let outcome = TransferOutcome {
            http_status: delivered.http_status,
            bytes_received: sink.bytes_written(),
            body: None,
            headers: delivered.headers,
        };
        info!(
            http_status = outcome.http_status,
            bytes = outcome.bytes_received,
            path = %path.display(),
            "transfer complete"
        );
        Ok(outcome)
    }

    async fn run_memory(
        &self,
        exchange: &Exchange,
        request: &DownloadRequest,
    ) -> Result<TransferOutcome, DownloadError> {
        let mut sink = MemorySink::new();
        match self.execute(exchange, request, &mut sink).await {
            Ok(delivered) => {
                let body = sink.into_inner();
                info!(
                    http_status = delivered.http_status,
                    bytes = body.len(),
                    "transfer complete"
                );
                Ok(TransferOutcome {
                    http_status: delivered.http_status,
                    bytes_received: body.len() as u64,
                    body: Some(body),
                    headers: delivered.headers,
                })
            }
            Err(DownloadError::Aborted {
                url,
                http_status,
                bytes_received,
                ..
            }) => Err(DownloadError::Aborted {
                url,
                http_status,
                bytes_received,
                partial_body: Some(sink.into_inner()),
            }),
            Err(error) => Err(error),
        }
    }

    /// Runs the retry loop against `sink` and flushes it.
    async fn execute<S: Sink>(
        &self,
        exchange: &Exchange,
        request: &DownloadRequest,
        sink: &mut S,
    ) -> Result<Delivered, DownloadError> {
        let counter = self.bytes_counter();
        counter.store(0, Ordering::Relaxed);

        let throttle = self.throttle();
        if let Some(rate) = request.max_rate() {
            throttle.apply_rate(rate);
        }
        throttle.begin_transfer();

        let mut hooks: Vec<Arc<dyn ProgressHook>> =
            vec![Arc::clone(throttle) as Arc<dyn ProgressHook>];
        if let Some(hook) = self.progress_hook() {
            hooks.push(Arc::clone(hook));
        }

        let policy = RetryPolicy::new(request.retry_budget(), self.config().retry_delay);
        let result = {
            let mut transfer =
                SinkTransfer::new(exchange, &mut *sink, &hooks, counter, request.resume_from());
            retry_transient(&policy, &mut transfer, classify_error).await
        };

        let flushed = sink.finish().await;
        match (result, flushed) {
            (Ok(delivered), Ok(())) => Ok(delivered),
            (Ok(delivered), Err(error)) => Err(DownloadError::Transfer {
                url: exchange.url_str().to_string(),
                kind: TransferErrorKind::Write,
                http_status: Some(delivered.http_status),
                bytes_received: sink.bytes_written(),
                source: Some(Box::new(error)),
            }),
            (Err(error), flushed) => {
                if let Err(flush_error) = flushed {
                    warn!(error = %flush_error, "flushing destination after failure also failed");
                }
                if error.is_aborted() {
                    warn!(bytes = sink.bytes_written(), "transfer aborted by cancellation");
                }
                Err(error)
            }
        }
    }
}

fn ensure_file_sink(request: &DownloadRequest) -> Result<(), DownloadError> {
    if request.sink().is_memory() {
        return Err(DownloadError::invalid_argument(
            "file download requested for a memory destination",
        ));
    }
    Ok(())
}

fn ensure_memory_sink(request: &DownloadRequest) -> Result<(), DownloadError> {
    if !request.sink().is_memory() {
        return Err(DownloadError::invalid_argument(
            "memory transfer requested for a file destination",
        ));
    }
    Ok(())
}

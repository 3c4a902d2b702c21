//! Header probe and connectivity check.

use std::path::Path;
use std::time::Duration;

use reqwest::Method;
use tracing::{debug, info, instrument};

use super::constants::DEFAULT_CONNECTIVITY_TIMEOUT;
use super::credential::MtlsCredential;
use super::error::DownloadError;
use super::session::Session;
use super::transport::{Exchange, parse_url, render_headers};

impl Session {
    /// Sends a HEAD request and writes the status line and response headers
    /// to `headers_path`. Returns the HTTP status.
    ///
    /// # Errors
    ///
    /// [`DownloadError::InvalidArgument`] for an empty URL or path, setup
    /// failures for a bad URL or certificate, [`DownloadError::Transfer`] if
    /// no response arrives, and [`DownloadError::Io`] if the file cannot be
    /// written.
    #[instrument(skip(self, credential), fields(session_id = self.id()))]
    pub async fn fetch_header_info(
        &self,
        url: &str,
        credential: Option<&MtlsCredential>,
        headers_path: &Path,
    ) -> Result<u16, DownloadError> {
        if url.is_empty() {
            return Err(DownloadError::invalid_argument("URL is empty"));
        }
        if headers_path.as_os_str().is_empty() {
            return Err(DownloadError::invalid_argument("headers path is empty"));
        }

        let exchange = Exchange {
            client: self.client_for(credential, true).await?,
            method: Method::HEAD,
            url: parse_url(url)?,
            headers: reqwest::header::HeaderMap::new(),
            body: None,
            capture_headers: true,
        };
        let response = exchange.send(None, 0).await?;
        let status = response.status().as_u16();

        tokio::fs::write(headers_path, render_headers(&response))
            .await
            .map_err(|e| DownloadError::io(headers_path, e))?;
        info!(http_status = status, path = %headers_path.display(), "response headers saved");
        Ok(status)
    }

    /// Returns true when any HTTP response arrives from `url` within `timeout`.
    ///
    /// `url` defaults to the session's configured probe URL and a zero
    /// `timeout` to five seconds. The status code is not inspected.
    #[instrument(skip(self), fields(session_id = self.id()))]
    pub async fn check_connectivity(&self, url: Option<&str>, timeout: Duration) -> bool {
        let url = url.unwrap_or(&self.config().connectivity_url);
        let timeout = if timeout.is_zero() {
            DEFAULT_CONNECTIVITY_TIMEOUT
        } else {
            timeout
        };
        let Ok(client) = self.client_for(None, true).await else {
            return false;
        };

        match client.head(url).timeout(timeout).send().await {
            Ok(response) => {
                debug!(http_status = response.status().as_u16(), "connectivity probe answered");
                true
            }
            Err(error) => {
                debug!(%error, "connectivity probe failed");
                false
            }
        }
    }
}

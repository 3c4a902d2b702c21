//! Authorization header providers for authenticated downloads.

use async_trait::async_trait;

use super::request::DownloadRequest;

/// Supplies the authorization header lines for a request.
///
/// Returning `None` means no headers can be produced; the download fails
/// with [`DownloadError::Authorization`](super::DownloadError::Authorization)
/// and nothing is sent.
#[async_trait]
pub trait AuthorizationProvider: Send + Sync {
    async fn authorization_headers(&self, request: &DownloadRequest) -> Option<Vec<String>>;
}

/// Fixed set of `Name: value` header lines.
#[derive(Clone, Default)]
pub struct StaticHeaders(pub Vec<String>);

#[async_trait]
impl AuthorizationProvider for StaticHeaders {
    async fn authorization_headers(&self, _request: &DownloadRequest) -> Option<Vec<String>> {
        Some(self.0.clone())
    }
}

impl std::fmt::Debug for StaticHeaders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("StaticHeaders")
            .field(&format_args!("{} header(s)", self.0.len()))
            .finish()
    }
}

/// `Authorization: Bearer <token>`. An empty token produces no headers.
#[derive(Clone)]
pub struct BearerToken(pub String);

#[async_trait]
impl AuthorizationProvider for BearerToken {
    async fn authorization_headers(&self, _request: &DownloadRequest) -> Option<Vec<String>> {
        let token = self.0.trim();
        if token.is_empty() {
            return None;
        }
        Some(vec![format!("Authorization: Bearer {token}")])
    }
}

impl std::fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BearerToken(<redacted>)")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn request() -> DownloadRequest {
        DownloadRequest::builder("https://example.com/fw.bin")
            .memory()
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_bearer_token_header_line() {
        let headers = BearerToken("abc".to_string())
            .authorization_headers(&request())
            .await
            .unwrap();
        assert_eq!(headers, vec!["Authorization: Bearer abc".to_string()]);
    }

    #[tokio::test]
    async fn test_empty_bearer_token_yields_nothing() {
        assert!(
            BearerToken("  ".to_string())
                .authorization_headers(&request())
                .await
                .is_none()
        );
    }

    #[test]
    fn test_debug_never_prints_secrets() {
        let bearer = format!("{:?}", BearerToken("s3cret".to_string()));
        let fixed = format!("{:?}", StaticHeaders(vec!["X-Key: s3cret".to_string()]));
        assert!(!bearer.contains("s3cret"));
        assert!(!fixed.contains("s3cret"));
    }
}

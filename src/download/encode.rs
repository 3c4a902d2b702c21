//! Query-component encoding.

/// Percent-encodes `text` for use in a URL component.
///
/// Only the unreserved characters `A-Z a-z 0-9 - _ . ~` pass through; a space
/// becomes `%20`, and multi-byte UTF-8 is encoded byte by byte.
#[must_use]
pub fn url_encode(text: &str) -> String {
    urlencoding::encode(text).into_owned()
}

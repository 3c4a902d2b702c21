//! Constants for the download module (timeouts, request limits).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Longest URL a request descriptor accepts, in bytes.
pub const MAX_URL_LEN: usize = 1024;

/// Longest destination path a request descriptor accepts, in bytes.
pub const MAX_PATH_LEN: usize = 4096;

/// Default number of extra attempts after the transient receive error.
pub const DEFAULT_RETRY_BUDGET: u32 = 0;

/// Initial memory sink reservation on the first write.
pub const MEMORY_SINK_INITIAL_CAPACITY: usize = 16 * 1024;

/// URL probed by the connectivity check when none is configured.
pub const DEFAULT_CONNECTIVITY_URL: &str = "http://connectivitycheck.gstatic.com/generate_204";

/// Timeout applied to the connectivity probe when the caller passes zero.
pub const DEFAULT_CONNECTIVITY_TIMEOUT: Duration = Duration::from_secs(5);

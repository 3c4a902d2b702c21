//! Process-wide cancellation signal.
//!
//! One flag for the whole process. Every sink consults it on each write, so
//! raising it stops *every* in-flight transfer on every [`Session`], not only
//! the one the caller had in mind. That is the intended "stop everything now"
//! behaviour; there is no per-session or per-request variant.
//!
//! The flag is a plain atomic, so it can be raised from any thread, from a
//! Ctrl-C handler task, or from code running inside another transfer. It is
//! observed at the next write boundary: a chunk that is already being written
//! still lands.
//!
//! The flag is never reset automatically. Callers that want to start new
//! transfers after a cancellation must lower it with `set_cancelled(false)`.
//!
//! [`Session`]: super::Session

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

static CANCELLED: AtomicBool = AtomicBool::new(false);

/// Raises or lowers the process-wide cancellation signal.
pub fn set_cancelled(cancelled: bool) {
    let previous = CANCELLED.swap(cancelled, Ordering::SeqCst);
    if previous != cancelled {
        info!(cancelled, "cancellation signal changed");
    }
}

/// Returns true while the cancellation signal is raised.
#[must_use]
pub fn is_cancelled() -> bool {
    CANCELLED.load(Ordering::SeqCst)
}

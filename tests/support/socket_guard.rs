//! Skip logic for tests that need a localhost socket.
//!
//! Sandboxed CI runners sometimes forbid binding. Those tests skip with a note
//! on stderr unless `FWDL_REQUIRE_SOCKET_TESTS` is set, in which case they fail.

use std::net::TcpListener;
use std::panic::Location;

use wiremock::MockServer;

const REQUIRE_ENV: &str = "FWDL_REQUIRE_SOCKET_TESTS";

#[must_use]
pub fn socket_tests_required() -> bool {
    std::env::var(REQUIRE_ENV)
        .ok()
        .is_some_and(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

#[track_caller]
#[must_use]
pub fn should_skip_socket_bound_test() -> bool {
    if TcpListener::bind("127.0.0.1:0").is_ok() {
        return false;
    }

    let caller = Location::caller();
    let note = format!(
        "[fwdl-socket] {}:{} needs a localhost socket and none can be bound here",
        caller.file(),
        caller.line()
    );
    assert!(!socket_tests_required(), "{note} ({REQUIRE_ENV} is set)");
    eprintln!("{note}; skipping (set {REQUIRE_ENV}=1 to fail instead)");
    true
}

pub async fn start_mock_server_or_skip() -> Option<MockServer> {
    if should_skip_socket_bound_test() {
        return None;
    }
    Some(MockServer::start().await)
}

/// A localhost port with nothing listening on it, or `None` when binding is
/// not possible.
#[must_use]
pub fn closed_local_port() -> Option<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").ok()?;
    let port = listener.local_addr().ok()?.port();
    drop(listener);
    Some(port)
}

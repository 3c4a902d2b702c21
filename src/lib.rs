//! fwdl core library
//!
//! Download engine for firmware images and update artifacts: sessions,
//! file and memory destinations, throttling, resume, mutual TLS and a
//! process-wide cancellation signal.
//!
//! # Architecture
//!
//! - [`download`] - sessions, requests, sinks, throttle and the transfer orchestrator
//! - [`download::cancel`] - the process-wide cancellation signal

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod download;
mod user_agent;

// Re-export commonly used types
pub use download::{
    AuthorizationProvider, DownloadError, DownloadRequest, MtlsCredential, Session,
    SessionConfig, SessionController, SinkTarget, TransferErrorKind, TransferOutcome,
    url_encode,
};

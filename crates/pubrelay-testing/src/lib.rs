//! Test utilities for the pubrelay workspace.
//!
//! Provides a wiremock-backed stand-in for the remote pub/sub service and
//! fixtures for building operations.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

pub mod fixtures;
pub mod http;

pub use http::{MockPubSub, RecordedCall, PUBLISH_ACK};

/// Installs a test subscriber honouring `RUST_LOG`. Safe to call repeatedly.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

//! Signed HTTP session for the remote pub/sub API.
//!
//! An [`Agent`] owns one lazily-built HTTP client bound to a publish and
//! subscribe key pair. It builds HMAC-SHA256 signed requests for publish,
//! grant, revoke and audit calls and always hands back a decoded response
//! object once the transport succeeded.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use pubrelay_client::{Agent, AgentConfig, Credentials};
//! use pubrelay_core::RealClock;
//!
//! # async fn example() -> pubrelay_client::Result<()> {
//! let credentials = Credentials::new("pub-c-demo", "sub-c-demo", Some("sec-c-demo"));
//! let agent = Agent::new(AgentConfig::new(credentials), Arc::new(RealClock::new()))?;
//!
//! let response = agent.publish("news", r#"{"text":"hello"}"#, None, true).await?;
//! assert!(response.is_success());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod agent;
pub mod error;
pub mod request;
pub mod response;
pub mod signing;

pub use agent::{Agent, AgentConfig, DEFAULT_ORIGIN};
pub use error::{Result, SessionError};
pub use request::{Credentials, PublishParams};
pub use response::{AuditResponse, GrantResponse, Response};
pub use signing::sign;

/// Query parameter key identifying the client library.
pub const SDK_PARAM_KEY: &str = "pnsdk";

/// Client library identification sent with every request.
pub const SDK_VERSION: &str = concat!("PubRelay-Rust/", env!("CARGO_PKG_VERSION"));

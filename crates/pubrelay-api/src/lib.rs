//! Configuration and trigger-call boundary for pubrelay.
//!
//! [`Config`] gathers keys and tuning from defaults, `pubrelay.toml` and the
//! environment. The [`boundary`] module turns raw trigger-call arguments into
//! queued operations on a [`pubrelay_delivery::RelayService`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod boundary;
pub mod config;

pub use boundary::{
    dispatch_call, grant_call, publish_call, revoke_call, BoundaryError, TriggerCall,
    DEFAULT_GRANT_TTL,
};
pub use config::Config;

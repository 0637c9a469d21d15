//! Core domain types for the pubrelay pipeline.
//!
//! Provides the queued operation model, the channel-name validator that
//! guards the queue boundary, and the clock abstraction shared by the
//! signing client and the delivery executor. Every other crate in the
//! workspace builds on these types.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod channel;
pub mod error;
pub mod models;
pub mod time;

pub use channel::{validate, ChannelName, MAX_CHANNEL_LEN};
pub use error::{CoreError, Result};
pub use models::{GrantOp, Operation, OperationId, OperationKind, PublishOp};
pub use time::{Clock, RealClock, TestClock};

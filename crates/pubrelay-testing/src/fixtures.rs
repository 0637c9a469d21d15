//! Operation fixtures.

use pubrelay_core::{ChannelName, GrantOp, Operation, PublishOp};

/// Publish key used by fixtures.
pub const PUBLISH_KEY: &str = "pub-c-test";

/// Subscribe key used by fixtures.
pub const SUBSCRIBE_KEY: &str = "sub-c-test";

/// Secret key used by fixtures.
pub const SECRET_KEY: &str = "sec-c-test";

/// Parses a channel name, panicking on invalid input.
pub fn channel(name: &str) -> ChannelName {
    ChannelName::parse(name).expect("fixture channel must be valid")
}

/// Publish operation with history enabled.
pub fn publish(name: &str, payload: &str) -> Operation {
    PublishOp::from_flags(channel(name), payload.to_string(), "h").into()
}

/// Grant operation with read and write rights.
pub fn grant(name: &str, auth: &str) -> Operation {
    GrantOp::from_rights(channel(name), auth, "rw", 60).into()
}

/// Revoke operation.
pub fn revoke(name: &str, auth: &str) -> Operation {
    GrantOp::revoke(channel(name), auth, -1).into()
}

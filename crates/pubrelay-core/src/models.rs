//! Queued operation model.
//!
//! An `Operation` is the unit of work carried from the synchronous caller to
//! the delivery executor. It is a closed union of publish and grant requests
//! and is immutable once created.

use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::channel::ChannelName;

/// Strongly-typed operation identifier.
///
/// Assigned at enqueue time and carried through every log line emitted while
/// the operation is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationId(pub Uuid);

impl OperationId {
    /// Creates a new random operation ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Publish a JSON message to a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishOp {
    /// Destination channel.
    pub channel: ChannelName,
    /// Whether the remote service keeps the message in channel history.
    pub store_in_history: bool,
    /// Serialized JSON message.
    pub payload: Bytes,
}

impl PublishOp {
    /// Flag character enabling history storage.
    pub const HISTORY_FLAG: char = 'h';

    /// Builds a publish operation from the caller's flag string.
    ///
    /// History storage is enabled when `flags` contains `'h'`.
    pub fn from_flags(channel: ChannelName, payload: impl Into<Bytes>, flags: &str) -> Self {
        Self {
            channel,
            store_in_history: flags.contains(Self::HISTORY_FLAG),
            payload: payload.into(),
        }
    }

    /// Returns the payload as text, replacing invalid UTF-8.
    pub fn message(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.payload)
    }
}

/// Grant or revoke access for an auth key on a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantOp {
    /// Channel the rights apply to.
    pub channel: ChannelName,
    /// Auth key receiving the rights. Empty grants channel-wide.
    pub auth_key: String,
    /// Read permission.
    pub read: bool,
    /// Write permission.
    pub write: bool,
    /// Grant lifetime in minutes; `None` leaves the remote default.
    pub ttl_minutes: Option<u32>,
}

impl GrantOp {
    /// Builds a grant from the caller's rights string.
    ///
    /// `'r'` enables read and `'w'` enables write. A negative `ttl` means no
    /// explicit lifetime is sent.
    pub fn from_rights(
        channel: ChannelName,
        auth_key: impl Into<String>,
        rights: &str,
        ttl: i64,
    ) -> Self {
        Self {
            channel,
            auth_key: auth_key.into(),
            read: rights.contains('r'),
            write: rights.contains('w'),
            ttl_minutes: u32::try_from(ttl).ok(),
        }
    }

    /// Builds a revoke: a grant with every right disabled.
    pub fn revoke(channel: ChannelName, auth_key: impl Into<String>, ttl: i64) -> Self {
        Self::from_rights(channel, auth_key, "", ttl)
    }
}

/// A queued unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operation {
    /// Publish a message.
    Publish(PublishOp),
    /// Grant or revoke access.
    Grant(GrantOp),
}

impl Operation {
    /// Returns the operation's channel.
    pub fn channel(&self) -> &ChannelName {
        match self {
            Self::Publish(op) => &op.channel,
            Self::Grant(op) => &op.channel,
        }
    }

    /// Returns the operation kind.
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Publish(_) => OperationKind::Publish,
            Self::Grant(_) => OperationKind::Grant,
        }
    }
}

impl From<PublishOp> for Operation {
    fn from(op: PublishOp) -> Self {
        Self::Publish(op)
    }
}

impl From<GrantOp> for Operation {
    fn from(op: GrantOp) -> Self {
        Self::Grant(op)
    }
}

/// Discriminant of an `Operation`, used for per-kind retry policies and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Publish request.
    Publish,
    /// Grant or revoke request.
    Grant,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Publish => write!(f, "publish"),
            Self::Grant => write!(f, "grant"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(name: &str) -> ChannelName {
        ChannelName::parse(name).unwrap()
    }

    #[test]
    fn publish_flags_enable_history() {
        let op = PublishOp::from_flags(channel("chat"), r#"{"a":1}"#, "h");
        assert!(op.store_in_history);
        assert_eq!(op.message(), r#"{"a":1}"#);

        let op = PublishOp::from_flags(channel("chat"), "{}", "");
        assert!(!op.store_in_history);
    }

    #[test]
    fn grant_rights_parsed() {
        let op = GrantOp::from_rights(channel("chat"), "key", "rw", 60);
        assert!(op.read && op.write);
        assert_eq!(op.ttl_minutes, Some(60));

        let op = GrantOp::from_rights(channel("chat"), "key", "r", -1);
        assert!(op.read && !op.write);
        assert_eq!(op.ttl_minutes, None);
    }

    #[test]
    fn revoke_is_grant_without_rights() {
        let revoke = GrantOp::revoke(channel("chat"), "key", 5);
        let grant = GrantOp::from_rights(channel("chat"), "key", "", 5);
        assert_eq!(revoke, grant);
        assert!(!revoke.read && !revoke.write);
    }

    #[test]
    fn operation_accessors() {
        let op: Operation = PublishOp::from_flags(channel("news"), "{}", "").into();
        assert_eq!(op.kind(), OperationKind::Publish);
        assert_eq!(op.channel().as_str(), "news");
        assert_eq!(OperationKind::Grant.to_string(), "grant");
    }
}

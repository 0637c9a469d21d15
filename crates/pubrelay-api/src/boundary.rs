//! Trigger-call boundary.
//!
//! A host (database trigger, stdin reader) hands over raw string arguments.
//! Each call is checked here and either enqueued on the relay service or
//! rejected with a [`BoundaryError`]; nothing invalid reaches the queue.
//!
//! | call      | arguments                          |
//! |-----------|------------------------------------|
//! | `publish` | `channel, message [, flags]`       |
//! | `grant`   | `channel, auth, rights, ttl`       |
//! | `revoke`  | `channel, auth [, ttl]`            |

use pubrelay_core::{ChannelName, CoreError, OperationId};
use pubrelay_delivery::{RelayService, Session};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

/// Grant lifetime in minutes used when the ttl argument does not parse.
pub const DEFAULT_GRANT_TTL: i64 = 1440;

/// Reasons a trigger call is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoundaryError {
    /// Wrong number of arguments.
    #[error("{call}: expected {expected} arguments, got {actual}")]
    ArgumentCount {
        /// Name of the call
        call: &'static str,
        /// Accepted argument counts
        expected: &'static str,
        /// Arguments received
        actual: usize,
    },

    /// The channel name is empty, too long or contains disallowed characters.
    #[error(transparent)]
    InvalidChannel(#[from] CoreError),

    /// The call name is not one of `publish`, `grant` or `revoke`.
    #[error("unknown call {name:?}")]
    UnknownCall {
        /// Name received
        name: String,
    },

    /// The publish message is not a JSON object.
    #[error("invalid JSON message: {message}")]
    InvalidPayload {
        /// Decoder error
        message: String,
    },
}

/// A named call with its raw arguments, as read from a host.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TriggerCall {
    /// Call name.
    pub call: String,
    /// Positional arguments.
    #[serde(default)]
    pub args: Vec<String>,
}

/// Routes `call` to the matching handler.
///
/// # Errors
///
/// Returns `BoundaryError::UnknownCall` for an unrecognised name, or the
/// handler's error.
pub fn dispatch_call<S: Session>(
    service: &RelayService<S>,
    call: &TriggerCall,
) -> Result<OperationId, BoundaryError> {
    match call.call.as_str() {
        "publish" => publish_call(service, &call.args),
        "grant" => grant_call(service, &call.args),
        "revoke" => revoke_call(service, &call.args),
        other => Err(reject(BoundaryError::UnknownCall { name: other.to_string() })),
    }
}

/// Handles `publish(channel, message [, flags])`.
///
/// The message must decode as a JSON object (or `null`); it is forwarded
/// byte for byte.
///
/// # Errors
///
/// Returns a `BoundaryError` for a wrong argument count, an invalid channel
/// or a message that is not a JSON object.
pub fn publish_call<S: Session>(
    service: &RelayService<S>,
    args: &[String],
) -> Result<OperationId, BoundaryError> {
    let [channel, message, rest @ ..] = args else {
        return Err(reject(arg_count("publish", "2 or 3", args.len())));
    };
    if rest.len() > 1 {
        return Err(reject(arg_count("publish", "2 or 3", args.len())));
    }
    let flags = rest.first().map_or("", String::as_str);

    if let Err(e) = serde_json::from_str::<Option<Map<String, Value>>>(message) {
        warn!(message = %message, error = %e, "failed to decode publish message");
        return Err(BoundaryError::InvalidPayload { message: e.to_string() });
    }

    let channel = parse_channel("publish", channel)?;
    Ok(service.publish(channel, message.clone(), flags))
}

/// Handles `grant(channel, auth, rights, ttl)`.
///
/// An unparsable ttl falls back to [`DEFAULT_GRANT_TTL`].
///
/// # Errors
///
/// Returns a `BoundaryError` for a wrong argument count or an invalid
/// channel.
pub fn grant_call<S: Session>(
    service: &RelayService<S>,
    args: &[String],
) -> Result<OperationId, BoundaryError> {
    let [channel, auth, rights, ttl] = args else {
        return Err(reject(arg_count("grant", "4", args.len())));
    };

    let channel = parse_channel("grant", channel)?;
    Ok(service.grant(channel, auth, rights, parse_ttl(ttl)))
}

/// Handles `revoke(channel, auth [, ttl])`.
///
/// Without a ttl argument no lifetime is sent.
///
/// # Errors
///
/// Returns a `BoundaryError` for a wrong argument count or an invalid
/// channel.
pub fn revoke_call<S: Session>(
    service: &RelayService<S>,
    args: &[String],
) -> Result<OperationId, BoundaryError> {
    let (channel, auth, ttl) = match args {
        [channel, auth] => (channel, auth, -1),
        [channel, auth, ttl] => (channel, auth, parse_ttl(ttl)),
        _ => return Err(reject(arg_count("revoke", "2 or 3", args.len()))),
    };

    let channel = parse_channel("revoke", channel)?;
    Ok(service.revoke(channel, auth, ttl))
}

fn parse_channel(call: &str, raw: &str) -> Result<ChannelName, BoundaryError> {
    ChannelName::parse(raw).map_err(|e| {
        warn!(call, channel = %raw, error = %e, "invalid channel name");
        BoundaryError::from(e)
    })
}

fn parse_ttl(raw: &str) -> i64 {
    raw.parse().unwrap_or(DEFAULT_GRANT_TTL)
}

fn arg_count(call: &'static str, expected: &'static str, actual: usize) -> BoundaryError {
    BoundaryError::ArgumentCount { call, expected, actual }
}

fn reject(error: BoundaryError) -> BoundaryError {
    warn!(error = %error, "trigger call rejected");
    error
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_falls_back_to_default() {
        assert_eq!(parse_ttl("60"), 60);
        assert_eq!(parse_ttl(" 5 "), DEFAULT_GRANT_TTL);
        assert_eq!(parse_ttl("-1"), -1);
        assert_eq!(parse_ttl("soon"), DEFAULT_GRANT_TTL);
        assert_eq!(parse_ttl(""), DEFAULT_GRANT_TTL);
    }
}

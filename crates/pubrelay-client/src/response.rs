//! Remote response types.
//!
//! The remote service answers with a JSON object carrying `status`,
//! `service`, `error` and `message`; grant and audit responses add a
//! `payload` with permission bits. A body that cannot be decoded is turned
//! into a synthetic `400` response so callers always receive a response once
//! the transport succeeded.

use std::collections::HashMap;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Status used for responses synthesized from undecodable bodies.
pub const SYNTHETIC_STATUS: u16 = 400;

/// Base response shared by every call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Response {
    /// Status code reported by the service.
    pub status: u16,
    /// Name of the answering service.
    pub service: String,
    /// Error flag reported by the service.
    pub error: bool,
    /// Human-readable message, or the raw body for publish acknowledgements.
    pub message: String,
    /// Set when the body could not be decoded and this response stands in
    /// for it. Never sent by the service.
    #[serde(skip)]
    pub decode_failed: bool,
}

impl Response {
    /// Synthesizes a response from a decode failure.
    pub fn synthetic(message: impl Into<String>) -> Self {
        Self {
            status: SYNTHETIC_STATUS,
            error: false,
            message: message.into(),
            decode_failed: true,
            ..Self::default()
        }
    }

    /// Returns true for a 2xx status without the error flag.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status) && !self.error
    }
}

/// Permission bits for one auth key in a grant response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Permissions {
    /// Read.
    pub r: u8,
    /// Write.
    pub w: u8,
    /// Manage.
    pub m: u8,
    /// Delete.
    pub d: u8,
}

/// Payload of a grant response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrantPayload {
    /// Subscribe key the grant applies to.
    pub subscribe_key: String,
    /// Grant level (`subkey`, `channel` or `user`).
    pub level: String,
    /// Channel the grant applies to.
    pub channel: String,
    /// Permissions keyed by auth key.
    pub auths: HashMap<String, Permissions>,
    /// Grant ttl in minutes.
    pub ttl: i64,
}

/// Response to a grant or revoke call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantResponse {
    /// Base response fields.
    #[serde(flatten)]
    pub response: Response,
    /// Grant details.
    #[serde(default)]
    pub payload: GrantPayload,
}

/// Permission bits and ttl for one auth key in an audit response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditPermissions {
    /// Read.
    pub r: u8,
    /// Write.
    pub w: u8,
    /// Manage.
    pub m: u8,
    /// Remaining ttl in minutes.
    pub ttl: i64,
}

/// Audit entry for one channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditChannel {
    /// Permissions keyed by auth key.
    pub auths: HashMap<String, AuditPermissions>,
}

/// Payload of an audit response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditPayload {
    /// Audited channels.
    pub channels: HashMap<String, AuditChannel>,
    /// Subscribe key audited.
    pub subscribe_key: String,
    /// Audit level.
    pub level: String,
}

/// Response to an audit call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditResponse {
    /// Base response fields.
    #[serde(flatten)]
    pub response: Response,
    /// Audit details.
    #[serde(default)]
    pub payload: AuditPayload,
}

impl AuditResponse {
    /// Returns the largest ttl among the auth keys of `channel`, or 0 when
    /// the channel is absent.
    pub fn max_ttl(&self, channel: &str) -> i64 {
        self.payload
            .channels
            .get(channel)
            .and_then(|entry| entry.auths.values().map(|auth| auth.ttl).max())
            .unwrap_or(0)
            .max(0)
    }
}

/// A response type that can stand in for an undecodable body.
pub trait DecodedResponse: DeserializeOwned {
    /// Builds the synthetic response for a decode failure.
    fn synthetic(message: String) -> Self;

    /// Returns the base response fields.
    fn base(&self) -> &Response;
}

impl DecodedResponse for Response {
    fn synthetic(message: String) -> Self {
        Response::synthetic(message)
    }

    fn base(&self) -> &Response {
        self
    }
}

impl DecodedResponse for GrantResponse {
    fn synthetic(message: String) -> Self {
        Self { response: Response::synthetic(message), ..Self::default() }
    }

    fn base(&self) -> &Response {
        &self.response
    }
}

impl DecodedResponse for AuditResponse {
    fn synthetic(message: String) -> Self {
        Self { response: Response::synthetic(message), ..Self::default() }
    }

    fn base(&self) -> &Response {
        &self.response
    }
}

/// Decodes `body`, falling back to a synthetic response on failure.
pub fn decode_or_synthesize<T: DecodedResponse>(body: &[u8]) -> T {
    serde_json::from_slice(body).unwrap_or_else(|e| T::synthetic(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_error_response() {
        let body =
            br#"{"status":403,"service":"Access Manager","error":true,"message":"Forbidden"}"#;
        let response: Response = decode_or_synthesize(body);

        assert_eq!(response.status, 403);
        assert_eq!(response.service, "Access Manager");
        assert!(response.error);
        assert!(!response.decode_failed);
        assert!(!response.is_success());
    }

    #[test]
    fn undecodable_body_becomes_synthetic_400() {
        let response: Response = decode_or_synthesize(b"<html>bad gateway</html>");

        assert_eq!(response.status, SYNTHETIC_STATUS);
        assert!(!response.error);
        assert!(response.decode_failed);
        assert!(!response.message.is_empty());
    }

    #[test]
    fn decodes_grant_payload() {
        let body = br#"{
            "status": 200,
            "message": "Success",
            "service": "Access Manager",
            "payload": {
                "level": "user",
                "subscribe_key": "sub-key",
                "channel": "chat",
                "ttl": 60,
                "auths": {"token": {"r": 1, "w": 0, "m": 0}}
            }
        }"#;
        let response: GrantResponse = decode_or_synthesize(body);

        assert!(response.base().is_success());
        assert_eq!(response.payload.ttl, 60);
        assert_eq!(response.payload.auths["token"], Permissions { r: 1, ..Default::default() });
    }

    #[test]
    fn grant_decode_failure_keeps_default_payload() {
        let response: GrantResponse = decode_or_synthesize(b"not json");
        assert_eq!(response.response.status, SYNTHETIC_STATUS);
        assert!(response.response.decode_failed);
        assert!(response.payload.auths.is_empty());
    }

    #[test]
    fn audit_max_ttl() {
        let body = br#"{
            "status": 200,
            "payload": {
                "channels": {
                    "chat": {"auths": {"a": {"r": 1, "ttl": 15}, "b": {"w": 1, "ttl": 90}}}
                }
            }
        }"#;
        let response: AuditResponse = decode_or_synthesize(body);

        assert_eq!(response.max_ttl("chat"), 90);
        assert_eq!(response.max_ttl("missing"), 0);
    }
}

//! Request construction for the pub/sub wire protocol.
//!
//! Everything here is pure: the timestamp is passed in, so the exact request
//! line for a given clock reading can be asserted in tests. The [`crate::Agent`]
//! only adds the origin and performs the GET.

use std::fmt;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::{
    error::{Result, SessionError},
    signing::sign,
    SDK_PARAM_KEY, SDK_VERSION,
};

/// Characters left intact in a query component: letters, digits and `-_.~`.
const QUERY_COMPONENT: &AsciiSet =
    &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

/// Characters left intact in a path segment: query-safe ones plus `$&+,:;=@`.
///
/// `/` stays escaped so the message is a single segment and no `.`/`..`
/// inside it can be resolved away by URL parsing.
const PATH_SEGMENT: &AsciiSet = &QUERY_COMPONENT
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b',')
    .remove(b':')
    .remove(b';')
    .remove(b'=')
    .remove(b'@');

/// Key material bound to a session.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Publish key.
    pub publish_key: String,
    /// Subscribe key.
    pub subscribe_key: String,
    /// Secret key used for signing; `None` sends unsigned requests.
    pub secret_key: Option<String>,
}

impl Credentials {
    /// Creates credentials. An empty secret is treated as no secret.
    pub fn new(
        publish_key: impl Into<String>,
        subscribe_key: impl Into<String>,
        secret_key: Option<&str>,
    ) -> Self {
        Self {
            publish_key: publish_key.into(),
            subscribe_key: subscribe_key.into(),
            secret_key: secret_key.filter(|s| !s.is_empty()).map(str::to_string),
        }
    }

    /// Returns the secret key or a configuration error.
    fn require_secret(&self, operation: &str) -> Result<&str> {
        self.secret_key.as_deref().ok_or_else(|| {
            SessionError::configuration(format!("{operation} requires a secret key"))
        })
    }

    /// Signs a permission-manager request.
    fn sign_pam(&self, secret: &str, tag: &str, params: &str) -> Result<String> {
        sign(secret, &format!("{}\n{}\n{tag}\n{params}", self.subscribe_key, self.publish_key))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("publish_key", &self.publish_key)
            .field("subscribe_key", &self.subscribe_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Parameters of a publish call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishParams<'a> {
    /// Destination channel.
    pub channel: &'a str,
    /// Serialized JSON message.
    pub message: &'a str,
    /// Auth key sent with the request.
    pub auth: Option<&'a str>,
    /// Keep the message in channel history.
    pub store_in_history: bool,
    /// Replicate the message to other regions.
    pub replicate: bool,
    /// Per-message history ttl in hours.
    pub ttl: Option<u32>,
}

impl<'a> PublishParams<'a> {
    /// Creates publish parameters with history and replication enabled.
    pub fn new(channel: &'a str, message: &'a str) -> Self {
        Self { channel, message, auth: None, store_in_history: true, replicate: true, ttl: None }
    }
}

/// Escapes a query component. Spaces become `+`.
pub fn query_escape(value: &str) -> String {
    utf8_percent_encode(value, QUERY_COMPONENT).to_string().replace("%20", "+")
}

/// Encodes serialized JSON as one URI path segment.
///
/// Leading dots are dropped so the segment is never `.` or `..`.
pub fn encode_json_path(json: &str) -> String {
    let encoded = utf8_percent_encode(json, PATH_SEGMENT).to_string();
    encoded.trim_start_matches('.').to_string()
}

/// Builds the path and query of a publish request.
///
/// Without a secret the path signature is `0` and no query signature is
/// added. With a secret the path carries a signature over the keys, channel
/// and message, and the query gains `timestamp` and a second signature over
/// the sorted query.
///
/// # Errors
///
/// Returns `SessionError::Configuration` when the secret cannot be used as a
/// signing key.
pub fn publish_uri(
    credentials: &Credentials,
    params: &PublishParams<'_>,
    timestamp: u64,
) -> Result<String> {
    let path_signature = match &credentials.secret_key {
        Some(secret) => sign(
            secret,
            &format!(
                "{}/{}/{secret}/{}/{}",
                credentials.publish_key, credentials.subscribe_key, params.channel, params.message
            ),
        )?,
        None => "0".to_string(),
    };

    let path = format!(
        "/publish/{}/{}/{}/{}/0/{}",
        credentials.publish_key,
        credentials.subscribe_key,
        path_signature,
        query_escape(params.channel),
        encode_json_path(params.message)
    );

    let mut query: Vec<(&str, String)> = vec![(SDK_PARAM_KEY, SDK_VERSION.to_string())];
    if let Some(auth) = params.auth.filter(|a| !a.is_empty()) {
        query.push(("auth", auth.to_string()));
    }
    if !params.store_in_history {
        query.push(("store", "0".to_string()));
    }
    if !params.replicate {
        query.push(("norep", "true".to_string()));
    }
    if let Some(ttl) = params.ttl {
        query.push(("ttl", ttl.to_string()));
    }

    let Some(secret) = &credentials.secret_key else {
        return Ok(format!("{path}?{}", encode_query(&query)));
    };

    query.push(("timestamp", timestamp.to_string()));
    let signature = sign(
        secret,
        &format!(
            "{}\n{}\n{path}\n{}",
            credentials.subscribe_key,
            credentials.publish_key,
            canonical_query(&query)
        ),
    )?;

    Ok(format!("{path}?{}&signature={signature}", encode_query(&query)))
}

/// Builds the path and query of a grant request.
///
/// Parameters appear in the fixed order `auth`, `channel`, `r`, `timestamp`,
/// `ttl`, `w`, which is also the order they are signed in.
///
/// # Errors
///
/// Returns `SessionError::Configuration` when the credentials carry no
/// secret key.
pub fn grant_uri(
    credentials: &Credentials,
    channel: &str,
    auth: &str,
    read: bool,
    write: bool,
    ttl: Option<u32>,
    timestamp: u64,
) -> Result<String> {
    let secret = credentials.require_secret("grant")?;

    let mut params = String::new();
    if !auth.is_empty() {
        params.push_str(&format!("auth={auth}&"));
    }
    params.push_str(&format!("channel={channel}&r={}&timestamp={timestamp}", u8::from(read)));
    if let Some(ttl) = ttl {
        params.push_str(&format!("&ttl={ttl}"));
    }
    params.push_str(&format!("&w={}", u8::from(write)));

    let signature = credentials.sign_pam(secret, "grant", &params)?;
    Ok(format!(
        "/v1/auth/grant/sub-key/{}?{params}&signature={signature}",
        credentials.subscribe_key
    ))
}

/// Builds the path and query of an audit request.
///
/// Blank `channel` or `auth` values are omitted, auditing at a wider level.
///
/// # Errors
///
/// Returns `SessionError::Configuration` when the credentials carry no
/// secret key.
pub fn audit_uri(
    credentials: &Credentials,
    channel: Option<&str>,
    auth: Option<&str>,
    timestamp: u64,
) -> Result<String> {
    let secret = credentials.require_secret("audit")?;

    let mut params = String::new();
    if let Some(auth) = auth.map(str::trim).filter(|a| !a.is_empty()) {
        params.push_str(&format!("auth={auth}&"));
    }
    if let Some(channel) = channel.map(str::trim).filter(|c| !c.is_empty()) {
        params.push_str(&format!("channel={}&", query_escape(channel)));
    }
    params.push_str(&format!("timestamp={timestamp}"));

    let signature = credentials.sign_pam(secret, "audit", &params)?;
    Ok(format!(
        "/v1/auth/audit/sub-key/{}?{params}&signature={signature}",
        credentials.subscribe_key
    ))
}

fn encode_query(pairs: &[(&str, String)]) -> String {
    pairs
        .iter()
        .map(|(key, value)| format!("{}={}", query_escape(key), query_escape(value)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Query string sorted by key, the form covered by the publish signature.
fn canonical_query(pairs: &[(&str, String)]) -> String {
    let mut sorted = pairs.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    encode_query(&sorted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signed() -> Credentials {
        Credentials::new("pub-key", "sub-key", Some("sec-key"))
    }

    fn unsigned() -> Credentials {
        Credentials::new("pub-key", "sub-key", None)
    }

    #[test]
    fn query_escape_matches_form_encoding() {
        assert_eq!(query_escape("a b/c"), "a+b%2Fc");
        assert_eq!(query_escape("chat-1_x.y~z"), "chat-1_x.y~z");
        assert_eq!(query_escape("PubRelay-Rust/0.1.0"), "PubRelay-Rust%2F0.1.0");
    }

    #[test]
    fn json_path_encoding_keeps_sub_delimiters() {
        assert_eq!(encode_json_path(r#"{"a":1}"#), "%7B%22a%22:1%7D");
        assert_eq!(encode_json_path(r#"{"q":"a b?"}"#), "%7B%22q%22:%22a%20b%3F%22%7D");
        assert_eq!(encode_json_path("./x"), "%2Fx");
        assert_eq!(encode_json_path(".."), "");
    }

    #[test]
    fn json_path_encoding_escapes_slashes() {
        assert_eq!(encode_json_path(r#"{"p":"a/../b"}"#), "%7B%22p%22:%22a%2F..%2Fb%22%7D");
        assert!(!encode_json_path(r#"{"p":"/./x/"}"#).contains('/'));
    }

    #[test]
    fn unsigned_publish_uses_zero_signature() {
        let params = PublishParams::new("chat", r#"{"a":1}"#);
        let uri = publish_uri(&unsigned(), &params, 1_700_000_000).unwrap();

        assert_eq!(
            uri,
            format!(
                "/publish/pub-key/sub-key/0/chat/0/%7B%22a%22:1%7D?pnsdk={}",
                query_escape(SDK_VERSION)
            )
        );
    }

    #[test]
    fn publish_optional_parameters_appended_in_order() {
        let params = PublishParams {
            auth: Some("token"),
            store_in_history: false,
            replicate: false,
            ttl: Some(24),
            ..PublishParams::new("chat", "{}")
        };
        let uri = publish_uri(&unsigned(), &params, 0).unwrap();
        let query = uri.split_once('?').map(|(_, q)| q).unwrap();

        assert!(query.ends_with("&auth=token&store=0&norep=true&ttl=24"), "{query}");
    }

    #[test]
    fn signed_publish_carries_both_signatures() {
        let params = PublishParams::new("chat", r#"{"a":1}"#);
        let uri = publish_uri(&signed(), &params, 1_700_000_000).unwrap();

        let path_signature = sign("sec-key", r#"pub-key/sub-key/sec-key/chat/{"a":1}"#).unwrap();
        let path = format!("/publish/pub-key/sub-key/{path_signature}/chat/0/%7B%22a%22:1%7D");
        assert!(uri.starts_with(&format!("{path}?")), "{uri}");

        let canonical = format!("pnsdk={}&timestamp=1700000000", query_escape(SDK_VERSION));
        let signed_input = format!("sub-key\npub-key\n{path}\n{canonical}");
        let query_signature = sign("sec-key", &signed_input).unwrap();
        assert!(uri.ends_with(&format!("&timestamp=1700000000&signature={query_signature}")));
    }

    #[test]
    fn signed_publish_signature_covers_sorted_query() {
        let params = PublishParams { auth: Some("token"), ..PublishParams::new("chat", "{}") };
        let uri = publish_uri(&signed(), &params, 42).unwrap();
        let (path, _) = uri.split_once('?').unwrap();

        let canonical = format!("auth=token&pnsdk={}&timestamp=42", query_escape(SDK_VERSION));
        let signed_input = format!("sub-key\npub-key\n{path}\n{canonical}");
        let expected = sign("sec-key", &signed_input).unwrap();
        assert!(uri.ends_with(&format!("&signature={expected}")));
    }

    #[test]
    fn grant_parameters_in_signed_order() {
        let uri = grant_uri(&signed(), "chat", "token", true, false, Some(60), 1_700_000_000)
            .unwrap();

        let params = "auth=token&channel=chat&r=1&timestamp=1700000000&ttl=60&w=0";
        let signature = sign("sec-key", &format!("sub-key\npub-key\ngrant\n{params}")).unwrap();
        assert_eq!(
            uri,
            format!("/v1/auth/grant/sub-key/sub-key?{params}&signature={signature}")
        );
    }

    #[test]
    fn grant_without_auth_or_ttl() {
        let uri = grant_uri(&signed(), "chat", "", false, true, None, 7).unwrap();
        let expected_prefix =
            "/v1/auth/grant/sub-key/sub-key?channel=chat&r=0&timestamp=7&w=1&signature=";
        assert!(uri.starts_with(expected_prefix), "{uri}");
    }

    #[test]
    fn grant_requires_secret() {
        let err = grant_uri(&unsigned(), "chat", "", true, true, None, 0).unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn audit_parameters_trimmed_and_escaped() {
        let uri = audit_uri(&signed(), Some(" chat room "), Some(" token "), 9).unwrap();

        let params = "auth=token&channel=chat+room&timestamp=9";
        let signature = sign("sec-key", &format!("sub-key\npub-key\naudit\n{params}")).unwrap();
        assert_eq!(
            uri,
            format!("/v1/auth/audit/sub-key/sub-key?{params}&signature={signature}")
        );
    }

    #[test]
    fn audit_without_filters() {
        let uri = audit_uri(&signed(), None, Some("  "), 9).unwrap();
        assert!(uri.starts_with("/v1/auth/audit/sub-key/sub-key?timestamp=9&signature="));
    }

    #[test]
    fn debug_masks_secret() {
        let debug = format!("{:?}", signed());
        assert!(!debug.contains("sec-key"));
        assert!(debug.contains("***"));
    }
}

//! Mock pub/sub service for HTTP-level tests.

use std::time::Duration;

use serde_json::{json, Value};
use wiremock::{
    matchers::{method, path_regex},
    Mock, MockServer, ResponseTemplate,
};

/// Body of a successful publish acknowledgement.
pub const PUBLISH_ACK: &str = r#"[1,"Sent","17000000000000000"]"#;

/// A request received by the mock service.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    /// Request path.
    pub path: String,
    /// Raw query string.
    pub query: String,
    /// `User-Agent` header, if any.
    pub user_agent: Option<String>,
}

impl RecordedCall {
    /// Returns the first value of a query parameter, still encoded.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.query.split('&').find_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            (k == key).then_some(v)
        })
    }
}

/// Wiremock server answering publish, grant and audit calls.
pub struct MockPubSub {
    server: MockServer,
}

impl MockPubSub {
    /// Starts a server on a random port with no routes mounted.
    pub async fn start() -> Self {
        Self { server: MockServer::start().await }
    }

    /// Base URL to use as the session origin.
    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Accepts every publish with the service's array acknowledgement.
    pub async fn accept_publishes(&self) {
        Mock::given(method("GET"))
            .and(path_regex(r"^/publish/"))
            .respond_with(ResponseTemplate::new(200).set_body_string(PUBLISH_ACK))
            .mount(&self.server)
            .await;
    }

    /// Answers publishes with `status` and a service error object.
    pub async fn reject_publishes(&self, status: u16, message: &str) {
        Mock::given(method("GET"))
            .and(path_regex(r"^/publish/"))
            .respond_with(ResponseTemplate::new(status).set_body_json(error_body(status, message)))
            .mount(&self.server)
            .await;
    }

    /// Answers the next `times` publishes with `status` and a plain body,
    /// taking priority over other publish routes.
    pub async fn fail_publishes_times(&self, status: u16, times: u64) {
        Mock::given(method("GET"))
            .and(path_regex(r"^/publish/"))
            .respond_with(ResponseTemplate::new(status).set_body_string("upstream unavailable"))
            .up_to_n_times(times)
            .with_priority(1)
            .mount(&self.server)
            .await;
    }

    /// Delays every publish answer by `delay`, long enough to trip client
    /// timeouts in tests.
    pub async fn stall_publishes(&self, delay: Duration) {
        Mock::given(method("GET"))
            .and(path_regex(r"^/publish/"))
            .respond_with(ResponseTemplate::new(200).set_delay(delay))
            .mount(&self.server)
            .await;
    }

    /// Accepts every grant with a success payload.
    pub async fn accept_grants(&self) {
        let body = json!({
            "status": 200,
            "service": "Access Manager",
            "message": "Success",
            "payload": {"level": "user", "subscribe_key": "sub-c-test", "ttl": 60, "auths": {}}
        });
        Mock::given(method("GET"))
            .and(path_regex(r"^/v1/auth/grant/sub-key/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Answers the next `times` grants with `status`, taking priority over
    /// other grant routes.
    pub async fn fail_grants_times(&self, status: u16, times: u64) {
        Mock::given(method("GET"))
            .and(path_regex(r"^/v1/auth/grant/sub-key/"))
            .respond_with(
                ResponseTemplate::new(status).set_body_json(error_body(status, "Forbidden")),
            )
            .up_to_n_times(times)
            .with_priority(1)
            .mount(&self.server)
            .await;
    }

    /// Answers audits with the given payload.
    pub async fn audit_payload(&self, payload: Value) {
        let body = json!({"status": 200, "service": "Access Manager", "payload": payload});
        Mock::given(method("GET"))
            .and(path_regex(r"^/v1/auth/audit/sub-key/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Returns every request received so far.
    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .into_iter()
            .map(|request| RecordedCall {
                path: request.url.path().to_string(),
                query: request.url.query().unwrap_or_default().to_string(),
                user_agent: request
                    .headers
                    .get("user-agent")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string),
            })
            .collect()
    }

    /// Returns the requests whose path starts with `prefix`.
    pub async fn calls_to(&self, prefix: &str) -> Vec<RecordedCall> {
        self.calls().await.into_iter().filter(|call| call.path.starts_with(prefix)).collect()
    }
}

fn error_body(status: u16, message: &str) -> Value {
    json!({"status": status, "service": "Access Manager", "error": true, "message": message})
}

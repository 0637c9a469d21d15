//! Signed session bound to one key pair.
//!
//! Each agent builds its HTTP client on first use and reuses it for every
//! later call. Timeouts are retried a bounded number of times inside the
//! agent; anything above that is reported to the caller, which decides
//! whether to retry the whole request.

use std::{sync::Arc, time::Duration};

use bytes::Bytes;
use pubrelay_core::Clock;
use tokio::sync::OnceCell;
use tracing::{debug, info_span, warn, Instrument};
use url::Url;

use crate::{
    error::{Result, SessionError},
    request::{audit_uri, grant_uri, publish_uri, Credentials, PublishParams},
    response::{decode_or_synthesize, AuditResponse, DecodedResponse, GrantResponse, Response},
    SDK_PARAM_KEY, SDK_VERSION,
};

/// Default remote origin.
pub const DEFAULT_ORIGIN: &str = "https://ps.pndsn.com";

/// Configuration for a signed session.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Scheme and host of the remote service.
    pub origin: String,
    /// Keys bound to the session.
    pub credentials: Credentials,
    /// Time allowed to establish a TCP/TLS connection.
    pub connect_timeout: Duration,
    /// Time allowed for a whole request, from connect to reading the body.
    pub request_timeout: Duration,
    /// Extra attempts made after a request times out.
    pub connect_retry: u32,
}

impl AgentConfig {
    /// Creates a configuration with default origin and timeouts.
    pub fn new(credentials: Credentials) -> Self {
        Self {
            origin: DEFAULT_ORIGIN.to_string(),
            credentials,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
            connect_retry: 3,
        }
    }

    /// Sets the origin.
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }
}

/// Authenticated HTTP session for the pub/sub API.
#[derive(Debug)]
pub struct Agent {
    config: AgentConfig,
    origin: String,
    client: OnceCell<reqwest::Client>,
    clock: Arc<dyn Clock>,
}

impl Agent {
    /// Creates an agent. The HTTP client is built lazily on first request.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Configuration` when a key is empty or the
    /// origin is not an absolute http(s) URL.
    pub fn new(config: AgentConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        if config.credentials.publish_key.is_empty() || config.credentials.subscribe_key.is_empty()
        {
            return Err(SessionError::configuration("publish and subscribe keys are required"));
        }

        let parsed = Url::parse(&config.origin)
            .map_err(|e| SessionError::configuration(format!("invalid origin: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SessionError::configuration(format!(
                "unsupported origin scheme: {}",
                parsed.scheme()
            )));
        }

        let origin = config.origin.trim_end_matches('/').to_string();
        Ok(Self { config, origin, client: OnceCell::new(), clock })
    }

    /// Returns whether the HTTP client has been built.
    pub fn is_connected(&self) -> bool {
        self.client.initialized()
    }

    /// Publishes `message` to `channel` with replication on and no ttl.
    ///
    /// # Errors
    ///
    /// Returns a `SessionError` only when no response was received.
    pub async fn publish(
        &self,
        channel: &str,
        message: &str,
        auth: Option<&str>,
        store_in_history: bool,
    ) -> Result<Response> {
        let params =
            PublishParams { auth, store_in_history, ..PublishParams::new(channel, message) };
        self.send_publish(&params).await
    }

    /// Publishes with every option exposed.
    ///
    /// A `200` answer is returned as a success response carrying the raw
    /// acknowledgement body. Any other status is decoded, or synthesized as
    /// a `400` response when the body is not a response object.
    ///
    /// # Errors
    ///
    /// Returns a `SessionError` when the request cannot be signed or no
    /// response was received.
    pub async fn send_publish(&self, params: &PublishParams<'_>) -> Result<Response> {
        let uri = publish_uri(&self.config.credentials, params, self.clock.unix_seconds())?;
        let span = info_span!("pubsub_publish", channel = %params.channel);

        async move {
            let (status, body) = self.get(&uri).await?;
            if status == 200 {
                return Ok(Response {
                    status,
                    message: String::from_utf8_lossy(&body).into_owned(),
                    ..Response::default()
                });
            }

            let response: Response = decode_or_synthesize(&body);
            warn!(
                status,
                response_status = response.status,
                message = %response.message,
                "publish not accepted"
            );
            Ok(response)
        }
        .instrument(span)
        .await
    }

    /// Grants `read`/`write` rights on `channel` to `auth`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Configuration` without a secret key, or a
    /// transport error when no response was received.
    pub async fn grant(
        &self,
        channel: &str,
        auth: &str,
        read: bool,
        write: bool,
        ttl: Option<u32>,
    ) -> Result<GrantResponse> {
        let uri = grant_uri(
            &self.config.credentials,
            channel,
            auth,
            read,
            write,
            ttl,
            self.clock.unix_seconds(),
        )?;
        let span = info_span!("pubsub_grant", channel = %channel, read, write);

        self.decoded(&uri).instrument(span).await
    }

    /// Revokes every right on `channel` for `auth`.
    ///
    /// # Errors
    ///
    /// Same as [`Agent::grant`].
    pub async fn revoke(
        &self,
        channel: &str,
        auth: &str,
        ttl: Option<u32>,
    ) -> Result<GrantResponse> {
        self.grant(channel, auth, false, false, ttl).await
    }

    /// Audits the rights currently granted.
    ///
    /// # Errors
    ///
    /// Same as [`Agent::grant`].
    pub async fn audit(&self, channel: Option<&str>, auth: Option<&str>) -> Result<AuditResponse> {
        let uri = audit_uri(&self.config.credentials, channel, auth, self.clock.unix_seconds())?;
        let span = info_span!("pubsub_audit", channel = channel.unwrap_or_default());

        let response: AuditResponse = self.decoded(&uri).instrument(span).await?;
        debug!(
            status = response.response.status,
            channels = response.payload.channels.len(),
            "audit completed"
        );
        Ok(response)
    }

    async fn decoded<T: DecodedResponse>(&self, uri: &str) -> Result<T> {
        let (status, body) = self.get(uri).await?;
        let response: T = decode_or_synthesize(&body);
        if !response.base().is_success() {
            warn!(status, message = %response.base().message, "request not accepted");
        }
        Ok(response)
    }

    async fn client(&self) -> Result<&reqwest::Client> {
        self.client
            .get_or_try_init(|| async {
                debug!(origin = %self.origin, "building session transport");
                reqwest::Client::builder()
                    .connect_timeout(self.config.connect_timeout)
                    .timeout(self.config.request_timeout)
                    .user_agent(format!("ua_string=({SDK_PARAM_KEY}) {SDK_VERSION}"))
                    .build()
                    .map_err(|e| {
                        SessionError::configuration(format!("failed to build HTTP client: {e}"))
                    })
            })
            .await
    }

    /// Sends a GET and returns status and body.
    ///
    /// Only timeouts are retried here, at most `connect_retry` extra times.
    async fn get(&self, uri: &str) -> Result<(u16, Bytes)> {
        let client = self.client().await?;
        let url = format!("{}{uri}", self.origin);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let response = match client.get(&url).send().await {
                Ok(response) => response,
                Err(e) if e.is_timeout() && attempt <= self.config.connect_retry => {
                    debug!(attempt, "request timed out, retrying");
                    continue;
                },
                Err(e) if e.is_timeout() => {
                    return Err(SessionError::Timeout {
                        attempts: attempt,
                        timeout_ms: u64::try_from(self.config.request_timeout.as_millis())
                            .unwrap_or(u64::MAX),
                    });
                },
                Err(e) if e.is_connect() => {
                    return Err(SessionError::network(format!("connection failed: {e}")));
                },
                Err(e) => return Err(SessionError::network(e.to_string())),
            };

            let status = response.status().as_u16();
            let body = response
                .bytes()
                .await
                .map_err(|e| SessionError::network(format!("failed to read response body: {e}")))?;
            debug!(status, attempt, bytes = body.len(), "received response");
            return Ok((status, body));
        }
    }
}

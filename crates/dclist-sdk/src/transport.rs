//! Request/response transport for queries and mutations.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, RETRY_AFTER};
use tracing::{debug, warn};

use crate::error::{DclistError, DclistResult, HttpErrorInfo};
use crate::operation::GraphqlRequest;
use crate::retry::{RetryDecision, RetryPolicy};

/// Raw HTTP reply. Non-2xx replies are returned too: the API reports most
/// failures as GraphQL errors in the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportReply {
    /// HTTP status.
    pub status: StatusCode,
    /// Response body.
    pub body: Vec<u8>,
}

/// Sends one GraphQL document and returns the raw reply.
#[async_trait]
pub trait QueryTransport: Send + Sync + fmt::Debug {
    /// Dispatch `request`. `idempotent` is `false` for mutations.
    async fn send(&self, request: &GraphqlRequest, idempotent: bool) -> DclistResult<TransportReply>;
}

/// HTTP transport configuration.
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Request timeout.
    pub timeout: Duration,
    /// Retry policy.
    pub retry: RetryPolicy,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

/// `reqwest`-backed transport with bearer authentication.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    endpoint: String,
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpTransport {
    /// Create a transport for `endpoint` authenticated with `token`.
    ///
    /// # Errors
    /// Returns an error if the token is not a valid header value or the
    /// HTTP client cannot be built.
    pub fn new(
        endpoint: impl Into<String>,
        token: &str,
        config: HttpTransportConfig,
    ) -> DclistResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut bearer = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| DclistError::InvalidToken)?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .user_agent(format!("dclist-sdk/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            endpoint: endpoint.into(),
            http,
            retry: config.retry,
        })
    }

    /// Endpoint URL.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send_once(&self, body: &[u8]) -> Result<TransportReply, SendError> {
        let response = self
            .http
            .post(&self.endpoint)
            .body(body.to_vec())
            .send()
            .await?;
        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        let body = response.bytes().await?.to_vec();

        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(TransientReply {
                reply: TransportReply { status, body },
                retry_after,
            }
            .into_error());
        }
        Ok(TransportReply { status, body })
    }
}

#[async_trait]
impl QueryTransport for HttpTransport {
    async fn send(&self, request: &GraphqlRequest, idempotent: bool) -> DclistResult<TransportReply> {
        let body = serde_json::to_vec(request)?;
        let mut attempt = 1;
        loop {
            let err = match self.send_once(&body).await {
                Ok(reply) => return Ok(reply),
                Err(err) => err,
            };
            match self.retry.decide(&err.error, attempt, idempotent) {
                RetryDecision::RetryAfter(delay) => {
                    let delay = err.retry_after.map_or(delay, |hint| hint.max(delay));
                    debug!(attempt, delay_ms = delay.as_millis(), "Retrying dclist request");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                RetryDecision::DoNotRetry => {
                    warn!(attempt, error = %err.error, "dclist request failed");
                    // Hand transient replies back so their GraphQL body is
                    // still inspected.
                    return err.reply.ok_or(err.error);
                }
            }
        }
    }
}

/// A 5xx/429 reply.
struct TransientReply {
    reply: TransportReply,
    retry_after: Option<Duration>,
}

impl TransientReply {
    fn into_error(self) -> SendError {
        SendError {
            error: DclistError::Http(HttpErrorInfo::from_status(
                self.reply.status,
                truncate_body(&self.reply.body),
            )),
            reply: Some(self.reply),
            retry_after: self.retry_after,
        }
    }
}

/// A failed attempt. `reply` is kept so the final attempt can still surface
/// the body.
struct SendError {
    error: DclistError,
    reply: Option<TransportReply>,
    retry_after: Option<Duration>,
}

impl From<reqwest::Error> for SendError {
    fn from(err: reqwest::Error) -> Self {
        Self {
            error: err.into(),
            reply: None,
            retry_after: None,
        }
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?;
    value.parse::<u64>().ok().map(Duration::from_secs)
}

pub(crate) fn truncate_body(bytes: &[u8]) -> String {
    const MAX_LEN: usize = 4096;
    let mut body = String::from_utf8_lossy(bytes).to_string();
    if body.len() > MAX_LEN {
        let mut cut = MAX_LEN;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push('…');
    }
    body
}

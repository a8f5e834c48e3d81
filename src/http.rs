//! Outbound HTTP with one centralised retry policy.
//!
//! `fetch` is the hard mode used for listing: it retries 429/5xx, timeouts and
//! connection failures and returns a [`FetchError`] once the policy gives up.
//! `fetch_soft` is the enrichment mode: failures degrade to `None`.

use rand::Rng;
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use crate::errors::FetchError;

/// Retry parameters shared by every outbound call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Fraction of the delay added or removed at random (0.25 = ±25%).
    pub jitter: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1_000),
            jitter: 0.25,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Un-jittered wait after the failed attempt number `attempt` (0-based):
    /// `2^attempt * base_delay`, capped at `max_delay`.
    pub fn base_backoff(&self, attempt: u32) -> Duration {
        let multiplier = 1u32 << attempt.min(16);
        self.base_delay
            .saturating_mul(multiplier)
            .min(self.max_delay)
    }

    /// Jittered wait, never above `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self.base_backoff(attempt);
        if self.jitter <= 0.0 || base.is_zero() {
            return base;
        }
        let base_ms = base.as_millis() as f64;
        let spread = base_ms * self.jitter;
        let jittered = base_ms + rand::thread_rng().gen_range(-spread..=spread);
        Duration::from_millis(jittered.max(0.0) as u64).min(self.max_delay)
    }
}

/// Whether retryable failures get another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Hard,
    Soft,
}

#[derive(Clone)]
pub struct RetryingHttpClient {
    http: Client,
    policy: RetryPolicy,
}

impl fmt::Debug for RetryingHttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryingHttpClient")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RetryingHttpClient {
    pub fn new(policy: RetryPolicy) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .user_agent(concat!("claims-sync/", env!("CARGO_PKG_VERSION")))
            .no_proxy()
            .build()?;
        Ok(Self::with_client(http, policy))
    }

    pub fn with_client(http: Client, policy: RetryPolicy) -> Self {
        Self { http, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// GET `url` with a bearer token. `Ok(None)` means the resource does not
    /// exist (HTTP 404), which is a valid outcome rather than an error.
    pub async fn fetch(
        &self,
        url: &Url,
        token: &str,
        timeout: Duration,
    ) -> Result<Option<Value>, FetchError> {
        self.fetch_with(url, token, timeout, Mode::Hard).await
    }

    /// Like [`fetch`](Self::fetch) but never fails: timeouts and errors yield
    /// `None` and are only logged. Nothing is retried in this mode, so a
    /// single sub-call stays bounded by `timeout`.
    pub async fn fetch_soft(&self, url: &Url, token: &str, timeout: Duration) -> Option<Value> {
        match self.fetch_with(url, token, timeout, Mode::Soft).await {
            Ok(value) => value,
            Err(err) => {
                debug!(%err, "soft fetch degraded to null");
                None
            }
        }
    }

    async fn fetch_with(
        &self,
        url: &Url,
        token: &str,
        timeout: Duration,
        mode: Mode,
    ) -> Result<Option<Value>, FetchError> {
        let attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = self
                .http
                .get(url.clone())
                .bearer_auth(token)
                .timeout(timeout)
                .send()
                .await;

            let failure = match outcome {
                Ok(res) => {
                    let status = res.status();
                    if status == StatusCode::NOT_FOUND {
                        debug!(%url, "resource not found");
                        return Ok(None);
                    }
                    if status.is_success() {
                        return read_json(url, res).await.map(Some);
                    }
                    let err = FetchError::Status {
                        url: url.to_string(),
                        status: status.as_u16(),
                        attempts: attempt,
                    };
                    if status != StatusCode::TOO_MANY_REQUESTS && !status.is_server_error() {
                        return Err(err);
                    }
                    err
                }
                Err(err) if err.is_timeout() => FetchError::Timeout {
                    url: url.to_string(),
                    attempts: attempt,
                },
                Err(err) => {
                    let transport = FetchError::Transport {
                        url: url.to_string(),
                        message: err.to_string(),
                    };
                    if !(err.is_connect() || err.is_request()) {
                        return Err(transport);
                    }
                    transport
                }
            };

            if mode == Mode::Soft || attempt >= attempts {
                return Err(failure);
            }
            let delay = self.policy.backoff(attempt - 1);
            warn!(%url, attempt, ?delay, error = %failure, "retrying outbound call");
            tokio::time::sleep(delay).await;
        }
    }
}

async fn read_json(url: &Url, res: reqwest::Response) -> Result<Value, FetchError> {
    let body = res.text().await.map_err(|err| FetchError::Decode {
        url: url.to_string(),
        message: err.to_string(),
    })?;
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body).map_err(|err| FetchError::Decode {
        url: url.to_string(),
        message: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(5),
            jitter: 0.25,
            max_delay: Duration::from_millis(50),
        }
    }

    fn client() -> RetryingHttpClient {
        RetryingHttpClient::new(fast_policy()).unwrap()
    }

    fn url(server: &MockServer, p: &str) -> Url {
        Url::parse(&format!("{}{}", server.uri(), p)).unwrap()
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            jitter: 0.0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff(0), Duration::from_secs(1));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(2), Duration::from_secs(4));
        assert_eq!(policy.backoff(10), Duration::from_secs(30));
    }

    #[test]
    fn jitter_stays_within_a_quarter() {
        let policy = RetryPolicy::default();
        for _ in 0..200 {
            let d = policy.backoff(1).as_millis();
            assert!((1_500..=2_500).contains(&d), "delay {} out of range", d);
        }
        for _ in 0..50 {
            assert!(policy.backoff(8) <= Duration::from_secs(30));
        }
    }

    #[tokio::test]
    async fn returns_json_on_success_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/orders/1"))
            .and(header("Authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": 1})))
            .expect(1)
            .mount(&server)
            .await;

        let value = client()
            .fetch(&url(&server, "/orders/1"), "tok", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(value, Some(serde_json::json!({"id": 1})));
    }

    #[tokio::test]
    async fn not_found_is_a_valid_outcome() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let value = client()
            .fetch(&url(&server, "/orders/404"), "tok", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn persistent_server_error_stops_after_three_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let err = client()
            .fetch(&url(&server, "/claims"), "tok", Duration::from_secs(5))
            .await
            .unwrap_err();
        match err {
            FetchError::Status {
                status, attempts, ..
            } => {
                assert_eq!(status, 500);
                assert_eq!(attempts, 3);
            }
            other => panic!("expected status error, got {:?}", other),
        }
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn rate_limit_is_retried_until_success() {
        let server = MockServer::start().await;
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        Mock::given(method("GET"))
            .respond_with(move |_req: &wiremock::Request| {
                if calls_clone.fetch_add(1, Ordering::SeqCst) == 0 {
                    ResponseTemplate::new(429)
                } else {
                    ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true}))
                }
            })
            .expect(2)
            .mount(&server)
            .await;

        let value = client()
            .fetch(&url(&server, "/x"), "tok", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(value, Some(serde_json::json!({"ok": true})));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .expect(1)
            .mount(&server)
            .await;

        let err = client()
            .fetch(&url(&server, "/x"), "tok", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(403));
    }

    #[tokio::test]
    async fn soft_fetch_degrades_timeouts_to_none_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"late": true}))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let value = client()
            .fetch_soft(&url(&server, "/slow"), "tok", Duration::from_millis(50))
            .await;
        assert_eq!(value, None);
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn soft_fetch_degrades_server_errors_to_none_without_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_delay(Duration::from_millis(400)))
            .expect(1)
            .mount(&server)
            .await;

        let started = std::time::Instant::now();
        let value = client()
            .fetch_soft(&url(&server, "/x"), "tok", Duration::from_millis(500))
            .await;
        assert_eq!(value, None);
        assert!(started.elapsed() < Duration::from_millis(900), "{:?}", started.elapsed());
    }

    #[tokio::test]
    async fn soft_fetch_does_not_retry_rate_limits() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .expect(1)
            .mount(&server)
            .await;

        let value = client()
            .fetch_soft(&url(&server, "/x"), "tok", Duration::from_secs(5))
            .await;
        assert_eq!(value, None);
    }
}

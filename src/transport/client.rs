use super::error::TransportError;
use super::gate::RateGate;
use super::interstitial;
use crate::config::TransportConfig;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, RETRY_AFTER, USER_AGENT as UA_HEADER};
use reqwest::{Client, Method, StatusCode, Url};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Public AppView used for unauthenticated reads.
pub const PUBLIC_APPVIEW: &str = "https://public.api.bsky.app";

/// Browser-like identity; some intercepting proxies refuse unknown agents.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                              (KHTML, like Gecko) Chrome/127 Safari/537.36";

/// Statuses treated as transient infrastructure faults.
const TRANSIENT_STATUSES: [u16; 5] = [403, 500, 502, 503, 504];

/// Timing knobs of the retry loop.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Pause after satisfying an interstitial page.
    pub interstitial_cooldown: Duration,
    /// Pause after 403/5xx.
    pub transient_backoff: Duration,
    /// Pause after timeouts, connection failures and unparsable bodies.
    pub network_backoff: Duration,
    /// Pause after 429 when the server sends no usable `Retry-After`.
    pub default_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            interstitial_cooldown: Duration::from_secs(2),
            transient_backoff: Duration::from_secs(3),
            network_backoff: Duration::from_secs(2),
            default_retry_after: Duration::from_secs(10),
        }
    }
}

/// Shared HTTP transport: pacing, retries and interstitial bypass for every
/// outbound call.
pub struct HttpTransport {
    client: Client,
    gate: Arc<RateGate>,
    policy: RetryPolicy,
    default_base_url: String,
}

impl HttpTransport {
    pub fn new(gate: Arc<RateGate>, policy: RetryPolicy) -> Self {
        Self {
            client: build_client(Duration::from_secs(15), false),
            gate,
            policy,
            default_base_url: PUBLIC_APPVIEW.to_string(),
        }
    }

    pub fn from_config(config: &TransportConfig) -> Self {
        let gate = Arc::new(RateGate::new(Duration::from_millis(config.min_interval_ms)));
        let policy = RetryPolicy {
            max_attempts: config.max_attempts.max(1),
            ..RetryPolicy::default()
        };
        Self {
            client: build_client(
                Duration::from_secs(config.timeout_secs),
                config.accept_invalid_certs,
            ),
            gate,
            policy,
            default_base_url: config.public_appview.clone(),
        }
    }

    /// Override the base URL used when a call passes `None`.
    pub fn with_default_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.default_base_url = base_url.into();
        self
    }

    pub fn gate(&self) -> &Arc<RateGate> {
        &self.gate
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn get(
        &self,
        path: &str,
        query: &[(&str, String)],
        headers: &HeaderMap,
        base_url: Option<&str>,
    ) -> Result<Value, TransportError> {
        let url = self.url_for(path, base_url)?;
        self.execute(Method::GET, &url, query, headers, None).await
    }

    pub async fn post(
        &self,
        path: &str,
        body: &Value,
        headers: &HeaderMap,
        base_url: Option<&str>,
    ) -> Result<Value, TransportError> {
        let url = self.url_for(path, base_url)?;
        self.execute(Method::POST, &url, &[], headers, Some(body))
            .await
    }

    fn url_for(&self, path: &str, base_url: Option<&str>) -> Result<String, TransportError> {
        let base = base_url.unwrap_or(&self.default_base_url);
        if !base.starts_with("https://") && !base.starts_with("http://") {
            return Err(TransportError::InvalidBaseUrl(base.to_string()));
        }
        Ok(format!("{}{}", base.trim_end_matches('/'), path))
    }

    async fn execute(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, String)],
        headers: &HeaderMap,
        body: Option<&Value>,
    ) -> Result<Value, TransportError> {
        let max_attempts = self.policy.max_attempts;
        let mut last_failure = String::from("no attempt made");

        for attempt in 1..=max_attempts {
            self.gate.await_turn().await;

            let mut request = self
                .client
                .request(method.clone(), url)
                .headers(base_headers())
                .headers(headers.clone());
            if !query.is_empty() {
                request = request.query(query);
            }
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) if e.is_builder() => return Err(TransportError::Request(e)),
                Err(e) => {
                    tracing::warn!(%method, url, attempt, "Transport error: {e}");
                    last_failure = e.to_string();
                    self.pause(attempt, self.policy.network_backoff).await;
                    continue;
                }
            };

            let status = response.status();
            let retry_after = parse_retry_after(response.headers());
            let text = match response.text().await {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(%method, url, attempt, "Failed to read response body: {e}");
                    last_failure = e.to_string();
                    self.pause(attempt, self.policy.network_backoff).await;
                    continue;
                }
            };

            // Proxies may answer with a challenge page even on 200, so every
            // body is checked before classification.
            if let Some(continue_url) = interstitial::continuation_url(&text) {
                tracing::warn!(
                    %method,
                    url,
                    attempt,
                    status = status.as_u16(),
                    "Intercepted by interstitial page, continuing via side channel"
                );
                self.satisfy_interstitial(url, &continue_url).await;
                last_failure = format!("interstitial page (HTTP {})", status.as_u16());
                self.pause(attempt, self.policy.interstitial_cooldown).await;
                continue;
            }

            if status.is_success() {
                if text.trim().is_empty() {
                    return Ok(Value::Object(serde_json::Map::new()));
                }
                match serde_json::from_str(&text) {
                    Ok(value) => {
                        if attempt > 1 {
                            tracing::info!(%method, url, attempt, "Request recovered after retry");
                        }
                        return Ok(value);
                    }
                    Err(e) => {
                        tracing::warn!(%method, url, attempt, "Unparsable response body: {e}");
                        last_failure = format!("invalid JSON body: {e}");
                        self.pause(attempt, self.policy.network_backoff).await;
                        continue;
                    }
                }
            }

            last_failure = format!("HTTP {}", status.as_u16());
            if status == StatusCode::TOO_MANY_REQUESTS {
                let wait = retry_after.unwrap_or(self.policy.default_retry_after);
                tracing::warn!(
                    url,
                    attempt,
                    wait_ms = wait.as_millis(),
                    "Rate limited by remote, backing off"
                );
                self.pause(attempt, wait).await;
                continue;
            }
            if TRANSIENT_STATUSES.contains(&status.as_u16()) {
                tracing::warn!(
                    url,
                    attempt,
                    status = status.as_u16(),
                    "Transient HTTP failure, retrying"
                );
                self.pause(attempt, self.policy.transient_backoff).await;
                continue;
            }

            return Err(TransportError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        tracing::warn!(%method, url, attempts = max_attempts, "Exhausted retries");
        Err(TransportError::Exhausted {
            attempts: max_attempts,
            last: last_failure,
        })
    }

    /// Sleep between attempts; the final attempt fails without waiting.
    async fn pause(&self, attempt: u32, wait: Duration) {
        if attempt < self.policy.max_attempts {
            tokio::time::sleep(wait).await;
        }
    }

    /// Send the continue request. It shares the rate gate with every other
    /// send; a relative `action` is resolved against the intercepted URL.
    async fn satisfy_interstitial(&self, request_url: &str, continue_url: &str) {
        let target = match Url::parse(request_url).and_then(|base| base.join(continue_url)) {
            Ok(target) => target,
            Err(e) => {
                tracing::warn!(continue_url, "Unusable interstitial continue URL: {e}");
                return;
            }
        };

        self.gate.await_turn().await;
        match self
            .client
            .get(target)
            .header(UA_HEADER, USER_AGENT)
            .send()
            .await
        {
            Ok(response) => {
                tracing::debug!(status = response.status().as_u16(), "Interstitial continue sent");
            }
            Err(e) => tracing::warn!("Interstitial continue failed: {e}"),
        }
    }
}

fn build_client(timeout: Duration, accept_invalid_certs: bool) -> Client {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .danger_accept_invalid_certs(accept_invalid_certs)
        .build()
        .unwrap_or_else(|_| Client::new())
}

fn base_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(UA_HEADER, HeaderValue::from_static(USER_AGENT));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers
}

/// `Retry-After` in delta-seconds; HTTP-date values are ignored.
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

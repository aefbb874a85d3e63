use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::debug;

use crate::config::RetryConfig;
use crate::error::{Result, ScienceError};

// ─── RateLimitedClient ────────────────────────────────────────────────────────

/// HTTP GET client shared by one source: spaces requests by a minimum interval
/// and retries transient failures.
///
/// A 429 waits (`Retry-After` seconds, or the configured wait) and retries
/// without spending one of `max_attempts`; those waits have their own budget.
/// Network errors and 5xx responses retry with exponential backoff. Any other
/// non-success status fails at once, 404 as [`ScienceError::NotFound`].
pub struct RateLimitedClient {
    client: reqwest::Client,
    policy: RetryConfig,
    last_request: Arc<Mutex<Option<Instant>>>,
}

impl RateLimitedClient {
    pub fn new(policy: RetryConfig, user_agent: &str) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .gzip(true)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            policy,
            last_request: Arc::new(Mutex::new(None)),
        }
    }

    async fn wait_for_rate_limit(&self) {
        let min_interval = self.policy.min_interval();
        let mut last = self.last_request.lock().await;
        if let Some(t) = *last {
            let elapsed = t.elapsed();
            if elapsed < min_interval {
                sleep(min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    pub async fn get(&self, url: &str) -> Result<String> {
        self.get_with_headers(url, HeaderMap::new()).await
    }

    pub async fn get_with_headers(&self, url: &str, headers: HeaderMap) -> Result<String> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut failures = 0u32;
        let mut rate_limit_waits = 0u32;
        loop {
            self.wait_for_rate_limit().await;
            let resp = self.client.get(url).headers(headers.clone()).send().await;
            match resp {
                Ok(r) if r.status() == StatusCode::TOO_MANY_REQUESTS => {
                    if rate_limit_waits >= self.policy.max_rate_limit_waits {
                        return Err(ScienceError::RateLimit(url.to_string(), rate_limit_waits));
                    }
                    let wait = retry_after(r.headers())
                        .unwrap_or_else(|| self.policy.rate_limit_wait());
                    debug!(url, wait_ms = wait.as_millis() as u64, "rate limited, waiting");
                    sleep(wait).await;
                    rate_limit_waits += 1;
                }
                Ok(r) if r.status().is_server_error() => {
                    failures += 1;
                    let status = r.status().as_u16();
                    if failures >= max_attempts {
                        let body = r.text().await.unwrap_or_default();
                        return Err(ScienceError::ApiError(
                            url.to_string(),
                            format!("HTTP {status}: {body}"),
                        ));
                    }
                    self.back_off(url, failures, status).await;
                }
                Ok(r) if r.status() == StatusCode::NOT_FOUND => {
                    return Err(ScienceError::NotFound(url.to_string()));
                }
                Ok(r) if !r.status().is_success() => {
                    let status = r.status().as_u16();
                    let body = r.text().await.unwrap_or_default();
                    return Err(ScienceError::ApiError(
                        url.to_string(),
                        format!("HTTP {status}: {body}"),
                    ));
                }
                Ok(r) => return r.text().await.map_err(ScienceError::Http),
                Err(e) => {
                    failures += 1;
                    if failures >= max_attempts {
                        return Err(ScienceError::Http(e));
                    }
                    self.back_off(url, failures, 0).await;
                }
            }
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        self.get_json_with_headers(url, HeaderMap::new()).await
    }

    pub async fn get_json_with_headers<T: DeserializeOwned>(
        &self,
        url: &str,
        headers: HeaderMap,
    ) -> Result<T> {
        let text = self.get_with_headers(url, headers).await?;
        serde_json::from_str(&text).map_err(|e| ScienceError::Parse(e.to_string()))
    }

    async fn back_off(&self, url: &str, attempt: u32, status: u16) {
        let delay = self.policy.backoff(attempt);
        debug!(
            url,
            attempt,
            status,
            delay_ms = delay.as_millis() as u64,
            "transient failure, retrying"
        );
        sleep(delay).await;
    }
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

//! Shared HTTP plumbing for provider clients: a reqwest client with a fixed
//! timeout, and a retry wrapper with exponential backoff around any call.

use std::future::Future;
use std::time::Duration;

use reqwest::header::HeaderMap;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{Config, RETRY_BACKOFF_MAX_MS};
use crate::error::{ProviderError, ProviderResult};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after every failure.
    pub backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            max_attempts: cfg.retry_attempts,
            backoff: cfg.retry_backoff,
            max_backoff: Duration::from_millis(RETRY_BACKOFF_MAX_MS),
        }
    }

    /// Sleep before attempt `attempt + 1`, where `attempt` is 1-based.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the attempt
/// budget runs out. Exhaustion wraps the last error in `RetriesExhausted`.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> ProviderResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ProviderResult<T>>,
{
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.delay_after(attempt);
                warn!(
                    "{label}: attempt {attempt}/{} failed ({e}), retrying in {}ms",
                    policy.max_attempts,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) if e.is_retryable() => {
                return Err(ProviderError::RetriesExhausted {
                    attempts: attempt,
                    source: Box::new(e),
                })
            }
            Err(e) => return Err(e),
        }
    }
}

/// reqwest client plus the retry policy every provider call goes through.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    policy: RetryPolicy,
}

impl HttpClient {
    pub fn new(timeout: Duration, policy: RetryPolicy) -> ProviderResult<Self> {
        let inner = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { inner, policy })
    }

    pub fn from_config(cfg: &Config) -> ProviderResult<Self> {
        Self::new(cfg.request_timeout, RetryPolicy::from_config(cfg))
    }

    /// `label` names the call in logs and retry warnings. The URL is never logged,
    /// since some providers carry their credentials in it.
    pub async fn get_json(
        &self,
        label: &str,
        url: &str,
        headers: &HeaderMap,
        query: &[(&str, String)],
    ) -> ProviderResult<Value> {
        with_retry(&self.policy, label, move || async move {
            debug!("GET {label}");
            let resp = self
                .inner
                .get(url)
                .headers(headers.clone())
                .query(query)
                .send()
                .await?;
            read_json(resp).await
        })
        .await
    }

    pub async fn post_json(
        &self,
        label: &str,
        url: &str,
        headers: &HeaderMap,
        body: &Value,
    ) -> ProviderResult<Value> {
        with_retry(&self.policy, label, move || async move {
            debug!("POST {label}");
            let resp = self
                .inner
                .post(url)
                .headers(headers.clone())
                .json(body)
                .send()
                .await?;
            read_json(resp).await
        })
        .await
    }
}

async fn read_json(resp: reqwest::Response) -> ProviderResult<Value> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        let body: String = body.chars().take(200).collect();
        return Err(ProviderError::Status { status, body });
    }
    let bytes = resp.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

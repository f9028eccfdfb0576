//! Bounded retry with exponential backoff for remote calls.
//!
//! Retrying lives at the call boundary. The pipeline above it sees a single
//! success or a single failure; it never loops on its own.

use std::time::Duration;

use anyhow::{Result, anyhow};
use serde::Serialize;

/// Extra slack the outer stopwatch allows beyond the client's own timeout,
/// so a wedged connection fails the attempt instead of hanging the caller.
const STOPWATCH_SLACK: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Delay before retry number `attempt` (1-based): base * 2^(attempt-1).
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(1u32 << (attempt - 1).min(16))
    }
}

/// POSTs a JSON body with a bearer token, retrying transient failures
/// (connect errors, timeouts, HTTP 429 and 5xx) up to the policy's bound.
/// Client errors other than rate limiting are returned immediately; retrying
/// a rejected request would only repeat the rejection.
pub(crate) async fn post_json_with_retries<B: Serialize>(
    client: &reqwest::Client,
    url: &str,
    api_key: &str,
    body: &B,
    timeout: Duration,
    policy: &RetryPolicy,
    what: &str,
) -> Result<reqwest::Response> {
    let stopwatch = timeout + STOPWATCH_SLACK;
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        let send = client.post(url).bearer_auth(api_key).json(body).send();
        let error = match tokio::time::timeout(stopwatch, send).await {
            Ok(Ok(response)) => {
                let status = response.status();
                if status.is_success() {
                    return Ok(response);
                }

                let retryable =
                    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
                let detail = response.text().await.unwrap_or_default();
                let error = anyhow!("{what} failed: {status} - {detail}");
                if !retryable {
                    return Err(error);
                }
                error
            }
            Ok(Err(e)) => anyhow!("{what} request error: {e}"),
            Err(_) => anyhow!(
                "{what} timed out after {}s",
                stopwatch.as_secs()
            ),
        };

        if attempt > policy.max_retries {
            return Err(error.context(format!("{what} failed after {attempt} attempts")));
        }

        let delay = policy.delay(attempt);
        tracing::warn!(
            attempt,
            max_retries = policy.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "{what} failed, retrying"
        );
        tokio::time::sleep(delay).await;
    }
}

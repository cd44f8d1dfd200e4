//! Retrying fetcher with exponential backoff.
//!
//! Every source funnels its HTTP traffic through [`fetch_with_retry`], so the
//! backoff schedule is configured in exactly one place: the [`RetryPolicy`]
//! handed in by the caller.
//!
//! Backoff before the retry that follows failed attempt `i` (0-indexed):
//!
//! ```text
//! base_delay_ms * backoff_multiplier ^ i
//! ```
//!
//! There is no wait before the first attempt and none after the last one.

use std::future::Future;
use std::time::Duration;

use metrics::counter;
use serde::{Deserialize, Serialize};

use crate::error::{CoursefetchError, Result};
use crate::http::HttpClient;
use crate::request::RequestSpec;

/// Configuration for retry behavior.
///
/// ```rust
/// # use coursefetch::fetch::RetryPolicy;
/// let policy = RetryPolicy {
///     max_attempts: 4,          // First try plus three retries
///     base_delay_ms: 100,       // Start with 100ms
///     backoff_multiplier: 2.0,  // Double each time (100ms, 200ms, 400ms)
/// };
/// assert_eq!(policy.backoff_for(2).as_millis(), 400);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one (>= 1)
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds
    pub base_delay_ms: u64,

    /// Factor applied to the delay for every further retry (>= 1.0)
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 100,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Check the bounds documented on each field.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(CoursefetchError::InvalidConfig(
                "retry max_attempts must be at least 1".to_string(),
            ));
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(CoursefetchError::InvalidConfig(format!(
                "retry backoff_multiplier must be a finite number >= 1, got {}",
                self.backoff_multiplier
            )));
        }
        Ok(())
    }

    /// Delay to wait after failed attempt `attempt_index` (0-indexed).
    pub fn backoff_for(&self, attempt_index: u32) -> Duration {
        let exponent = i32::try_from(attempt_index).unwrap_or(i32::MAX);
        let millis = self.base_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        // Float to int casts saturate, so an enormous product pins at u64::MAX
        Duration::from_millis(millis.round() as u64)
    }
}

/// Run `operation` until it succeeds, fails with a non-retriable error, or the
/// policy's attempt budget is spent.
///
/// `what` names the operation in log lines.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, what: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempts: u32 = 0;

    loop {
        counter!("coursefetch_fetch_attempts_total").increment(1);
        tracing::trace!(what, attempt = attempts + 1, max_attempts = policy.max_attempts, "Attempting");

        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };
        attempts += 1;

        if !error.is_retriable() {
            tracing::warn!(what, attempt = attempts, error = %error, "Non-retriable failure, not retrying");
            return Err(error);
        }

        if attempts >= policy.max_attempts {
            counter!("coursefetch_fetch_exhausted_total", "kind" => error.kind()).increment(1);
            tracing::warn!(
                what,
                attempts,
                error = %error,
                "No retries remaining, giving up"
            );
            return Err(CoursefetchError::ExhaustedRetries {
                attempts,
                last: Box::new(error),
            });
        }

        let backoff = policy.backoff_for(attempts - 1);
        counter!("coursefetch_fetch_retries_total", "kind" => error.kind()).increment(1);
        tracing::info!(
            what,
            attempt = attempts,
            backoff_ms = backoff.as_millis() as u64,
            error = %error,
            "Request failed, retrying with exponential backoff"
        );
        tokio::time::sleep(backoff).await;
    }
}

/// Issue `request` with retries and return the parsed JSON payload.
///
/// # Errors
/// - `ExhaustedRetries` wrapping the last failure once `policy.max_attempts`
///   consecutive attempts failed
/// - any non-retriable error from the client, immediately
#[tracing::instrument(skip(client, request, policy), fields(url = %request.url))]
pub async fn fetch_with_retry<H: HttpClient>(
    client: &H,
    request: &RequestSpec,
    policy: &RetryPolicy,
    timeout_ms: u64,
) -> Result<serde_json::Value> {
    retry(policy, &request.url, || fetch_once(client, request, timeout_ms)).await
}

/// A single attempt: transport, then status, then content type, then JSON.
async fn fetch_once<H: HttpClient>(
    client: &H,
    request: &RequestSpec,
    timeout_ms: u64,
) -> Result<serde_json::Value> {
    let response = client.execute(request, timeout_ms).await?;

    if !response.is_success() {
        return Err(CoursefetchError::HttpStatus {
            status: response.status,
            url: request.url.clone(),
        });
    }

    if !response.is_json() {
        let preview: String = response.body.chars().take(200).collect();
        tracing::debug!(
            url = %request.url,
            content_type = ?response.content_type,
            preview = %preview,
            "Non-JSON response"
        );
        return Err(CoursefetchError::UnexpectedContentType {
            url: request.url.clone(),
            content_type: response.content_type,
        });
    }

    serde_json::from_str(&response.body).map_err(|e| CoursefetchError::InvalidPayload {
        url: request.url.clone(),
        error: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpResponse, MockHttpClient};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    const URL: &str = "https://api.example.com/courses/abc/grades";

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay_ms: 100,
            backoff_multiplier: 2.0,
        }
    }

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay_ms: 250,
            backoff_multiplier: 1.5,
        };
        assert_eq!(policy.backoff_for(0), Duration::from_millis(250));
        assert_eq!(policy.backoff_for(1), Duration::from_millis(375));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(563));
    }

    #[test]
    fn test_validate_rejects_out_of_range_values() {
        assert!(policy(0).validate().is_err());
        let mut bad = policy(3);
        bad.backoff_multiplier = 0.5;
        assert!(bad.validate().is_err());
        bad.backoff_multiplier = f64::NAN;
        assert!(bad.validate().is_err());
        assert!(policy(1).validate().is_ok());
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_always_failing_makes_exactly_max_attempts() {
        let mock = MockHttpClient::new();
        // Nothing configured: every call is a transport error
        let request = RequestSpec::get(URL);

        let start = Instant::now();
        let result = fetch_with_retry(&mock, &request, &policy(3), 1000).await;
        let elapsed = start.elapsed();

        match result {
            Err(CoursefetchError::ExhaustedRetries { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, CoursefetchError::Transport(_)));
            }
            other => panic!("expected ExhaustedRetries, got {:?}", other),
        }
        assert_eq!(mock.call_count(), 3);
        // 100ms * 2^0 + 100ms * 2^1, and no wait after the last attempt
        assert_eq!(elapsed, Duration::from_millis(300));
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_waits_between_attempts_follow_policy() {
        let calls = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let start = Instant::now();
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay_ms: 50,
            backoff_multiplier: 3.0,
        };

        let recorded = calls.clone();
        let result: Result<()> = retry(&policy, "test", || {
            recorded.lock().push(start.elapsed());
            async { Err(CoursefetchError::Transport("reset".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(
            *calls.lock(),
            vec![
                Duration::ZERO,
                Duration::from_millis(50),
                Duration::from_millis(200),
                Duration::from_millis(650),
            ]
        );
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_success_after_transient_failures() {
        let mock = MockHttpClient::new();
        let key = format!("GET {URL}");
        mock.add_response(&key, Ok(HttpResponse::json(503, "unavailable")));
        mock.add_response(
            &key,
            Ok(HttpResponse::with_content_type(200, Some("text/html"), "<html></html>")),
        );
        mock.add_response(&key, Ok(HttpResponse::json(200, r#"{"courseUuid":"abc"}"#)));

        let payload = fetch_with_retry(&mock, &RequestSpec::get(URL), &policy(3), 1000)
            .await
            .unwrap();

        assert_eq!(payload["courseUuid"], "abc");
        assert_eq!(mock.call_count(), 3);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_first_success_returns_immediately() {
        let mock = MockHttpClient::new();
        mock.add_response(&format!("GET {URL}"), Ok(HttpResponse::json(200, "[1,2,3]")));

        let start = Instant::now();
        let payload = fetch_with_retry(&mock, &RequestSpec::get(URL), &policy(3), 1000)
            .await
            .unwrap();

        assert_eq!(payload, serde_json::json!([1, 2, 3]));
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(mock.call_count(), 1);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_unexpected_content_type_surfaces_as_last_error() {
        let mock = MockHttpClient::new();
        let key = format!("GET {URL}");
        for _ in 0..2 {
            mock.add_response(
                &key,
                Ok(HttpResponse::with_content_type(200, Some("text/html"), "<html>")),
            );
        }

        let result = fetch_with_retry(&mock, &RequestSpec::get(URL), &policy(2), 1000).await;
        match result {
            Err(CoursefetchError::ExhaustedRetries { attempts: 2, last }) => {
                assert!(matches!(*last, CoursefetchError::UnexpectedContentType { .. }));
            }
            other => panic!("expected ExhaustedRetries, got {:?}", other),
        }
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_malformed_json_is_retried() {
        let mock = MockHttpClient::new();
        let key = format!("GET {URL}");
        mock.add_response(&key, Ok(HttpResponse::json(200, "{not json")));
        mock.add_response(&key, Ok(HttpResponse::json(200, "{}")));

        let payload = fetch_with_retry(&mock, &RequestSpec::get(URL), &policy(2), 1000)
            .await
            .unwrap();
        assert_eq!(payload, serde_json::json!({}));
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_non_retriable_error_stops_immediately() {
        let attempts = AtomicU32::new(0);
        let result: Result<()> = retry(&policy(5), "test", || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(CoursefetchError::InvalidConfig("bad".into())) }
        })
        .await;

        assert!(matches!(result, Err(CoursefetchError::InvalidConfig(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}

//! Data sources: build requests, run them through the pipeline, normalize.
//!
//! Each source owns one listing step (fatal on failure) and, where the data
//! needs it, a fan-out of per-item fetches through the batch scheduler. Fan-out
//! results are joined first and reduced sequentially afterwards.

pub mod course_search;
pub mod grades;
pub mod ratings;

use serde::de::DeserializeOwned;

use crate::batch::{BatchPlan, run_batched};
use crate::error::{CoursefetchError, Result};
use crate::fetch::{RetryPolicy, fetch_with_retry};
use crate::http::HttpClient;
use crate::request::RequestSpec;

pub use course_search::{CourseSearchConfig, CourseSearchOutput, scrape_courses};
pub use grades::{GradesConfig, GradesOutput, scrape_grades};
pub use ratings::{RatingsConfig, RatingsOutput, scrape_ratings};

/// Wrap a failure of a listing call so the caller can tell it apart from
/// per-item failures.
pub(crate) fn listing_error(source_name: &str, error: impl ToString) -> CoursefetchError {
    CoursefetchError::Listing {
        source_name: source_name.to_string(),
        reason: error.to_string(),
    }
}

/// Fetch every request through the scheduler and decode each payload as `T`.
///
/// One slot per request, in request order. A payload that does not decode as
/// `T` fills its slot with `InvalidPayload`; it is not retried.
pub(crate) async fn fetch_all<H, T>(
    client: &H,
    requests: Vec<RequestSpec>,
    retry: &RetryPolicy,
    plan: &BatchPlan,
    timeout_ms: u64,
) -> Vec<Result<T>>
where
    H: HttpClient + 'static,
    T: DeserializeOwned + Send + 'static,
{
    let tasks: Vec<_> = requests
        .into_iter()
        .map(|request| {
            let client = client.clone();
            let retry = retry.clone();
            move || async move {
                let payload = fetch_with_retry(&client, &request, &retry, timeout_ms).await?;
                serde_json::from_value(payload).map_err(|e| CoursefetchError::InvalidPayload {
                    url: request.url.clone(),
                    error: e.to_string(),
                })
            }
        })
        .collect();

    run_batched(tasks, plan).await
}

/// Shared checks for the fields every source config carries.
pub(crate) fn validate_common(
    source_name: &str,
    base_url: &str,
    retry: &RetryPolicy,
    timeout_ms: u64,
) -> Result<()> {
    if base_url.trim().is_empty() {
        return Err(CoursefetchError::InvalidConfig(format!(
            "{source_name}: base url must not be empty"
        )));
    }
    if timeout_ms == 0 {
        return Err(CoursefetchError::InvalidConfig(format!(
            "{source_name}: timeout_ms must be greater than zero"
        )));
    }
    retry.validate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpResponse, MockHttpClient};
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        id: u32,
    }

    fn fast_plan() -> BatchPlan {
        BatchPlan {
            batch_size: 2,
            intra_batch_stagger_ms: 0,
            inter_batch_delay_ms: 0,
        }
    }

    fn no_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 1,
            base_delay_ms: 0,
            backoff_multiplier: 1.0,
        }
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_fetch_all_decodes_in_order_and_isolates_failures() {
        let mock = MockHttpClient::new();
        mock.add_json("GET https://api.example.com/items/1", &json!({"id": 1}));
        mock.add_response(
            "GET https://api.example.com/items/2",
            Ok(HttpResponse::json(404, "{}")),
        );
        mock.add_json("GET https://api.example.com/items/3", &json!({"name": "no id"}));
        mock.add_json("GET https://api.example.com/items/4", &json!({"id": 4}));

        let requests = (1..=4)
            .map(|i| RequestSpec::get(format!("https://api.example.com/items/{i}")))
            .collect();
        let results: Vec<Result<Item>> =
            fetch_all(&mock, requests, &no_retry(), &fast_plan(), 1000).await;

        assert_eq!(results.len(), 4);
        assert_eq!(results[0].as_ref().unwrap(), &Item { id: 1 });
        assert!(matches!(
            results[1],
            Err(CoursefetchError::ExhaustedRetries { attempts: 1, .. })
        ));
        assert!(matches!(results[2], Err(CoursefetchError::InvalidPayload { .. })));
        assert_eq!(results[3].as_ref().unwrap(), &Item { id: 4 });
        assert!(mock.max_in_flight() <= 2);
    }

    #[test]
    fn test_validate_common() {
        assert!(validate_common("x", "", &RetryPolicy::default(), 10).is_err());
        assert!(validate_common("x", "https://a", &RetryPolicy::default(), 0).is_err());
        assert!(validate_common("x", "https://a", &RetryPolicy::default(), 10).is_ok());
    }
}

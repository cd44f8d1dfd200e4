//! Batch scheduler: bounded, paced concurrency over independent fetch tasks.
//!
//! Tasks are split into consecutive chunks of [`BatchPlan::batch_size`]. The
//! tasks of a chunk run concurrently, each delayed by its local index times
//! the stagger; the next chunk starts only once every task of the current one
//! settled and the inter-batch wait elapsed. A failure or panic is confined to
//! the slot of the task that produced it.

use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use metrics::{counter, gauge};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::error::{CoursefetchError, Result};

/// Pacing parameters for [`run_batched`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPlan {
    /// Maximum number of tasks running at the same time (>= 1)
    pub batch_size: usize,

    /// Delay between the starts of consecutive tasks within a chunk (milliseconds)
    pub intra_batch_stagger_ms: u64,

    /// Pause after a chunk settles before the next chunk starts (milliseconds)
    pub inter_batch_delay_ms: u64,
}

impl Default for BatchPlan {
    fn default() -> Self {
        Self {
            batch_size: 50,
            intra_batch_stagger_ms: 100,
            inter_batch_delay_ms: 200,
        }
    }
}

impl BatchPlan {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(CoursefetchError::InvalidConfig(
                "batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Number of chunks needed for `task_count` tasks.
    pub fn batch_count(&self, task_count: usize) -> usize {
        task_count.div_ceil(self.batch_size.max(1))
    }
}

/// Success/failure tally over a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchStats {
    pub fn from_results<T>(results: &[Result<T>]) -> Self {
        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        Self {
            succeeded,
            failed: results.len() - succeeded,
        }
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Start offset of the task at `index` within its batch.
fn stagger_delay(stagger: Duration, index: usize) -> Duration {
    stagger.saturating_mul(u32::try_from(index).unwrap_or(u32::MAX))
}

/// Run every task under `plan` and return one result per task, in input order.
///
/// The plan is expected to be validated by the caller; a zero batch size is
/// treated as one.
pub async fn run_batched<T, F, Fut>(tasks: Vec<F>, plan: &BatchPlan) -> Vec<Result<T>>
where
    T: Send + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let total = tasks.len();
    let batch_size = plan.batch_size.max(1);
    let batch_count = plan.batch_count(total);
    let stagger = Duration::from_millis(plan.intra_batch_stagger_ms);
    let inter_batch_delay = Duration::from_millis(plan.inter_batch_delay_ms);

    tracing::info!(total, batch_size, batch_count, "Starting batched run");

    let mut results = Vec::with_capacity(total);
    let mut remaining = tasks.into_iter();

    for batch in 0..batch_count {
        let handles: Vec<JoinHandle<Result<T>>> = remaining
            .by_ref()
            .take(batch_size)
            .enumerate()
            .map(|(index, task)| {
                let delay = stagger_delay(stagger, index);
                tokio::spawn(async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }

                    let in_flight = gauge!("coursefetch_tasks_in_flight");
                    in_flight.increment(1.0);
                    let _guard = scopeguard::guard(in_flight, |in_flight| {
                        in_flight.decrement(1.0);
                    });

                    task().await
                })
            })
            .collect();

        let size = handles.len();
        tracing::debug!(batch = batch + 1, batch_count, size, "Dispatched batch");

        let mut failed = 0usize;
        for joined in join_all(handles).await {
            let result = match joined {
                Ok(result) => result,
                Err(e) => {
                    tracing::error!(batch = batch + 1, error = %e, "Fetch task panicked");
                    Err(CoursefetchError::TaskPanicked(e.to_string()))
                }
            };

            match &result {
                Ok(_) => counter!("coursefetch_tasks_total", "outcome" => "success").increment(1),
                Err(e) => {
                    failed += 1;
                    counter!("coursefetch_tasks_total", "outcome" => "failure").increment(1);
                    tracing::warn!(batch = batch + 1, error = %e, "Fetch task failed");
                }
            }
            results.push(result);
        }

        tracing::info!(
            batch = batch + 1,
            batch_count,
            succeeded = size - failed,
            failed,
            "Batch settled"
        );

        if batch + 1 < batch_count && !inter_batch_delay.is_zero() {
            tracing::trace!(delay_ms = plan.inter_batch_delay_ms, "Sleeping before next batch");
            tokio::time::sleep(inter_batch_delay).await;
        }
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    fn plan(batch_size: usize, stagger: u64, inter: u64) -> BatchPlan {
        BatchPlan {
            batch_size,
            intra_batch_stagger_ms: stagger,
            inter_batch_delay_ms: inter,
        }
    }

    #[test]
    fn test_validate_rejects_zero_batch_size() {
        assert!(plan(0, 0, 0).validate().is_err());
        assert!(plan(1, 0, 0).validate().is_ok());
        assert!(BatchPlan::default().validate().is_ok());
    }

    #[test]
    fn test_batch_count() {
        let plan = plan(50, 0, 0);
        assert_eq!(plan.batch_count(0), 0);
        assert_eq!(plan.batch_count(50), 1);
        assert_eq!(plan.batch_count(51), 2);
    }

    #[test]
    fn test_stagger_delay_clamps_large_indexes() {
        let ms = Duration::from_millis(1);
        assert_eq!(stagger_delay(Duration::from_millis(100), 3), Duration::from_millis(300));
        assert_eq!(stagger_delay(ms, 0), Duration::ZERO);
        assert_eq!(stagger_delay(ms, usize::MAX), ms * u32::MAX);
        assert_eq!(stagger_delay(Duration::MAX, 2), Duration::MAX);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_results_keep_input_order() {
        // Later tasks finish first
        let tasks: Vec<_> = (0..7u64)
            .map(|i| {
                move || async move {
                    tokio::time::sleep(Duration::from_millis(100 - i * 10)).await;
                    Ok(i)
                }
            })
            .collect();

        let results = run_batched(tasks, &plan(3, 0, 0)).await;

        let values: Vec<u64> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, vec![0, 1, 2, 3, 4, 5, 6]);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_failures_are_isolated() {
        let tasks: Vec<_> = (0..5u32)
            .map(|i| {
                move || async move {
                    if i % 2 == 1 {
                        Err(CoursefetchError::HttpStatus {
                            status: 500,
                            url: format!("https://example.com/{i}"),
                        })
                    } else {
                        Ok(i)
                    }
                }
            })
            .collect();

        let results = run_batched(tasks, &plan(2, 10, 10)).await;

        assert_eq!(results.len(), 5);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
        assert!(results[2].is_ok());
        assert!(results[3].is_err());
        assert_eq!(*results[4].as_ref().unwrap(), 4);
        assert_eq!(
            BatchStats::from_results(&results),
            BatchStats {
                succeeded: 3,
                failed: 2
            }
        );
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_panicking_task_fills_its_slot_with_an_error() {
        let tasks: Vec<_> = (1..=3u32)
            .map(|i| {
                move || async move {
                    if i == 2 {
                        panic!("malformed payload");
                    }
                    Ok(i)
                }
            })
            .collect();

        let results = run_batched(tasks, &plan(2, 0, 0)).await;

        assert_eq!(results.len(), 3);
        assert_eq!(*results[0].as_ref().unwrap(), 1);
        assert!(matches!(results[1], Err(CoursefetchError::TaskPanicked(_))));
        assert_eq!(*results[2].as_ref().unwrap(), 3);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_stagger_and_inter_batch_delay() {
        let start = Instant::now();
        let tasks: Vec<_> = (0..5)
            .map(|_| move || async move { Ok(start.elapsed()) })
            .collect();

        let results = run_batched(tasks, &plan(3, 100, 200)).await;
        let started: Vec<Duration> = results.into_iter().map(|r| r.unwrap()).collect();

        // Batch 1 settles at 200ms, then 200ms pause; batch 2 starts at 400ms
        assert_eq!(
            started,
            vec![
                Duration::from_millis(0),
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(500),
            ]
        );
        // No wait after the final batch
        assert_eq!(start.elapsed(), Duration::from_millis(500));
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_next_batch_waits_for_slowest_task() {
        let start = Instant::now();
        let durations = [300u64, 10, 10];
        let tasks: Vec<_> = durations
            .into_iter()
            .map(|ms| {
                move || async move {
                    let began = start.elapsed();
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    Ok(began)
                }
            })
            .collect();

        let results = run_batched(tasks, &plan(2, 0, 50)).await;
        let third_start = *results[2].as_ref().unwrap();

        assert_eq!(third_start, Duration::from_millis(350));
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_concurrency_never_exceeds_batch_size() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let in_flight = in_flight.clone();
                let max_seen = max_seen.clone();
                move || async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .collect();

        let results = run_batched(tasks, &plan(4, 0, 0)).await;

        assert_eq!(results.len(), 10);
        assert_eq!(max_seen.load(Ordering::SeqCst), 4);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn test_empty_input_returns_immediately() {
        let tasks: Vec<fn() -> std::future::Ready<Result<()>>> = Vec::new();
        let start = Instant::now();

        let results = run_batched(tasks, &BatchPlan::default()).await;

        assert!(results.is_empty());
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}

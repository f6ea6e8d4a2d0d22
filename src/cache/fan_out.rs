/**
 * All-or-nothing concurrent join of independent fetches
 */
use super::errors::FetchError;
use futures::future::{self, BoxFuture, FutureExt};
use std::future::Future;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// One labelled sub-operation. The label only shows up in logs.
pub type LabelledFetch<'a, T> = (String, BoxFuture<'a, Result<T, FetchError>>);

/// Run every operation concurrently and return the results in input order.
///
/// The first failure observed wins: it is returned as-is, the remaining operations are
/// dropped (cancelled) and no partial result escapes.
///
/// # Errors
///
/// Returns the error of the first sub-operation observed to fail.
pub async fn join_all<'a, T>(operations: Vec<LabelledFetch<'a, T>>) -> Result<Vec<T>, FetchError>
where
    T: Send + 'a,
{
    let count = operations.len();
    let start = Instant::now();

    let guarded = operations.into_iter().map(|(label, operation)| {
        operation.map(move |outcome| {
            outcome.inspect_err(|e| warn!("❌ JOIN ABORTED by '{}': {}", label, e))
        })
    });

    let results = future::try_join_all(guarded).await?;
    debug!(
        "✅ JOIN complete: {} operations in {:.2}s",
        count,
        start.elapsed().as_secs_f64()
    );
    Ok(results)
}

/// [`join_all`], abandoned with [`FetchError::Cancelled`] as soon as `cancel` fires.
///
/// # Errors
///
/// Returns `Cancelled` if the owner scope is cancelled first, otherwise as [`join_all`].
pub async fn join_all_until<'a, T>(
    cancel: &CancellationToken,
    operations: Vec<LabelledFetch<'a, T>>,
) -> Result<Vec<T>, FetchError>
where
    T: Send + 'a,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(FetchError::Cancelled),
        outcome = join_all(operations) => outcome,
    }
}

/// Builder for a fan-out of same-typed operations.
pub struct FanOut<'a, T> {
    operations: Vec<LabelledFetch<'a, T>>,
}

impl<T> Default for FanOut<'_, T> {
    fn default() -> Self {
        Self {
            operations: Vec::new(),
        }
    }
}

impl<'a, T> FanOut<'a, T>
where
    T: Send + 'a,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with<F>(mut self, label: impl Into<String>, operation: F) -> Self
    where
        F: Future<Output = Result<T, FetchError>> + Send + 'a,
    {
        self.operations.push((label.into(), operation.boxed()));
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// # Errors
    ///
    /// See [`join_all`].
    pub async fn join(self) -> Result<Vec<T>, FetchError> {
        join_all(self.operations).await
    }

    /// # Errors
    ///
    /// See [`join_all_until`].
    pub async fn join_until(self, cancel: &CancellationToken) -> Result<Vec<T>, FetchError> {
        join_all_until(cancel, self.operations).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::time::sleep;

    async fn after(ms: u64, outcome: Result<u32, FetchError>) -> Result<u32, FetchError> {
        sleep(Duration::from_millis(ms)).await;
        outcome
    }

    #[tokio::test]
    async fn test_results_follow_input_order() {
        let results = FanOut::new()
            .with("slow", after(30, Ok(1)))
            .with("fast", after(1, Ok(2)))
            .with("middle", after(10, Ok(3)))
            .join()
            .await
            .unwrap();

        assert_eq!(results, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_one_failure_aborts_bundle() {
        let finished = Arc::new(AtomicBool::new(false));
        let slow = {
            let finished = finished.clone();
            async move {
                sleep(Duration::from_millis(200)).await;
                finished.store(true, Ordering::SeqCst);
                Ok(1)
            }
        };
        let error = FetchError::Transport("horror timed out".to_string());

        let outcome = FanOut::new()
            .with("popular", slow)
            .with("horror", after(5, Err(error.clone())))
            .join()
            .await;

        assert_eq!(outcome, Err(error));
        // the sibling was dropped, not left running
        sleep(Duration::from_millis(250)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_cancelled_join() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let outcome = FanOut::new()
            .with("a", after(1_000, Ok(1)))
            .with("b", after(1_000, Ok(2)))
            .join_until(&cancel)
            .await;

        assert_eq!(outcome, Err(FetchError::Cancelled));
    }

    #[tokio::test]
    async fn test_empty_join() {
        let fan_out: FanOut<'_, u32> = FanOut::new();
        assert!(fan_out.is_empty());
        assert_eq!(fan_out.join().await, Ok(vec![]));
    }
}

//! Request coalescing: concurrent identical lookups share one upstream call.
//!
//! The first caller for a key spawns the producer and registers a shared
//! handle to its outcome; later callers await that handle. The registry
//! entry is removed when the producer finishes, whether it succeeded,
//! failed or panicked.

use super::types::LocationError;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

type SharedLookup<V> = Shared<BoxFuture<'static, Result<V, LocationError>>>;
type Registry<V> = Arc<Mutex<HashMap<String, SharedLookup<V>>>>;

fn lock<V>(registry: &Registry<V>) -> MutexGuard<'_, HashMap<String, SharedLookup<V>>> {
    registry.lock().unwrap_or_else(|e| e.into_inner())
}

/// Removes the pending entry when the producer task ends.
struct PendingGuard<V> {
    registry: Registry<V>,
    key: String,
}

impl<V> Drop for PendingGuard<V> {
    fn drop(&mut self) {
        lock(&self.registry).remove(&self.key);
    }
}

pub struct RequestCoalescer<V> {
    pending: Registry<V>,
}

impl<V> RequestCoalescer<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Run `producer` for `key`, or join the run already in flight.
    pub async fn coalesce<F, Fut>(&self, key: &str, producer: F) -> Result<V, LocationError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, LocationError>> + Send + 'static,
    {
        let lookup = {
            let mut pending = lock(&self.pending);
            match pending.get(key) {
                Some(existing) => {
                    tracing::debug!(key, "joining in-flight lookup");
                    existing.clone()
                }
                None => {
                    let guard = PendingGuard {
                        registry: Arc::clone(&self.pending),
                        key: key.to_string(),
                    };
                    let work = producer();
                    // The registry lock is held until the entry is inserted,
                    // so the guard cannot remove it before it exists.
                    let handle = tokio::spawn(async move {
                        let _guard = guard;
                        work.await
                    });
                    let lookup = async move {
                        handle.await.unwrap_or_else(|e| {
                            Err(LocationError::UpstreamUnavailable(format!("lookup task failed: {}", e)))
                        })
                    }
                    .boxed()
                    .shared();
                    pending.insert(key.to_string(), lookup.clone());
                    lookup
                }
            }
        };
        lookup.await
    }

    /// Number of lookups currently in flight.
    pub fn pending_len(&self) -> usize {
        lock(&self.pending).len()
    }
}

impl<V> Default for RequestCoalescer<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrent_callers_share_one_call() {
        let coalescer = Arc::new(RequestCoalescer::<u32>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..10)
            .map(|_| {
                let coalescer = Arc::clone(&coalescer);
                let calls = Arc::clone(&calls);
                tokio::spawn(async move {
                    coalescer
                        .coalesce("paris", move || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok(42)
                        })
                        .await
                })
            })
            .collect();

        for t in tasks {
            assert_eq!(t.await.unwrap(), Ok(42));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(coalescer.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_distinct_keys_run_separately() {
        let coalescer = RequestCoalescer::<String>::new();
        let a = coalescer.coalesce("a", || async { Ok("A".to_string()) });
        let b = coalescer.coalesce("b", || async { Ok("B".to_string()) });
        let (a, b) = tokio::join!(a, b);
        assert_eq!(a.unwrap(), "A");
        assert_eq!(b.unwrap(), "B");
    }

    #[tokio::test]
    async fn test_failure_is_shared_and_entry_removed() {
        let coalescer = RequestCoalescer::<u32>::new();
        let first = coalescer
            .coalesce("x", || async { Err(LocationError::UpstreamTimeout) })
            .await;
        assert_eq!(first, Err(LocationError::UpstreamTimeout));
        assert_eq!(coalescer.pending_len(), 0);

        // A fresh fetch is possible after the failure.
        let second = coalescer.coalesce("x", || async { Ok(5) }).await;
        assert_eq!(second, Ok(5));
    }

    #[tokio::test]
    async fn test_panicking_producer_does_not_leave_entry() {
        let coalescer = RequestCoalescer::<u32>::new();
        let explode = true;
        let result = coalescer
            .coalesce("boom", move || async move {
                if explode {
                    panic!("producer exploded");
                }
                Ok(0)
            })
            .await;
        assert!(matches!(result, Err(LocationError::UpstreamUnavailable(_))));
        assert_eq!(coalescer.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_sequential_calls_refetch() {
        let coalescer = RequestCoalescer::<usize>::new();
        let calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            coalescer
                .coalesce("k", move || async move { Ok(calls.fetch_add(1, Ordering::SeqCst)) })
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}

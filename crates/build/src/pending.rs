//! Waiters for values that are not produced yet.
//!
//! A consumer may ask for a page's compilation before the compiler has
//! produced it. It gets a future that is settled exactly once: by
//! [`PendingRegistry::resolve`], by cancellation, or by its own timeout.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

/// Default bound for a dev-time subscription.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Why a waiter was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PendingError {
    /// The waiter's own bound elapsed.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    /// The key was invalidated, e.g. by a navigation.
    #[error("cancelled: {0}")]
    Cancelled(String),
    /// The registry was reset or dropped.
    #[error("reset")]
    Reset,
}

type Waiter<V> = oneshot::Sender<Result<V, PendingError>>;

/// Keyed registry of pending waiters.
#[derive(Debug)]
pub struct PendingRegistry<K, V> {
    waiters: Arc<Mutex<HashMap<K, Vec<Waiter<V>>>>>,
}

impl<K, V> Clone for PendingRegistry<K, V> {
    fn clone(&self) -> Self {
        Self {
            waiters: Arc::clone(&self.waiters),
        }
    }
}

impl<K, V> Default for PendingRegistry<K, V> {
    fn default() -> Self {
        Self {
            waiters: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K, V> PendingRegistry<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a waiter for `key` now and returns the future that settles it.
    ///
    /// Only this waiter is rejected when `timeout` elapses; its slot is
    /// removed so nothing outlives the wait.
    pub fn wait(
        &self,
        key: K,
        timeout: Duration,
    ) -> impl Future<Output = Result<V, PendingError>> + Send + use<K, V> {
        let (tx, rx) = oneshot::channel();
        self.waiters
            .lock()
            .expect("pending registry poisoned")
            .entry(key.clone())
            .or_default()
            .push(tx);
        let waiters = Arc::clone(&self.waiters);

        async move {
            match tokio::time::timeout(timeout, rx).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(PendingError::Reset),
                Err(_) => {
                    let mut map = waiters.lock().expect("pending registry poisoned");
                    if let Some(list) = map.get_mut(&key) {
                        list.retain(|tx| !tx.is_closed());
                        if list.is_empty() {
                            map.remove(&key);
                        }
                    }
                    Err(PendingError::Timeout(timeout))
                }
            }
        }
    }

    /// Settles every waiter for `key` with `value`. Returns how many were woken.
    pub fn resolve(&self, key: &K, value: V) -> usize {
        self.settle(key, || Ok(value.clone()))
    }

    /// Rejects every waiter for `key` with [`PendingError::Cancelled`].
    pub fn cancel(&self, key: &K, reason: &str) -> usize {
        self.settle(key, || Err(PendingError::Cancelled(reason.to_string())))
    }

    /// Rejects every waiter with [`PendingError::Reset`].
    pub fn reset(&self) -> usize {
        let drained: Vec<Waiter<V>> = {
            let mut map = self.waiters.lock().expect("pending registry poisoned");
            map.drain().flat_map(|(_, list)| list).collect()
        };
        drained
            .into_iter()
            .filter_map(|tx| tx.send(Err(PendingError::Reset)).ok())
            .count()
    }

    /// Number of live waiters for `key`.
    pub fn pending(&self, key: &K) -> usize {
        let map = self.waiters.lock().expect("pending registry poisoned");
        map.get(key)
            .map_or(0, |list| list.iter().filter(|tx| !tx.is_closed()).count())
    }

    fn settle(&self, key: &K, outcome: impl Fn() -> Result<V, PendingError>) -> usize {
        let list = {
            let mut map = self.waiters.lock().expect("pending registry poisoned");
            map.remove(key).unwrap_or_default()
        };
        list.into_iter()
            .filter_map(|tx| tx.send(outcome()).ok())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_every_waiter_once() {
        let registry: PendingRegistry<String, u32> = PendingRegistry::new();
        let a = registry.wait("index.md".into(), DEFAULT_WAIT_TIMEOUT);
        let b = registry.wait("index.md".into(), DEFAULT_WAIT_TIMEOUT);
        assert_eq!(registry.pending(&"index.md".to_string()), 2);

        assert_eq!(registry.resolve(&"index.md".to_string(), 7), 2);
        assert_eq!(a.await, Ok(7));
        assert_eq!(b.await, Ok(7));
        assert_eq!(registry.resolve(&"index.md".to_string(), 8), 0);
    }

    #[tokio::test]
    async fn cancel_rejects_only_that_key() {
        let registry: PendingRegistry<&'static str, u32> = PendingRegistry::new();
        let cancelled = registry.wait("a.md", DEFAULT_WAIT_TIMEOUT);
        let kept = registry.wait("b.md", DEFAULT_WAIT_TIMEOUT);

        registry.cancel(&"a.md", "navigation cancelled");
        assert_eq!(
            cancelled.await,
            Err(PendingError::Cancelled("navigation cancelled".into()))
        );
        registry.resolve(&"b.md", 1);
        assert_eq!(kept.await, Ok(1));
    }

    #[tokio::test]
    async fn timeout_rejects_only_the_waiter() {
        let registry: PendingRegistry<&'static str, u32> = PendingRegistry::new();
        let short = registry.wait("a.md", Duration::from_millis(10));
        let long = registry.wait("a.md", DEFAULT_WAIT_TIMEOUT);

        assert_eq!(short.await, Err(PendingError::Timeout(Duration::from_millis(10))));
        assert_eq!(registry.pending(&"a.md"), 1);
        registry.resolve(&"a.md", 3);
        assert_eq!(long.await, Ok(3));
    }

    #[tokio::test]
    async fn reset_rejects_everything() {
        let registry: PendingRegistry<&'static str, u32> = PendingRegistry::new();
        let a = registry.wait("a.md", DEFAULT_WAIT_TIMEOUT);
        let b = registry.wait("b.md", DEFAULT_WAIT_TIMEOUT);
        assert_eq!(registry.reset(), 2);
        assert_eq!(a.await, Err(PendingError::Reset));
        assert_eq!(b.await, Err(PendingError::Reset));
    }
}

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// A set of currently-held string keys, giving exclusive, refuse-don't-wait
/// access per key: a caller that finds its key already held does not run its
/// future at all and gets nothing back.
///
/// Insertion precedes invocation of the guarded future so a task can't
/// reentrantly reacquire its own key; the key is removed when the future
/// completes, regardless of whether it resolves, errors, or is dropped
/// before completion.
#[derive(Debug, Default)]
pub struct KeyedLock {
    held: Mutex<HashSet<String>>,
}

impl KeyedLock {
    pub fn new() -> Self {
        Self {
            held: Mutex::new(HashSet::new()),
        }
    }

    /// Attempts to acquire `key` and run `run`. Returns `None` without
    /// running `run` if `key` is already held; otherwise returns the
    /// future's output wrapped in `Some`.
    pub async fn try_acquire<F, Fut, T>(self: &Arc<Self>, key: &str, run: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        {
            let mut held = self.held.lock().unwrap();
            if held.contains(key) {
                return None;
            }
            held.insert(key.to_string());
        }

        let _guard = ReleaseGuard {
            lock: self.clone(),
            key: key.to_string(),
        };
        Some(run().await)
    }
}

struct ReleaseGuard {
    lock: Arc<KeyedLock>,
    key: String,
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.lock.held.lock().unwrap().remove(&self.key);
    }
}

/// Keyed single-flight coalescing (§4.4): concurrent callers for the same
/// key share one in-flight computation's result rather than each running
/// their own. Unlike `KeyedLock`, a latecomer still gets an answer — it
/// just waits for the leader's instead of repeating the work.
pub struct SingleFlight<T> {
    inflight: Mutex<HashMap<String, broadcast::Sender<T>>>,
}

impl<T> std::fmt::Debug for SingleFlight<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleFlight").finish_non_exhaustive()
    }
}

impl<T: Clone + Send + 'static> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> SingleFlight<T> {
    pub fn new() -> Self {
        Self {
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Runs `run` for `key`, or if another caller is already running it for
    /// the same key, waits for and clones that caller's result instead.
    pub async fn run<F, Fut>(&self, key: &str, run: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut existing = {
            let mut inflight = self.inflight.lock().unwrap();
            match inflight.get(key) {
                Some(tx) => Some(tx.subscribe()),
                None => {
                    let (tx, _rx) = broadcast::channel(1);
                    inflight.insert(key.to_string(), tx);
                    None
                }
            }
        };

        if let Some(rx) = existing.as_mut() {
            return rx
                .recv()
                .await
                .expect("single-flight leader always sends before dropping its sender");
        }

        let result = run().await;

        let mut inflight = self.inflight.lock().unwrap();
        if let Some(tx) = inflight.remove(key) {
            let _ = tx.send(result.clone());
        }
        drop(inflight);

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn second_concurrent_acquire_is_refused() {
        let lock = Arc::new(KeyedLock::new());
        let entered = Arc::new(AtomicUsize::new(0));

        let lock2 = lock.clone();
        let entered2 = entered.clone();
        let first = tokio::spawn(async move {
            lock2
                .try_acquire("k", || async move {
                    entered2.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                })
                .await
        });

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let second = lock.try_acquire("k", || async { entered.fetch_add(1, Ordering::SeqCst) }).await;
        assert!(second.is_none());

        first.await.unwrap();
        assert_eq!(entered.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn key_is_released_after_completion() {
        let lock = Arc::new(KeyedLock::new());
        lock.try_acquire("k", || async {}).await;
        let second = lock.try_acquire("k", || async { 42 }).await;
        assert_eq!(second, Some(42));
    }

    #[tokio::test]
    async fn different_keys_do_not_contend() {
        let lock = Arc::new(KeyedLock::new());
        let a = lock.try_acquire("a", || async { 1 });
        let b = lock.try_acquire("b", || async { 2 });
        let (a, b) = tokio::join!(a, b);
        assert_eq!(a, Some(1));
        assert_eq!(b, Some(2));
    }

    #[tokio::test]
    async fn single_flight_latecomer_shares_leaders_result_without_rerunning() {
        let flight = Arc::new(SingleFlight::<u32>::new());
        let entered = Arc::new(AtomicUsize::new(0));

        let flight2 = flight.clone();
        let entered2 = entered.clone();
        let leader = tokio::spawn(async move {
            flight2
                .run("k", || async move {
                    entered2.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                    7
                })
                .await
        });

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let latecomer = flight
            .run("k", || async {
                entered.fetch_add(1, Ordering::SeqCst);
                99
            })
            .await;

        assert_eq!(latecomer, 7);
        assert_eq!(leader.await.unwrap(), 7);
        assert_eq!(entered.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn single_flight_key_is_free_again_after_completion() {
        let flight = Arc::new(SingleFlight::<u32>::new());
        assert_eq!(flight.run("k", || async { 1 }).await, 1);
        assert_eq!(flight.run("k", || async { 2 }).await, 2);
    }
}

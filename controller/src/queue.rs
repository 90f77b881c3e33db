//! A rate-limited, deduplicating FIFO work queue, modeled on the client-go `workqueue` package
//! that every Kubernetes controller builds on, rewritten on top of `tokio` primitives instead of
//! condition variables. See [`crate::util::Error`] for how `sync` failures feed back in.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    hash::Hash,
    sync::{Arc, Mutex},
};
use tokio::sync::Notify;
use tokio::time::Duration;

const BASE_DELAY: Duration = Duration::from_millis(5);
const MAX_DELAY: Duration = Duration::from_secs(1000);

struct Inner<K> {
    /// FIFO of keys ready to be handed out by `get`.
    queue: VecDeque<K>,
    /// Keys that are enqueued, or are in-flight and need another pass once `done` is called.
    dirty: HashSet<K>,
    /// Keys currently handed out to a worker and not yet `done`.
    processing: HashSet<K>,
    shutting_down: bool,
}

/// Per-key exponential backoff, reset by [`WorkQueue::forget`].
struct RateLimiter<K> {
    attempts: HashMap<K, u32>,
}

impl<K: Eq + Hash> RateLimiter<K> {
    fn delay(&mut self, key: &K) -> Duration
    where
        K: Clone,
    {
        let attempts = self.attempts.entry(key.clone()).or_insert(0);
        let exp = *attempts;
        *attempts += 1;
        let millis = BASE_DELAY.as_millis().saturating_mul(1u128 << exp.min(32));
        Duration::from_millis(millis.min(MAX_DELAY.as_millis()) as u64)
    }

    fn forget(&mut self, key: &K) {
        self.attempts.remove(key);
    }
}

/// A rate-limited, deduplicating work queue keyed by `K` (in this crate, always the
/// `<namespace>/<name>` reconciliation key).
pub struct WorkQueue<K> {
    inner: Mutex<Inner<K>>,
    notify: Notify,
    limiter: Mutex<RateLimiter<K>>,
}

impl<K> WorkQueue<K>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
{
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                queue: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                shutting_down: false,
            }),
            notify: Notify::new(),
            limiter: Mutex::new(RateLimiter {
                attempts: HashMap::new(),
            }),
        })
    }

    /// Idempotent enqueue: a key already queued or in-flight is not duplicated, only marked
    /// dirty so it is reprocessed once the in-flight run completes.
    pub fn add(&self, key: K) {
        let mut inner = self.inner.lock().unwrap();
        if inner.shutting_down {
            return;
        }
        if !inner.dirty.insert(key.clone()) {
            return;
        }
        if inner.processing.contains(&key) {
            return;
        }
        inner.queue.push_back(key);
        drop(inner);
        self.notify.notify_one();
    }

    /// Same as [`Self::add`], but delayed by this key's current backoff. The delay elapsing
    /// calls `add` again, so all the same deduplication rules apply at insertion time, not at
    /// the moment `add_rate_limited` is called.
    pub fn add_rate_limited(self: &Arc<Self>, key: K) {
        let delay = self.limiter.lock().unwrap().delay(&key);
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.add(key);
        });
    }

    /// Resets the backoff for `key`. Call after a successful `sync`.
    pub fn forget(&self, key: &K) {
        self.limiter.lock().unwrap().forget(key);
    }

    /// Awaits the next key to process, or `None` once the queue has been shut down and drained.
    /// Marks the key in-flight; no two concurrent `get` callers ever receive the same key until
    /// the first one calls `done`.
    pub async fn get(&self) -> Option<K> {
        loop {
            {
                let mut inner = self.inner.lock().unwrap();
                if let Some(key) = inner.queue.pop_front() {
                    inner.dirty.remove(&key);
                    inner.processing.insert(key.clone());
                    return Some(key);
                }
                if inner.shutting_down {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Releases the in-flight mark on `key`. If the key was re-added while processing, it is
    /// immediately re-enqueued for another pass.
    pub fn done(&self, key: &K) {
        let mut inner = self.inner.lock().unwrap();
        inner.processing.remove(key);
        if inner.dirty.contains(key) {
            inner.queue.push_back(key.clone());
            drop(inner);
            self.notify.notify_one();
        }
    }

    /// Wakes every pending and future `get` call with `None` once the queue drains. Further
    /// `add` calls become no-ops.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.shutting_down = true;
        drop(inner);
        self.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[tokio::test]
    async fn add_then_get_roundtrip() {
        let q: Arc<WorkQueue<String>> = WorkQueue::new();
        q.add("a/b".to_string());
        let key = q.get().await.unwrap();
        assert_eq!(key, "a/b");
        q.done(&key);
    }

    #[tokio::test]
    async fn duplicate_adds_collapse_to_one_get() {
        let q: Arc<WorkQueue<String>> = WorkQueue::new();
        q.add("a/b".to_string());
        q.add("a/b".to_string());
        q.add("a/b".to_string());
        let key = q.get().await.unwrap();
        q.done(&key);

        // No second item should be ready: the duplicates collapsed into the in-flight run.
        let res = tokio::time::timeout(Duration::from_millis(20), q.get()).await;
        assert!(res.is_err(), "queue should have no more pending keys");
    }

    #[tokio::test]
    async fn add_while_processing_requeues_exactly_once_after_done() {
        let q: Arc<WorkQueue<String>> = WorkQueue::new();
        q.add("a/b".to_string());
        let key = q.get().await.unwrap();

        // More events arrive while "a/b" is in flight.
        q.add("a/b".to_string());
        q.add("a/b".to_string());
        q.add("a/b".to_string());

        q.done(&key);

        // Exactly one more run is scheduled.
        let key2 = tokio::time::timeout(Duration::from_millis(50), q.get())
            .await
            .expect("should be requeued")
            .unwrap();
        assert_eq!(key2, "a/b");
        q.done(&key2);

        let res = tokio::time::timeout(Duration::from_millis(20), q.get()).await;
        assert!(res.is_err(), "only one extra run should have been scheduled");
    }

    #[tokio::test]
    async fn two_workers_never_see_the_same_key() {
        let q: Arc<WorkQueue<String>> = WorkQueue::new();
        q.add("only".to_string());
        let key = q.get().await.unwrap();
        let res = tokio::time::timeout(Duration::from_millis(20), q.get()).await;
        assert!(res.is_err());
        q.done(&key);
    }

    #[tokio::test]
    async fn rate_limited_add_is_delayed_and_backs_off_exponentially() {
        let q: Arc<WorkQueue<String>> = WorkQueue::new();
        let start = Instant::now();
        q.add_rate_limited("a/b".to_string());
        let key = q.get().await.unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= BASE_DELAY, "first attempt should wait ~base delay");
        q.done(&key);
        q.forget(&key); // no-op here, but exercises the API used after a successful sync
    }

    #[tokio::test]
    async fn forget_resets_backoff() {
        let q: Arc<WorkQueue<String>> = WorkQueue::new();
        {
            let mut limiter = q.limiter.lock().unwrap();
            limiter.attempts.insert("a/b".to_string(), 10);
        }
        q.forget(&"a/b".to_string());
        let delay = q.limiter.lock().unwrap().delay(&"a/b".to_string());
        assert_eq!(delay, BASE_DELAY);
    }

    #[tokio::test]
    async fn shutdown_wakes_pending_get_with_none() {
        let q: Arc<WorkQueue<String>> = WorkQueue::new();
        let q2 = Arc::clone(&q);
        let handle = tokio::spawn(async move { q2.get().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        q.shutdown();
        let result = tokio::time::timeout(Duration::from_millis(100), handle)
            .await
            .expect("get should resolve after shutdown")
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn add_after_shutdown_is_a_noop() {
        let q: Arc<WorkQueue<String>> = WorkQueue::new();
        q.shutdown();
        q.add("a/b".to_string());
        assert!(q.get().await.is_none());
    }
}

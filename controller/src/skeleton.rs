//! The shared scaffolding every reconciler in this crate is built on: a reflector-backed cache,
//! fed into the hand-rolled [`WorkQueue`], drained by a fixed worker pool. `kube`'s own
//! `Controller` type folds these same pieces together internally; this module keeps them
//! separate so the queue's semantics (§4.1/§4.2 of the design) stay directly testable without a
//! live API server.

use futures::{Stream, StreamExt};
use kube::{
    Resource, ResourceExt,
    api::Api,
    runtime::{
        reflector::{self, Store},
        watcher,
    },
};
use std::{fmt::Debug, hash::Hash, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

use crate::queue::WorkQueue;
use crate::util::Error;

const CACHE_SYNC_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds the reflector for kind `K` and waits for the initial list to complete (bounded by
/// [`CACHE_SYNC_TIMEOUT`] — step 1 of §4.2), returning the read-only cache store plus the live
/// object stream so callers can turn subsequent events into reconciliation keys.
pub async fn prewarm<K>(
    api: Api<K>,
    config: watcher::Config,
) -> Result<(Store<K>, impl Stream<Item = Result<K, watcher::Error>>), Error>
where
    K: Resource + Clone + Debug + Send + Sync + 'static,
    K::DynamicType: Default + Eq + Hash + Clone,
{
    let (reader, writer) = reflector::store::<K>();
    let stream = tokio::time::timeout(
        CACHE_SYNC_TIMEOUT,
        reflector::prewarmed_reflector(reader.clone(), writer, watcher(api, config)),
    )
    .await
    .map_err(|_| Error::UserInput("cache failed to sync within timeout".into()))?;
    Ok((reader, stream))
}

/// `<namespace>/<name>` reconciliation key, per §4.2.
pub fn object_key<K: Resource>(obj: &K) -> String {
    match obj.namespace() {
        Some(ns) => format!("{ns}/{}", obj.name_any()),
        None => obj.name_any(),
    }
}

/// Owns the work queue and worker pool shared by every reconciler. Construct one per reconciler
/// binary/task; `feed` can be called multiple times (e.g. once for the primary kind, once for an
/// owned secondary kind) before `run`.
pub struct Skeleton {
    queue: Arc<WorkQueue<String>>,
    workers: usize,
}

impl Skeleton {
    pub fn new(workers: usize) -> Self {
        Self {
            queue: WorkQueue::new(),
            workers,
        }
    }

    /// Forwards every key computed from `stream` into the queue. Spawned as an independent task
    /// so multiple sources (e.g. the owning kind and an owned kind) can feed the same queue.
    /// `key_of` returns `None` to skip an object entirely — used when a secondary/owned kind's
    /// event should only sometimes translate into a key of the primary kind (for example, a
    /// `GameServer` not yet labeled with its owning collection).
    pub fn feed<K>(
        &self,
        mut stream: impl Stream<Item = Result<K, watcher::Error>> + Unpin + Send + 'static,
        key_of: impl Fn(&K) -> Option<String> + Send + 'static,
    ) where
        K: Send + Sync + 'static,
    {
        let queue = Arc::clone(&self.queue);
        tokio::spawn(async move {
            while let Some(next) = stream.next().await {
                match next {
                    Ok(obj) => {
                        if let Some(key) = key_of(&obj) {
                            queue.add(key);
                        }
                    }
                    Err(e) => eprintln!("watch error: {e}"),
                }
            }
        });
    }

    /// Runs the worker pool per §4.2 step 3: `get`; invoke `sync`; on error
    /// `add_rate_limited` + log; on success `forget`; always `done`. Returns once `shutdown` is
    /// cancelled and every worker has finished its in-flight key.
    pub async fn run<H, Fut>(&self, shutdown: CancellationToken, sync: H)
    where
        H: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<(), Error>> + Send,
    {
        let sync = Arc::new(sync);
        let mut handles = Vec::with_capacity(self.workers);
        for _ in 0..self.workers {
            let queue = Arc::clone(&self.queue);
            let sync = Arc::clone(&sync);
            handles.push(tokio::spawn(async move {
                while let Some(key) = queue.get().await {
                    match sync(key.clone()).await {
                        Ok(()) => queue.forget(&key),
                        Err(e) => {
                            eprintln!("reconcile {key} failed: {e}");
                            queue.add_rate_limited(key.clone());
                        }
                    }
                    queue.done(&key);
                }
            }));
        }
        shutdown.cancelled().await;
        self.queue.shutdown();
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Directly enqueues a key. Used by reconcilers that want to force an immediate re-run (for
    /// example the autoscaler's fixed polling interval) without waiting on a watch event.
    pub fn nudge(&self, key: String) {
        self.queue.add(key);
    }
}

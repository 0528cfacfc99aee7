//! Backend pool management.
//!
//! # Responsibilities
//! - Own the ordered, mutable collection of backends
//! - Hand out copy-on-read snapshots so callers never observe a torn write
//! - Batched add and two-phase graceful removal
//!
//! # Design Decisions
//! - One reader/writer lock guards membership only; each backend guards its
//!   own health state, so health updates never contend with snapshots
//! - The lock is never held across an await point
//! - Removal marks backends dead immediately, then waits out the longest
//!   drain period of the batch before physically excising them

use std::sync::{Arc, RwLock};
use url::Url;

use crate::load_balancer::backend::Backend;

/// Thread-safe registry of upstream backends.
#[derive(Debug, Default)]
pub struct BackendPool {
    backends: RwLock<Vec<Arc<Backend>>>,
}

impl BackendPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// An independently iterable copy of the current backend list.
    ///
    /// The backing storage is never exposed; a snapshot reflects either the
    /// pre- or post-mutation set of any concurrent `add`/`remove`, never a
    /// partial splice.
    pub fn snapshot(&self) -> Vec<Arc<Backend>> {
        self.backends
            .read()
            .expect("backend pool lock poisoned")
            .clone()
    }

    /// Append a batch of backends in a single write-lock critical section.
    ///
    /// A URL already present in the pool is skipped, keeping every address
    /// unique within the pool.
    pub fn add(&self, new: Vec<Arc<Backend>>) {
        let mut backends = self.backends.write().expect("backend pool lock poisoned");
        for backend in new {
            if backends.iter().any(|b| b.url == backend.url) {
                tracing::warn!(url = %backend.url, "Backend already in pool, skipping");
                continue;
            }
            tracing::info!(url = %backend.url, timeout = ?backend.timeout, "Backend added to pool");
            backends.push(backend);
        }
    }

    /// Two-phase graceful removal.
    ///
    /// Phase 1 marks every matching backend dead under the write lock so the
    /// selector stops routing to it at once. Phase 2 sleeps for the longest
    /// drain period among the batch (max, not sum), then re-acquires the lock
    /// and excises the entries. The sleep blocks the caller of `remove`,
    /// never request-serving tasks; in-flight requests can still look the
    /// backends up until phase 2 completes.
    pub async fn remove(&self, urls: &[Url]) {
        let max_drain = {
            let backends = self.backends.write().expect("backend pool lock poisoned");
            let mut max_drain = None;
            for backend in backends.iter().filter(|b| urls.contains(&b.url)) {
                backend.set_alive(false);
                tracing::info!(url = %backend.url, drain = ?backend.timeout, "Backend draining");
                max_drain = Some(max_drain.map_or(backend.timeout, |d: std::time::Duration| {
                    d.max(backend.timeout)
                }));
            }
            max_drain
        };

        let Some(max_drain) = max_drain else {
            return;
        };

        tokio::time::sleep(max_drain).await;

        let mut backends = self.backends.write().expect("backend pool lock poisoned");
        backends.retain(|b| {
            let keep = !urls.contains(&b.url);
            if !keep {
                tracing::info!(url = %b.url, "Backend removed from pool");
            }
            keep
        });
    }

    /// Direct lookup by URL. Still finds backends that are draining.
    pub fn lookup(&self, url: &Url) -> Option<Arc<Backend>> {
        self.backends
            .read()
            .expect("backend pool lock poisoned")
            .iter()
            .find(|b| b.url == *url)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.backends
            .read()
            .expect("backend pool lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

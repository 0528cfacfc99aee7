//! Hot reload coordination.
//!
//! # Responsibilities
//! - Watch the configuration file for changes
//! - Debounce bursts of edits into a single apply
//! - Diff backend sets and drive pool add/remove without churn
//!
//! # Design Decisions
//! - A reload failure keeps the previous snapshot in force; a running pool
//!   is never torn down by a bad edit
//! - The drain sleep inside `BackendPool::remove` blocks only this
//!   coordinator's apply step, never request-serving tasks
//! - Stopping consumes the handle, so the watch and the debounce timer are
//!   torn down exactly once

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use url::Url;

use crate::config::loader::load_config;
use crate::config::schema::{BackendConfig, Config};
use crate::load_balancer::{Backend, BackendPool};

/// How long after the last change notification an apply fires. Repeated
/// notifications inside the window re-arm the timer instead of queuing.
const DEBOUNCE_WINDOW: Duration = Duration::from_secs(30);

/// Watches the config source and applies backend diffs to the pool.
pub struct ReloadCoordinator {
    path: PathBuf,
    pool: Arc<BackendPool>,
    last_applied: Config,
    debounce: Duration,
}

/// Running reload coordinator. Dropping or stopping it tears down the
/// file watch; no callbacks are delivered afterward.
pub struct ReloadHandle {
    watcher: RecommendedWatcher,
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ReloadHandle {
    /// Stop the watch and the debounce loop. Consuming `self` makes stop
    /// idempotent by construction.
    pub async fn stop(self) {
        drop(self.watcher);
        let _ = self.stop_tx.send(());
        let _ = self.task.await;
        tracing::info!("Reload coordinator stopped");
    }
}

impl ReloadCoordinator {
    pub fn new(path: PathBuf, pool: Arc<BackendPool>, initial: Config) -> Self {
        Self {
            path,
            pool,
            last_applied: initial,
            debounce: DEBOUNCE_WINDOW,
        }
    }

    /// Override the debounce window. Integration tests shrink it.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Start the file watch and the debounce loop.
    pub fn start(self) -> Result<ReloadHandle, notify::Error> {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        let _ = event_tx.send(());
                    }
                }
                Err(e) => tracing::error!(error = %e, "Config watch error"),
            },
            notify::Config::default(),
        )?;
        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;
        tracing::info!(path = ?self.path, "Config watcher started");

        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(self.run(event_rx, stop_rx));

        Ok(ReloadHandle {
            watcher,
            stop_tx,
            task,
        })
    }

    /// Debounce state machine: Idle → PendingDebounce → Applying → Idle.
    async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<()>,
        mut stop: oneshot::Receiver<()>,
    ) {
        let mut deadline: Option<tokio::time::Instant> = None;

        loop {
            let armed = deadline;
            let timer = async move {
                match armed {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                _ = &mut stop => break,
                event = events.recv() => {
                    match event {
                        Some(()) => {
                            tracing::debug!("Config change detected, debouncing");
                            deadline = Some(tokio::time::Instant::now() + self.debounce);
                        }
                        None => break,
                    }
                }
                _ = timer => {
                    deadline = None;
                    self.apply().await;
                }
            }
        }
    }

    /// Load the new snapshot and apply the backend diff to the pool.
    async fn apply(&mut self) {
        let new = match load_config(&self.path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(error = %e, "Reload failed, keeping current configuration");
                return;
            }
        };

        let (added, removed) = diff_backends(&self.last_applied.backends, &new.backends);
        if added.is_empty() && removed.is_empty() {
            tracing::debug!("Reload produced no backend changes");
            self.last_applied = new;
            return;
        }

        tracing::info!(added = added.len(), removed = removed.len(), "Applying backend changes");

        if !added.is_empty() {
            let backends = added
                .iter()
                .filter_map(|config| match Backend::from_config(config) {
                    Ok(backend) => Some(Arc::new(backend)),
                    Err(e) => {
                        tracing::warn!(url = %config.url, error = %e, "Skipping malformed backend entry");
                        None
                    }
                })
                .collect();
            self.pool.add(backends);
        }

        if !removed.is_empty() {
            // blocks this task for the longest drain period of the batch
            self.pool.remove(&removed).await;
        }

        self.last_applied = new;
    }
}

/// Symmetric difference of two backend lists by URL.
///
/// Returns the entries to add (present now, absent before) and the URLs to
/// remove (present before, absent now). Unparseable URLs on the removal
/// side are skipped rather than aborting the whole diff.
pub fn diff_backends(
    old: &[BackendConfig],
    new: &[BackendConfig],
) -> (Vec<BackendConfig>, Vec<Url>) {
    let old_urls: Vec<&str> = old.iter().map(|b| b.url.as_str()).collect();
    let new_urls: Vec<&str> = new.iter().map(|b| b.url.as_str()).collect();

    let added = new
        .iter()
        .filter(|b| !old_urls.contains(&b.url.as_str()))
        .cloned()
        .collect();

    let removed = old
        .iter()
        .filter(|b| !new_urls.contains(&b.url.as_str()))
        .filter_map(|b| match Url::parse(&b.url) {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!(url = %b.url, error = %e, "Skipping unparseable backend url in diff");
                None
            }
        })
        .collect();

    (added, removed)
}

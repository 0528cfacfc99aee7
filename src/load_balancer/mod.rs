//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Request arrives
//!     → pool.rs (copy-on-read snapshot of the backend list)
//!     → Balancer::select picks one live backend:
//!         - round_robin.rs (atomic ticket counter, skips dead slots)
//!     → backend.rs (per-backend timeout, health counters)
//! ```
//!
//! # Design Decisions
//! - Strategies sit behind the single-method [`Balancer`] trait and are
//!   built through a name-keyed factory; adding a strategy never touches
//!   the proxy layer
//! - The pool lock guards membership only; each backend's liveness and
//!   counters live behind the backend's own lock
//! - Selection operates on a snapshot and may act on a slightly stale view
//!   of liveness; the staleness window is bounded by snapshot cost

use std::sync::Arc;
use thiserror::Error;

pub mod backend;
pub mod pool;
pub mod round_robin;

pub use backend::Backend;
pub use pool::BackendPool;
pub use round_robin::RoundRobin;

/// Failure modes of backend selection.
#[derive(Debug, Error)]
pub enum SelectionError {
    /// The snapshot was empty or every backend is currently dead.
    #[error("no backend available")]
    NoBackendAvailable,

    /// A strategy-internal fault, distinct from "all backends unhealthy".
    #[error("selection failed: {0}")]
    Internal(String),
}

/// Capability interface a selection strategy implements.
pub trait Balancer: Send + Sync {
    /// Pick one live backend out of a pool snapshot.
    fn select(&self, backends: &[Arc<Backend>]) -> Result<Arc<Backend>, SelectionError>;
}

/// Error returned when the factory is asked for a strategy it cannot build.
#[derive(Debug, Error)]
#[error("unknown load balancing strategy: {0}")]
pub struct UnknownStrategy(pub String);

/// Name-keyed strategy factory.
///
/// New strategies register a constructor arm here; callers of
/// [`Balancer::select`] never change.
pub fn balancer_for(strategy: &str) -> Result<Box<dyn Balancer>, UnknownStrategy> {
    match strategy {
        "round_robin" => Ok(Box::new(RoundRobin::new())),
        other => Err(UnknownStrategy(other.to_string())),
    }
}

/// Whether the factory can build the named strategy. Used by config
/// validation so an unknown name is rejected before it reaches the core.
pub fn is_known_strategy(strategy: &str) -> bool {
    balancer_for(strategy).is_ok()
}

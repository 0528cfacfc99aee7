//! Round-robin selection strategy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::load_balancer::backend::Backend;
use crate::load_balancer::{Balancer, SelectionError};

/// Round-robin selector.
///
/// A shared atomic ticket counter rotates through the snapshot without any
/// hot-path locking. Dead slots are skipped; when a live backend is found
/// past dead slots the counter is re-anchored at its index so the rotation
/// resumes from there.
#[derive(Debug, Default)]
pub struct RoundRobin {
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Balancer for RoundRobin {
    fn select(&self, backends: &[Arc<Backend>]) -> Result<Arc<Backend>, SelectionError> {
        if backends.is_empty() {
            return Err(SelectionError::NoBackendAvailable);
        }

        let len = backends.len();
        let start = self.counter.fetch_add(1, Ordering::Relaxed) % len;

        for i in 0..len {
            let idx = (start + i) % len;
            if backends[idx].is_alive() {
                if i != 0 {
                    // fetch_add hands out the pre-increment value, so the
                    // next ticket must land one past the slot served here.
                    self.counter.store(idx + 1, Ordering::Relaxed);
                }
                return Ok(backends[idx].clone());
            }
        }

        Err(SelectionError::NoBackendAvailable)
    }
}

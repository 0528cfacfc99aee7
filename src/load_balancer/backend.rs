//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single upstream target
//! - Track liveness plus consecutive success/failure counters
//! - Apply threshold hysteresis so a single flapping probe cannot flip state

use std::sync::Mutex;
use std::time::Duration;
use url::Url;

use crate::config::schema::BackendConfig;

/// Mutable health state, guarded by the backend's own lock so updates to
/// different backends never serialize against each other.
#[derive(Debug, Clone, Copy)]
struct HealthState {
    alive: bool,
    consecutive_successes: u8,
    consecutive_failures: u8,
}

/// A single upstream backend.
///
/// `url` and `timeout` are immutable after construction; only the health
/// state behind the lock ever changes. The timeout bounds forwarded requests
/// and also sizes the drain period when the backend is removed from the pool.
#[derive(Debug)]
pub struct Backend {
    pub url: Url,
    pub timeout: Duration,
    state: Mutex<HealthState>,
}

impl Backend {
    /// Create a new backend. Starts dead: a backend only receives traffic
    /// after accumulating enough consecutive successful probes.
    pub fn new(url: Url, timeout: Duration) -> Self {
        Self {
            url,
            timeout,
            state: Mutex::new(HealthState {
                alive: false,
                consecutive_successes: 0,
                consecutive_failures: 0,
            }),
        }
    }

    /// Build a backend from its config entry.
    pub fn from_config(config: &BackendConfig) -> Result<Self, url::ParseError> {
        let url = Url::parse(&config.url)?;
        Ok(Self::new(url, config.timeout()))
    }

    pub fn is_alive(&self) -> bool {
        self.state.lock().expect("backend state lock poisoned").alive
    }

    /// Force the liveness flag. Used by the pool when draining a backend out;
    /// normal transitions go through [`record_success`]/[`record_failure`].
    ///
    /// [`record_success`]: Backend::record_success
    /// [`record_failure`]: Backend::record_failure
    pub fn set_alive(&self, alive: bool) {
        self.state.lock().expect("backend state lock poisoned").alive = alive;
    }

    /// Report a successful probe or request.
    ///
    /// Increments the success run, zeroes the failure run, and flips the
    /// backend alive once the run reaches `threshold`, resetting both
    /// counters at the transition.
    pub fn record_success(&self, threshold: u8) {
        let mut state = self.state.lock().expect("backend state lock poisoned");
        state.consecutive_successes = state.consecutive_successes.saturating_add(1);
        state.consecutive_failures = 0;

        if state.consecutive_successes >= threshold {
            state.alive = true;
            state.consecutive_successes = 0;
            state.consecutive_failures = 0;
        }
    }

    /// Report a failed probe or request. Mirror image of [`record_success`].
    ///
    /// [`record_success`]: Backend::record_success
    pub fn record_failure(&self, threshold: u8) {
        let mut state = self.state.lock().expect("backend state lock poisoned");
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.consecutive_successes = 0;

        if state.consecutive_failures >= threshold {
            state.alive = false;
            state.consecutive_successes = 0;
            state.consecutive_failures = 0;
        }
    }

    #[cfg(test)]
    fn counters(&self) -> (u8, u8) {
        let state = self.state.lock().unwrap();
        (state.consecutive_successes, state.consecutive_failures)
    }
}

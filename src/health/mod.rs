//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active checks (active.rs):
//!     Periodic timer
//!     → one bounded-timeout probe task per backend, concurrently
//!     → Backend::record_success / record_failure
//!
//! Passive signal (http/proxy.rs):
//!     Transport failure on a forwarded request
//!     → Backend::record_failure
//! ```
//!
//! # Design Decisions
//! - Active and passive signals feed the same threshold counters, so a
//!   backend can flip dead from live traffic between probe ticks
//! - A slow probe on one backend never delays probing the others
//! - Stopping the checker cancels in-flight probes and waits for their
//!   tasks to unwind; no orphaned probes after shutdown

pub mod active;

pub use active::HealthChecker;

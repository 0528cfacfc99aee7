//! Lifecycle management.
//!
//! # Data Flow
//! ```text
//! SIGINT/SIGTERM (signals.rs)
//!     → Shutdown::trigger (shutdown.rs)
//!     → server stops accepting, drains in-flight requests
//!     → health checker cancels outstanding probes and unwinds
//!     → reload coordinator stops the watch and debounce timer
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;

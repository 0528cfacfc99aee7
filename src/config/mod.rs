//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, all errors collected)
//!     → Config (validated, immutable snapshot)
//!
//! On file change:
//!     watcher.rs debounces notifications
//!     → loader.rs loads the new snapshot
//!     → backend diff applied to the pool; everything else needs a restart
//! ```
//!
//! # Design Decisions
//! - A snapshot is immutable once loaded; the reload coordinator swaps
//!   whole snapshots, never patches one in place
//! - All sections carry defaults so a minimal config is valid
//! - A failed reload keeps the previous snapshot in force

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{BackendConfig, Config, HealthCheckConfig, RateLimiterConfig};
pub use watcher::{ReloadCoordinator, ReloadHandle};

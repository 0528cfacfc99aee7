//! HTTP front end.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (axum router, timeout + trace layers, limiter gate)
//!     → proxy.rs (select backend, forward, retry with failover)
//!     → synthesized 503/429/500 on the failure paths
//! ```

pub mod proxy;
pub mod server;

pub use server::HttpServer;

//! Shared configuration, error types, IDs, and metrics for FDQ crates.
//!
//! Architecture role:
//! - defines the engine configuration passed across layers
//! - provides common [`FdqError`] / [`Result`] contracts
//! - typed identifiers for fact/dimension keys
//! - hosts the Prometheus metrics registry
//!
//! Key modules:
//! - [`config`]
//! - [`error`]
//! - [`ids`]
//! - [`metrics`]

pub mod config;
pub mod error;
pub mod ids;
pub mod metrics;

pub use config::{EngineConfig, HourWindow, ZeroDenominatorPolicy};
pub use error::{FdqError, Result};
pub use ids::*;
pub use metrics::MetricsRegistry;

//! Execution layer: runs logical plans over an in-memory snapshot.
//!
//! Architecture role:
//! - task context carrying the engine configuration
//! - expression compilation/evaluation, including derived categorizations
//! - hash aggregate, left hash join, sort/limit operators
//! - RFM segmentation and correlation operators
//! - order filters and feature derivation applied at registration
//!
//! Key modules:
//! - [`executor`]
//! - [`expressions`]
//! - [`aggregate`]
//! - [`derive`]

pub mod aggregate;
pub mod context;
pub mod correlation;
pub mod derive;
pub mod executor;
pub mod expressions;
pub mod filter;
pub mod join;
pub mod scalar;
pub mod segment;
pub mod sort;

// Re-export only what you want at the crate root (no globs).
pub use context::{SharedTaskContext, TaskContext};
pub use derive::{enrich_customers, enrich_orders};
pub use executor::execute_plan;
pub use expressions::{compile_expr, evaluate_expr, PhysicalExpr};
pub use filter::OrderFilter;
pub use scalar::ScalarValue;

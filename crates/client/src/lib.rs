//! Embedded report engine facade and the `fdq` command line.
//!
//! [`Engine`] owns a session: the engine configuration, the report catalog,
//! the current table snapshot and the metrics registry.

mod session;

pub mod engine;
pub mod repl;

pub use engine::{Engine, PlanSource, ReportOutput};
pub use fdq_execution::OrderFilter;

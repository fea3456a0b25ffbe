//! Plan model for the report engine.
//!
//! Reports, views and rollups are all [`LogicalPlan`] values; nothing here
//! touches data.

pub mod explain;
pub mod expr;
pub mod logical_plan;
pub mod reports;
pub mod rollups;
pub mod views;

pub use explain::explain_logical;
pub use logical_plan::*;
pub use reports::{ReportCatalog, ReportCategory, ReportSpec, CORRELATION_COLUMNS};
pub use rollups::{rollup_names, rollup_plan};
pub use views::{is_view, view_plan, VIEW_NAMES};

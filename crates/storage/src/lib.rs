//! Table schemas, loaders, and the in-memory snapshot.
//!
//! Key modules:
//! - [`schema`]: canonical Arrow schemas for the fact, dimension, and rollup tables
//! - [`model`]: typed rows and their batch encoders
//! - [`catalog`]: JSON table catalog
//! - [`provider`]: format providers (csv, parquet) and schema conformance
//! - [`snapshot`]: registered tables plus referential checks

pub mod catalog;
pub mod csv_provider;
pub mod model;
pub mod parquet_provider;
pub mod provider;
pub mod schema;
pub mod snapshot;

pub use catalog::*;
pub use provider::*;
pub use snapshot::{MemTable, ReferenceCheck, Snapshot};

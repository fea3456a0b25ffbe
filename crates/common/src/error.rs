use thiserror::Error;

/// Canonical FDQ error taxonomy used across crates.
///
/// Classification guidance:
/// - [`FdqError::Planning`]: unknown report/view/table/column, invalid plan shape
/// - [`FdqError::Execution`]: runtime evaluation, decode, or data-shape failures
/// - [`FdqError::InvalidConfig`]: catalog/config/path contract violations
/// - [`FdqError::Unsupported`]: valid request for a shape the engine does not handle
/// - [`FdqError::Io`]: raw filesystem failures from std APIs
#[derive(Debug, Error)]
pub enum FdqError {
    /// Invalid or inconsistent configuration/catalog state.
    ///
    /// Examples:
    /// - missing table `uri`
    /// - malformed engine config JSON
    /// - unparsable CLI option values
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Report/plan resolution failures.
    ///
    /// Examples:
    /// - unknown report or view name
    /// - unknown column referenced by an expression
    /// - table not registered in the snapshot
    #[error("planning error: {0}")]
    Planning(String),

    /// Runtime execution failures after planning succeeded.
    ///
    /// Examples:
    /// - expression type mismatch at runtime
    /// - csv/parquet decode failures
    /// - output batch shape mismatches
    #[error("execution error: {0}")]
    Execution(String),

    /// Transparent std IO failures.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Valid request for a feature/shape not implemented.
    ///
    /// Examples:
    /// - table format other than csv/parquet
    /// - column type outside the supported scalar set
    #[error("unsupported: {0}")]
    Unsupported(String),
}

/// Standard FDQ result alias.
pub type Result<T> = std::result::Result<T, FdqError>;

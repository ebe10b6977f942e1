//! Error types for seisgate
//!
//! Provides a unified error type for all operations.
//!
//! ## Taxonomy
//! - Not-Found: legitimate absence, callers skip rather than abort
//! - Transient I/O: surfaced per item (fetcher) or per call (caches)
//! - Capacity: rejected before any work starts (413-class)
//! - Malformed record: aborts one index build / one file decode
//! - Configuration: fatal at startup

use std::sync::Arc;

use thiserror::Error;

/// Result type alias using SeisError
pub type Result<T> = std::result::Result<T, SeisError>;

/// Unified error type for seisgate operations
#[derive(Debug, Error)]
pub enum SeisError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    // -------------------------------------------------------------------------
    // Capacity Errors
    // -------------------------------------------------------------------------
    #[error("Too many {what}: found {found}, limit is {limit}")]
    CapacityExceeded {
        what: &'static str,
        found: u64,
        limit: u64,
    },

    #[error("No data matches the request")]
    NoData,

    // -------------------------------------------------------------------------
    // Record Errors
    // -------------------------------------------------------------------------
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    // -------------------------------------------------------------------------
    // Request Errors
    // -------------------------------------------------------------------------
    #[error("Invalid {field} pattern: {source}")]
    InvalidPattern {
        field: &'static str,
        #[source]
        source: regex::Error,
    },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Request cancelled")]
    Cancelled,

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Concurrency Errors
    // -------------------------------------------------------------------------
    /// A failure observed by a single-flight follower; the leader's error is shared.
    #[error("{0}")]
    Shared(Arc<SeisError>),
}

impl SeisError {
    /// True when the error means "this item legitimately has no data".
    pub fn is_not_found(&self) -> bool {
        match self {
            SeisError::NotFound(_) => true,
            SeisError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            SeisError::Shared(inner) => inner.is_not_found(),
            _ => false,
        }
    }

    /// The underlying error, looking through single-flight sharing
    pub fn root(&self) -> &SeisError {
        match self {
            SeisError::Shared(inner) => inner.root(),
            other => other,
        }
    }

    /// True for errors a client caused by asking for too much.
    pub fn is_capacity(&self) -> bool {
        match self {
            SeisError::CapacityExceeded { .. } => true,
            SeisError::Shared(inner) => inner.is_capacity(),
            _ => false,
        }
    }
}

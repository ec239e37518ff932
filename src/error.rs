//! Error types for the maktaba-search crate.
//!
//! All errors use stable string messages suitable for display to callers
//! and programmatic handling. Upstream failures are almost always caught
//! and degraded at the adapter boundary; only [`SearchError::InvalidQuery`]
//! and [`SearchError::IndexNotReady`] are allowed to fail a whole request.

use std::time::Duration;

/// Errors that can occur during hybrid search operations.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// The request was rejected before any retrieval began.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Invalid search configuration.
    #[error("config error: {0}")]
    Config(String),

    /// A vector collection the request needs has not been created yet.
    ///
    /// The one upstream condition that is surfaced to the caller instead
    /// of degrading: there is nothing meaningful to degrade to and the
    /// caller needs to know the index is missing, not empty.
    #[error("search index not ready: {0}")]
    IndexNotReady(String),

    /// An HTTP request to an upstream service failed.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Failed to parse an upstream response body.
    #[error("parse error: {0}")]
    Parse(String),

    /// An upstream call exceeded its timeout budget.
    #[error("{0} timed out after {1:?}")]
    Timeout(String, Duration),
}

/// Convenience type alias for maktaba-search results.
pub type Result<T> = std::result::Result<T, SearchError>;

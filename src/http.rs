//! Shared HTTP client construction for upstream service calls.
//!
//! All four upstream services (vector, lexical, embedding, completion)
//! speak JSON over HTTP; each client owns its timeout so a slow service
//! cannot stall a branch past its budget.

use crate::error::SearchError;
use std::time::Duration;

/// Build a [`reqwest::Client`] with the given request timeout.
///
/// # Errors
///
/// Returns [`SearchError::Http`] if the client cannot be constructed.
pub fn build_client(timeout_secs: u64) -> Result<reqwest::Client, SearchError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| SearchError::Http(format!("failed to build HTTP client: {e}")))
}

/// Build a client with no request timeout.
///
/// Used by the completion client, where each call carries its own budget
/// enforced with [`tokio::time::timeout`] so expiry is distinguishable
/// from transport errors.
pub fn build_untimed_client() -> Result<reqwest::Client, SearchError> {
    reqwest::Client::builder()
        .build()
        .map_err(|e| SearchError::Http(format!("failed to build HTTP client: {e}")))
}

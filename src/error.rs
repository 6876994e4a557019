//! Error types for the request ranking cache

use std::time::Duration;

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the request ranking cache
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    // =========================================================================
    // Write Path Errors
    // =========================================================================
    /// Canonical serialization of a request failed
    #[error("Hashing failed: {0}")]
    HashingFailed(String),

    /// Backend store failure (connection, I/O, poisoned state)
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Optimistic transaction kept conflicting until the retry budget ran out
    #[error("Maximum retry reached for transaction on {key} after {attempts} attempts")]
    TransactionConflictExceeded { key: String, attempts: usize },

    // =========================================================================
    // Read Path Errors
    // =========================================================================
    /// Point read found nothing
    #[error("Key requested not found: {0}")]
    CacheKeyNotFound(String),

    /// No counter has been recorded yet
    #[error("No metric for top request was found")]
    NoCountersFound,

    /// A counter exists but its payload does not
    #[error("No data found for counter {hash}")]
    NoDataFound { hash: String },

    /// The payload exists but cannot be decoded into a request
    #[error("No request found in payload of {hash}: {reason}")]
    NoRequestFound { hash: String, reason: String },

    /// A deadline elapsed before the operation finished
    #[error("{operation} timed out after {duration:?}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    // =========================================================================
    // Ambient Errors
    // =========================================================================
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Metrics registration or encoding error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for the three ranking outcomes that describe store content rather than
    /// a failure to reach the store.
    pub fn is_ranking_outcome(&self) -> bool {
        matches!(
            self,
            Error::NoCountersFound | Error::NoDataFound { .. } | Error::NoRequestFound { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranking_outcomes_are_distinct() {
        assert!(Error::NoCountersFound.is_ranking_outcome());
        assert!(Error::NoDataFound { hash: "ab".into() }.is_ranking_outcome());
        assert!(Error::NoRequestFound {
            hash: "ab".into(),
            reason: "eof".into()
        }
        .is_ranking_outcome());
        assert!(!Error::StoreUnavailable("down".into()).is_ranking_outcome());
    }

    #[test]
    fn test_conflict_message() {
        let err = Error::TransactionConflictExceeded {
            key: "counters".into(),
            attempts: 3,
        };
        assert_eq!(
            err.to_string(),
            "Maximum retry reached for transaction on counters after 3 attempts"
        );
    }
}

//! crates/commitment_core/src/error.rs
//!
//! The error taxonomy for the commitment engine.

use chrono::{DateTime, Utc};

use crate::ports::PortError;

#[derive(Debug, thiserror::Error)]
pub enum CommitmentError {
    /// One or more weekday tokens could not be mapped to a weekday. Carries
    /// exactly the offending tokens as supplied.
    #[error("invalid days: {}", tokens.join(", "))]
    InvalidDays { tokens: Vec<String> },

    /// The commitment does not exist or belongs to another user.
    #[error("commitment not found")]
    NotFound,

    /// A computed time window was degenerate. Indicates a window
    /// calculator defect, fatal to the calling operation.
    #[error("invalid date range: start {start} is not before end {end}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// The storage layer failed. Callers must not assume partial writes
    /// occurred.
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<PortError> for CommitmentError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound(_) => CommitmentError::NotFound,
            PortError::Unexpected(message) => CommitmentError::Storage(message),
        }
    }
}

//! Error types for Bactic

use thiserror::Error;

/// Result type alias for Bactic operations
pub type Result<T> = std::result::Result<T, BacticError>;

/// Stored codes that do not decode to a known value
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BacticError {
    #[error("Invalid division: {0}")]
    InvalidDivision(String),

    #[error("Invalid season: {0}")]
    InvalidSeason(String),

    #[error("Invalid event type: {0}")]
    InvalidEventType(String),
}

// In crates/core-types/src/error.rs

use thiserror::Error;

/// The error taxonomy shared by every crate in the workspace.
///
/// Collaborator crates (market data, execution) keep their own error enums
/// and convert into this one at the service boundary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Insufficient data: required {required}, available {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("Length mismatch: {0}")]
    LengthMismatch(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Execution failed: {0}")]
    Execution(String),

    /// A collaborator (market data feed, broker) could not be reached.
    #[error("Upstream failure: {0}")]
    Upstream(String),
}

pub type Result<T> = std::result::Result<T, Error>;

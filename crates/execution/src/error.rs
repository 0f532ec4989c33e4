// In crates/execution/src/error.rs

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Execution failed: {reason}")]
    ExecutionFailed { reason: String },

    #[error("Order rejected for {instrument_id}: {reason}")]
    Rejected { instrument_id: String, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for core_types::Error {
    fn from(error: Error) -> Self {
        core_types::Error::Execution(error.to_string())
    }
}

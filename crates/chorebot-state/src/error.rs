use std::result::Result as StdResult;

use thiserror::Error;

/// Convenient result type for state operations.
pub type Result<T> = StdResult<T, Error>;

/// Errors raised by the state store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// The named state was never registered with the store.
    #[error("Unknown state: {0}")]
    UnknownState(String),

    /// A state was declared twice.
    #[error("Duplicate state declaration: {0}")]
    Duplicate(String),
}

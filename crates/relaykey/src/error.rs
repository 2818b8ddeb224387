//! Error types and result alias for the relaykey crate.
use std::result::Result as StdResult;

use gamekey::GameKey;
use thiserror::Error;

/// Crate-local `Result` alias using the relay error type.
pub type Result<T> = StdResult<T, Error>;

/// Errors that can occur while posting input events.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The backend failed to deliver an event for `key`.
    #[error("Failed to post {key}: {message}")]
    Post {
        /// Key whose event was rejected.
        key: GameKey,
        /// Backend-provided detail.
        message: String,
    },
    /// The backend has been shut down and accepts no further input.
    #[error("Input backend unavailable")]
    Unavailable,
}

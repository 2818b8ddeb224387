use std::result::Result as StdResult;

use thiserror::Error;

/// Convenient result type for the engine crate.
pub type Result<T> = StdResult<T, Error>;

/// Unified error type for the chorebot engine.
#[derive(Debug, Error)]
pub enum Error {
    /// Posting input failed.
    #[error("Input relay error: {0}")]
    Relay(#[from] relaykey::Error),

    /// A state operation referenced an unknown state or similar.
    #[error("State error: {0}")]
    State(#[from] chorebot_state::Error),

    /// The status channel has been closed by the receiver.
    #[error("Status channel closed")]
    ChannelClosed,

    /// The operation or list was stopped before it finished.
    #[error("Stopped")]
    Stopped,

    /// The engine has been disposed.
    #[error("Engine disposed")]
    Disposed,

    /// Generic error with context.
    #[error("Engine error: {0}")]
    Msg(String),
}

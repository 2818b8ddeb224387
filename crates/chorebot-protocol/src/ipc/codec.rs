use thiserror::Error;

use crate::StatusMsg;

/// Errors from encoding status messages.
#[derive(Debug, Error)]
pub enum Error {
    /// Serialization via serde_json failed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Encode a message as one line of JSON, without the trailing newline.
pub fn msg_to_line(msg: &StatusMsg) -> Result<String, Error> {
    Ok(serde_json::to_string(msg)?)
}

//! Status protocol between the chorebot engine and whatever displays it.
//!
//! The engine never talks to a GUI directly. It sends [`StatusMsg`] values
//! over an unbounded channel ([`ipc::status_channel`]); a GUI, the CLI, or a
//! test drains the receiver.

use std::fmt;

use serde::{Deserialize, Serialize};

/// IPC-related helpers: channel aliases and message codec.
pub mod ipc {
    use super::StatusMsg;

    /// Tokio unbounded sender for status messages.
    pub type StatusTx = tokio::sync::mpsc::UnboundedSender<StatusMsg>;
    /// Tokio unbounded receiver for status messages.
    pub type StatusRx = tokio::sync::mpsc::UnboundedReceiver<StatusMsg>;

    /// Create a standard unbounded status channel (sender, receiver).
    pub fn status_channel() -> (StatusTx, StatusRx) {
        tokio::sync::mpsc::unbounded_channel::<StatusMsg>()
    }

    /// Line codec for status messages.
    pub mod codec;
}

/// Lifecycle state of the evaluation loop.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// Loop running.
    Running,
    /// Loop stopped; may be started again.
    Stopped,
    /// Engine released; no further work.
    Disposed,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Disposed => "disposed",
        })
    }
}

/// Messages sent from the engine to the status sink.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusMsg {
    /// The evaluation loop changed state.
    Engine {
        /// New state.
        state: EngineState,
        /// Profile driving the engine.
        profile: String,
    },

    /// A scene's operation list started.
    SceneStarted {
        /// Scene label.
        scene: String,
        /// Label of the selected handler.
        handler: String,
        /// Scene priority.
        priority: Option<i32>,
    },

    /// A running operation list was preempted by another scene.
    ScenePreempted {
        /// Scene that was running.
        scene: String,
        /// Scene that took over.
        by: String,
    },

    /// A scene's operation list ended.
    SceneFinished {
        /// Scene label.
        scene: String,
        /// False when an operation failed or the list was stopped.
        completed: bool,
    },

    /// Notification request for the UI.
    Notify {
        /// Severity.
        kind: NotifyKind,
        /// Short title.
        title: String,
        /// Body text.
        text: String,
    },

    /// Streaming log message.
    Log {
        /// Level name, lowercase.
        level: String,
        /// Log target (module path).
        target: String,
        /// Rendered message.
        message: String,
    },
}

/// Notification severity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotifyKind {
    /// Informational.
    Info,
    /// Something went wrong but the engine continues.
    Warn,
    /// Something failed.
    Error,
    /// Something completed.
    Success,
}

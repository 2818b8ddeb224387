use chorebot_protocol::{NotifyKind, StatusMsg, ipc::StatusTx};
use tracing::{info, trace};

use crate::{Error, Result};

/// Sends status messages and notifications to the UI/log sink.
#[derive(Clone)]
pub struct NotificationDispatcher {
    /// Status channel.
    tx: StatusTx,
}

impl NotificationDispatcher {
    /// Create a new dispatcher from a status channel.
    pub fn new(tx: StatusTx) -> Self {
        Self { tx }
    }

    /// Send a raw status message.
    pub fn send(&self, msg: StatusMsg) -> Result<()> {
        self.tx.send(msg).map_err(|_| Error::ChannelClosed)
    }

    /// Send a status message, ignoring a closed channel.
    pub fn post(&self, msg: StatusMsg) {
        if self.send(msg).is_err() {
            trace!("status_channel_closed");
        }
    }

    /// Send a notification with the given kind, title, and text.
    pub fn send_notification(&self, kind: NotifyKind, title: String, text: String) -> Result<()> {
        info!(kind = ?kind, title = %title, text = %text, "notification_display");
        self.send(StatusMsg::Notify { kind, title, text })
    }

    /// Convenience helper to send a warning notification.
    pub fn send_warn(&self, title: &str, text: String) -> Result<()> {
        self.send_notification(NotifyKind::Warn, title.to_string(), text)
    }
}

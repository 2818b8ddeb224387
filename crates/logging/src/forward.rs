//! Forward tracing events to the status sink.
//!
//! This module provides a small tracing [`Layer`] that forwards log events to
//! whoever drains the engine's status channel (a GUI log pane, the CLI).
//!
//! Usage:
//! - Call [`set_sink`] with a [`StatusTx`] once the receiver exists.
//! - Install the [`layer`] in your tracing subscriber. When a sink is present,
//!   events will be forwarded as `StatusMsg::Log { level, target, message }`.
//! - Call [`clear_sink`] when the receiver goes away.
//!
//! The layer is lightweight and no-ops when no sink is set.

use std::sync::OnceLock;

use chorebot_protocol::{StatusMsg, ipc::StatusTx};
use parking_lot::Mutex;
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use crate::fmt;

/// A global sink that, when present, receives forwarded logs.
static LOG_SINK: OnceLock<Mutex<Option<StatusTx>>> = OnceLock::new();

/// Access the global sink.
fn sink() -> &'static Mutex<Option<StatusTx>> {
    LOG_SINK.get_or_init(|| Mutex::new(None))
}

/// Set the forwarding sink.
pub fn set_sink(tx: StatusTx) {
    let mut guard = sink().lock();
    *guard = Some(tx);
}

/// Clear the forwarding sink.
pub fn clear_sink() {
    let mut guard = sink().lock();
    *guard = None;
}

/// Tracing layer that forwards events to the status sink when one is set.
pub struct ForwardLayer;

impl<S> Layer<S> for ForwardLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        // Early-exit if there is no sink set
        let tx_opt = { sink().lock().clone() };
        let Some(tx) = tx_opt else { return };

        let r = fmt::render_event(event);
        if tx
            .send(StatusMsg::Log {
                level: r.level,
                target: r.target,
                message: r.message,
            })
            .is_err()
        {
            // Receiver dropped; clear to avoid repeated work.
            clear_sink();
        }
    }
}

/// Create the forwarding layer instance to add to your subscriber.
pub fn layer() -> ForwardLayer {
    ForwardLayer
}

#[cfg(test)]
mod tests {
    use chorebot_protocol::ipc::status_channel;
    use tracing::{info, subscriber::with_default};
    use tracing_subscriber::{layer::SubscriberExt, registry};

    use super::*;

    #[test]
    fn forwards_until_receiver_drops() {
        let (tx, mut rx) = status_channel();
        set_sink(tx);
        let subscriber = registry().with(layer());
        with_default(subscriber, || {
            info!(state = "energy", "state_recorded");
        });
        match rx.try_recv().expect("forwarded") {
            StatusMsg::Log { level, message, .. } => {
                assert_eq!(level, "info");
                assert_eq!(message, "state_recorded state=\"energy\"");
            }
            other => panic!("unexpected {:?}", other),
        }

        drop(rx);
        let subscriber = registry().with(layer());
        with_default(subscriber, || {
            info!("after_drop");
        });
        assert!(sink().lock().is_none());
    }
}

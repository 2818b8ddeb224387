//! Test support utilities for chorebot-engine integration/unit tests.
//! These helpers are public to avoid dead_code warnings and are lightweight.
//! They are intended for use by the test suite only.

use std::{sync::Arc, time::Duration};

use chorebot_protocol::{
    StatusMsg,
    ipc::{StatusRx, status_channel},
};
use relaykey::{Poster, RelayKey};
use tokio::time;

use crate::{
    bus::{BusConfig, EventBus},
    clock::Clock,
    notification::NotificationDispatcher,
    operator::Services,
};

/// Wire a poster and clock into a fresh set of services with a small bus.
pub fn services(poster: Arc<dyn Poster>, clock: Arc<dyn Clock>) -> (Services, StatusRx) {
    let (tx, rx) = status_channel();
    let services = Services {
        relay: RelayKey::new(poster),
        bus: EventBus::new(BusConfig {
            capacity: 64,
            workers: 1,
        }),
        notifier: NotificationDispatcher::new(tx),
        clock,
    };
    (services, rx)
}

/// Receive status messages until `pred` matches or `timeout_ms` elapses.
pub async fn recv_until<F>(rx: &mut StatusRx, timeout_ms: u64, mut pred: F) -> bool
where
    F: FnMut(&StatusMsg) -> bool,
{
    time::timeout(Duration::from_millis(timeout_ms), async {
        while let Some(msg) = rx.recv().await {
            if pred(&msg) {
                return true;
            }
        }
        false
    })
    .await
    .unwrap_or(false)
}

/// Take every status message already queued.
pub fn drain(rx: &mut StatusRx) -> Vec<StatusMsg> {
    let mut out = Vec::new();
    while let Ok(msg) = rx.try_recv() {
        out.push(msg);
    }
    out
}

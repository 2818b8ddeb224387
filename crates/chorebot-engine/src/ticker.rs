//! Fixed-interval tick loop with early wake-up and cancellation.

use std::{sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::{
    runtime::Handle,
    sync::Notify,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::{Error, Result};

/// Runs a closure on every interval tick, and early whenever [`Ticker::wake`]
/// is called. At most one loop runs at a time.
#[derive(Clone, Default)]
pub struct Ticker {
    /// Cancels the running loop, if any.
    entry: Arc<Mutex<Option<CancellationToken>>>,
    /// Early wake-up signal.
    wake: Arc<Notify>,
}

impl Ticker {
    /// Create an idle ticker.
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a loop is running.
    pub fn is_active(&self) -> bool {
        self.entry.lock().is_some()
    }

    /// Request an extra tick as soon as possible. A wake issued while the
    /// closure runs is delivered after it returns.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    /// Start (or restart) the loop. Must be called within a tokio runtime.
    pub fn start<F>(&self, interval: Duration, mut on_tick: F) -> Result<()>
    where
        F: FnMut() + Send + 'static,
    {
        let rt = Handle::try_current().map_err(|e| Error::Msg(format!("no tokio runtime: {e}")))?;
        self.stop();

        let token = CancellationToken::new();
        let cancel = token.clone();
        let wake = Arc::clone(&self.wake);
        let fut = async move {
            trace!(int_ms = interval.as_millis(), "ticker_start");
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        trace!("ticker_cancelled");
                        return;
                    }
                    _ = wake.notified() => {
                        trace!("ticker_woken");
                        on_tick();
                    }
                    _ = ticker.tick() => {
                        on_tick();
                    }
                }
            }
        };

        rt.spawn(fut);
        *self.entry.lock() = Some(token);
        Ok(())
    }

    /// Stop the loop if running (non-blocking). A tick already in progress
    /// runs to completion.
    pub fn stop(&self) {
        if let Some(token) = self.entry.lock().take() {
            token.cancel();
            trace!("ticker_stop");
        }
    }
}

//! Event bus carrying perception events to state listeners.
//!
//! Producers call [`EventBus::dispatch_event`], which never blocks: events go
//! onto a bounded queue served by a fixed pool of worker threads. When the
//! queue is full the event is dropped and a warning is logged at most once per
//! [`FULL_WARN_INTERVAL`]. Workers run listeners under a supervisor that
//! counts and logs failures and panics, so one bad listener cannot take a
//! worker down.

use std::{
    collections::HashMap,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use chorebot_state::StateEvent;
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use parking_lot::{Mutex, RwLock};
use tracing::{error, trace, warn};

use crate::Result;

/// Minimum time between two "queue full" warnings.
pub const FULL_WARN_INTERVAL: Duration = Duration::from_secs(1);

/// Poll interval used by [`EventBus::drain`].
const DRAIN_POLL_MS: u64 = 2;

/// Sizing of the queue and worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusConfig {
    /// Maximum number of queued events.
    pub capacity: usize,
    /// Number of worker threads.
    pub workers: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            workers: 2,
        }
    }
}

/// Callback invoked for every event dispatched under its id.
pub type Listener = Arc<dyn Fn(&StateEvent) -> Result<()> + Send + Sync>;

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// One queued event.
struct Job {
    /// Event id, usually a state name.
    id: String,
    /// Payload.
    event: StateEvent,
}

/// State shared with worker threads.
#[derive(Default)]
struct Shared {
    /// Listeners keyed by event id.
    listeners: RwLock<HashMap<String, Vec<(SubscriptionId, Listener)>>>,
    /// Events queued or being processed.
    pending: AtomicUsize,
    /// Listener errors and panics seen so far.
    failures: AtomicU64,
    /// Events dropped because the queue was full.
    dropped: AtomicU64,
    /// When the last "queue full" warning was logged.
    last_full_warn: Mutex<Option<Instant>>,
}

impl Shared {
    /// Run every listener for `job`.
    fn deliver(&self, job: &Job) {
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .get(&job.id)
            .map(|v| v.iter().map(|(_, l)| Arc::clone(l)).collect())
            .unwrap_or_default();
        for l in listeners {
            match panic::catch_unwind(AssertUnwindSafe(|| l(&job.event))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    self.failures.fetch_add(1, Ordering::Relaxed);
                    warn!(event = %job.id, error = %e, "bus_listener_failed");
                }
                Err(_) => {
                    self.failures.fetch_add(1, Ordering::Relaxed);
                    error!(event = %job.id, "bus_listener_panicked");
                }
            }
        }
    }

    /// Log a dropped event, throttled.
    fn note_dropped(&self, id: &str) {
        let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        let mut last = self.last_full_warn.lock();
        let now = Instant::now();
        if last.is_none_or(|t| now.duration_since(t) >= FULL_WARN_INTERVAL) {
            *last = Some(now);
            warn!(event = %id, dropped = total, "bus_queue_full");
        }
    }
}

/// Worker loop: exits when every sender is gone.
fn worker(rx: &Receiver<Job>, shared: &Shared) {
    for job in rx.iter() {
        shared.deliver(&job);
        shared.pending.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Internal state of an [`EventBus`].
struct BusInner {
    /// Queue sender; `None` once shut down.
    tx: Mutex<Option<Sender<Job>>>,
    /// Worker threads.
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
    /// State shared with the workers.
    shared: Arc<Shared>,
    /// Next subscription id.
    next_id: AtomicU64,
}

/// Bounded, multi-worker event bus. Cheap to clone.
#[derive(Clone)]
pub struct EventBus {
    /// Shared state.
    inner: Arc<BusInner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

impl EventBus {
    /// Create a bus and start its workers.
    pub fn new(cfg: BusConfig) -> Self {
        let (tx, rx) = bounded::<Job>(cfg.capacity.max(1));
        let shared = Arc::new(Shared::default());
        let mut workers = Vec::with_capacity(cfg.workers.max(1));
        for i in 0..cfg.workers.max(1) {
            let rx = rx.clone();
            let shared = Arc::clone(&shared);
            match thread::Builder::new()
                .name(format!("chorebot-bus-{i}"))
                .spawn(move || worker(&rx, &shared))
            {
                Ok(h) => workers.push(h),
                Err(e) => error!(worker = i, error = %e, "bus_worker_spawn_failed"),
            }
        }
        trace!(capacity = cfg.capacity, workers = workers.len(), "bus_started");
        Self {
            inner: Arc::new(BusInner {
                tx: Mutex::new(Some(tx)),
                workers: Mutex::new(workers),
                shared,
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Register `listener` for events dispatched under `id`.
    pub fn subscribe(&self, id: impl Into<String>, listener: Listener) -> SubscriptionId {
        let sid = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner
            .shared
            .listeners
            .write()
            .entry(id.into())
            .or_default()
            .push((sid, listener));
        sid
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn unsubscribe(&self, sid: SubscriptionId) -> bool {
        let mut map = self.inner.shared.listeners.write();
        let mut found = false;
        map.retain(|_, v| {
            let before = v.len();
            v.retain(|(s, _)| *s != sid);
            found |= v.len() != before;
            !v.is_empty()
        });
        found
    }

    /// Queue `event` for the listeners of `id`. Never blocks.
    ///
    /// Returns false when the event was not queued: no listener, full queue,
    /// or a bus that has been shut down.
    pub fn dispatch_event(&self, id: &str, event: StateEvent) -> bool {
        let shared = &self.inner.shared;
        if !shared.listeners.read().contains_key(id) {
            trace!(event = id, "bus_no_listener");
            return false;
        }
        let tx = self.inner.tx.lock();
        let Some(tx) = tx.as_ref() else {
            trace!(event = id, "bus_closed");
            return false;
        };
        shared.pending.fetch_add(1, Ordering::AcqRel);
        match tx.try_send(Job {
            id: id.to_string(),
            event,
        }) {
            Ok(()) => true,
            Err(TrySendError::Full(job)) => {
                shared.pending.fetch_sub(1, Ordering::AcqRel);
                shared.note_dropped(&job.id);
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                shared.pending.fetch_sub(1, Ordering::AcqRel);
                false
            }
        }
    }

    /// Block until every queued event has been delivered, up to `timeout`.
    pub fn drain(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.inner.shared.pending.load(Ordering::Acquire) == 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(DRAIN_POLL_MS));
        }
    }

    /// Listener errors and panics observed so far.
    pub fn failure_count(&self) -> u64 {
        self.inner.shared.failures.load(Ordering::Relaxed)
    }

    /// Events dropped because the queue was full.
    pub fn dropped_count(&self) -> u64 {
        self.inner.shared.dropped.load(Ordering::Relaxed)
    }

    /// Stop accepting events, let workers finish the queue and join them.
    pub fn shutdown(&self) {
        drop(self.inner.tx.lock().take());
        let workers: Vec<_> = self.inner.workers.lock().drain(..).collect();
        for h in workers {
            if h.join().is_err() {
                error!("bus_worker_join_failed");
            }
        }
        trace!("bus_shutdown");
    }
}

//! The conditional operator: owns the state store, the scene set and the
//! evaluation loop, and runs at most one operation list at a time.

use std::{
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use chorebot_protocol::{EngineState, StatusMsg};
use chorebot_state::{StateEvent, StateStore};
use config::Profile;
use parking_lot::Mutex;
use relaykey::RelayKey;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::{
    Error, Result,
    bus::{EventBus, Listener, SubscriptionId},
    clock::Clock,
    notification::NotificationDispatcher,
    ops::{AtomicOp, OpContext, OpList, RunState},
    scene::{Candidate, Decision, SceneHandlerSet, decide},
    ticker::Ticker,
};

/// Poll interval used by [`ConditionalOperator::wait_idle`].
const IDLE_POLL_MS: u64 = 2;

/// Long-lived services the operator is wired to.
#[derive(Clone)]
pub struct Services {
    /// Input relay.
    pub relay: RelayKey,
    /// Bus the perception side dispatches state events on.
    pub bus: EventBus,
    /// Status sink.
    pub notifier: NotificationDispatcher,
    /// Engine time.
    pub clock: Arc<dyn Clock>,
}

/// Outcome of one evaluation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    /// No scene selected anything.
    Nothing,
    /// A list started with nothing else running.
    Started {
        /// Scene label.
        scene: String,
    },
    /// The running scene selected again; its list keeps running.
    Continued,
    /// The running list outranks the candidate.
    Ignored {
        /// Scene that was turned away.
        scene: String,
    },
    /// The running list was stopped in favor of the candidate.
    Preempted {
        /// Scene that was running.
        from: String,
        /// Scene that took over.
        to: String,
    },
}

/// Loop lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    /// Built, never started.
    Idle,
    /// Loop running.
    Running,
    /// Loop stopped.
    Stopped,
    /// Released.
    Disposed,
}

/// The list currently executing.
struct RunningList {
    /// Scene index.
    scene: usize,
    /// Scene label.
    label: String,
    /// Scene priority.
    priority: Option<i32>,
    /// Its operations.
    actions: OpList,
    /// Cancels the runner and every op it started.
    token: CancellationToken,
    /// Identifies this run.
    generation: u64,
}

/// Shared operator state.
struct Inner {
    /// Profile name.
    profile: String,
    /// Loop period.
    tick: Duration,
    /// State records.
    states: StateStore,
    /// Scenes; locked during evaluation and trigger wake-ups.
    scenes: Mutex<SceneHandlerSet>,
    /// Every operation built for the profile.
    all_ops: Vec<Arc<dyn AtomicOp>>,
    /// The list currently executing.
    running: Mutex<Option<RunningList>>,
    /// Next list generation.
    generation: AtomicU64,
    /// Evaluation loop.
    ticker: Ticker,
    /// Lifecycle.
    lifecycle: Mutex<Lifecycle>,
    /// Input relay.
    relay: RelayKey,
    /// Event bus.
    bus: EventBus,
    /// Our bus subscriptions.
    subscriptions: Mutex<Vec<SubscriptionId>>,
    /// Status sink.
    notifier: NotificationDispatcher,
    /// Engine time.
    clock: Arc<dyn Clock>,
}

impl Inner {
    /// Record `event` for `name` and wake scenes it triggers.
    fn update_state(&self, name: &str, event: &StateEvent) -> Result<()> {
        self.states.update_state_record(name, event)?;
        if self.scenes.lock().wake(name) {
            trace!(state = name, "scene_trigger");
            self.ticker.wake();
        }
        Ok(())
    }

    /// Cancel a list and stop every op in it.
    ///
    /// Finished ops are stopped too: a `press way: down` is back in `Wait`
    /// with its key still held.
    fn stop_list(list: &RunningList) {
        list.token.cancel();
        for op in list.actions.iter() {
            op.stop();
        }
    }

    /// Whether a tick may act. Loop ticks need a running loop; manual ticks
    /// only need an engine that is not disposed.
    fn accepts_tick(&self, from_loop: bool) -> bool {
        match *self.lifecycle.lock() {
            Lifecycle::Disposed => false,
            Lifecycle::Running => true,
            Lifecycle::Idle | Lifecycle::Stopped => !from_loop,
        }
    }
}

/// Runs `actions` in order until one fails or the list is cancelled.
async fn run_list(inner: Arc<Inner>, scene: String, actions: OpList, token: CancellationToken, generation: u64) {
    let mut completed = true;
    for op in actions.iter() {
        if token.is_cancelled() {
            completed = false;
            break;
        }
        match op.execute_under(&token).await {
            Ok(()) => {}
            Err(Error::Stopped) => {
                trace!(scene = %scene, op = op.name(), "op_interrupted");
                completed = false;
                break;
            }
            Err(e) => {
                warn!(scene = %scene, op = op.name(), error = %e, "op_failed");
                if inner.notifier.send_warn(op.name(), e.to_string()).is_err() {
                    trace!("status_channel_closed");
                }
                completed = false;
                break;
            }
        }
    }
    {
        let mut running = inner.running.lock();
        if running.as_ref().is_some_and(|r| r.generation == generation) {
            *running = None;
        }
    }
    debug!(scene = %scene, completed, "scene_finished");
    inner.notifier.post(StatusMsg::SceneFinished { scene, completed });
}

/// Drives a profile: evaluates scenes on every tick and runs the selected
/// operation list. Cheap to clone.
#[derive(Clone)]
pub struct ConditionalOperator {
    /// Shared state.
    inner: Arc<Inner>,
}

impl ConditionalOperator {
    /// Build the engine for `profile` and subscribe to the bus once per state.
    pub fn new(profile: &Profile, services: Services) -> Result<Self> {
        let states = StateStore::new(&profile.states)?;
        let cx = OpContext {
            relay: services.relay.clone(),
            states: states.clone(),
            clock: Arc::clone(&services.clock),
        };
        let mut all_ops = Vec::new();
        let scenes = SceneHandlerSet::build(&profile.scenes, &cx, &mut all_ops);
        let inner = Arc::new(Inner {
            profile: profile.name.clone(),
            tick: profile.tick_interval(),
            states,
            scenes: Mutex::new(scenes),
            all_ops,
            running: Mutex::new(None),
            generation: AtomicU64::new(0),
            ticker: Ticker::new(),
            lifecycle: Mutex::new(Lifecycle::Idle),
            relay: services.relay,
            bus: services.bus,
            subscriptions: Mutex::new(Vec::new()),
            notifier: services.notifier,
            clock: services.clock,
        });

        let mut subs = Vec::new();
        for name in inner.states.names() {
            let weak: Weak<Inner> = Arc::downgrade(&inner);
            let state = name.clone();
            let listener: Listener = Arc::new(move |ev: &StateEvent| match weak.upgrade() {
                Some(inner) => inner.update_state(&state, ev),
                None => Ok(()),
            });
            subs.push(inner.bus.subscribe(name, listener));
        }
        *inner.subscriptions.lock() = subs;
        debug!(
            profile = %inner.profile,
            scenes = profile.scenes.len(),
            ops = inner.all_ops.len(),
            "operator_built"
        );
        Ok(Self { inner })
    }

    /// Profile name.
    pub fn profile(&self) -> &str {
        &self.inner.profile
    }

    /// The state records.
    pub fn states(&self) -> &StateStore {
        &self.inner.states
    }

    /// Record a state event directly, bypassing the bus.
    pub fn update_state(&self, name: &str, event: StateEvent) -> Result<()> {
        self.inner.update_state(name, &event)
    }

    /// One evaluation step at `now`.
    ///
    /// Evaluates every due scene, then starts, keeps or preempts according to
    /// the best candidate's priority. Must be called within a tokio runtime
    /// when a list may start.
    pub fn tick_at(&self, now: f64) -> Tick {
        self.step(now, false)
    }

    /// Evaluation step shared by manual ticks and the loop.
    fn step(&self, now: f64, from_loop: bool) -> Tick {
        if !self.inner.accepts_tick(from_loop) {
            return Tick::Nothing;
        }
        let candidate = self.inner.scenes.lock().evaluate(now, &self.inner.states);
        let Some(candidate) = candidate else {
            return Tick::Nothing;
        };

        let mut running = self.inner.running.lock();
        // stop_running may have landed while scenes were evaluated
        if !self.inner.accepts_tick(from_loop) {
            trace!(scene = %candidate.label, "tick_after_stop");
            return Tick::Nothing;
        }
        match decide(running.as_ref().map(|r| (r.scene, r.priority)), &candidate) {
            Decision::Start => {
                let scene = candidate.label.clone();
                *running = Some(self.spawn_list(candidate));
                Tick::Started { scene }
            }
            Decision::Continue => Tick::Continued,
            Decision::Keep => {
                trace!(scene = %candidate.label, "scene_outranked");
                Tick::Ignored {
                    scene: candidate.label,
                }
            }
            Decision::Preempt => {
                let to = candidate.label.clone();
                let from = running
                    .take()
                    .map(|old| {
                        Inner::stop_list(&old);
                        old.label
                    })
                    .unwrap_or_default();
                info!(from = %from, to = %to, "scene_preempted");
                self.inner.notifier.post(StatusMsg::ScenePreempted {
                    scene: from.clone(),
                    by: to.clone(),
                });
                *running = Some(self.spawn_list(candidate));
                Tick::Preempted { from, to }
            }
        }
    }

    /// Spawn a runner for `c`. Called with the running slot locked.
    fn spawn_list(&self, c: Candidate) -> RunningList {
        let generation = self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let token = CancellationToken::new();
        debug!(scene = %c.label, handler = %c.handler, ops = c.actions.len(), "scene_started");
        self.inner.notifier.post(StatusMsg::SceneStarted {
            scene: c.label.clone(),
            handler: c.handler.clone(),
            priority: c.priority,
        });
        tokio::spawn(run_list(
            Arc::clone(&self.inner),
            c.label.clone(),
            Arc::clone(&c.actions),
            token.clone(),
            generation,
        ));
        RunningList {
            scene: c.scene,
            label: c.label,
            priority: c.priority,
            actions: c.actions,
            token,
            generation,
        }
    }

    /// Start the evaluation loop. Idempotent while running.
    pub fn start_running_async(&self) -> Result<()> {
        let mut lc = self.inner.lifecycle.lock();
        match *lc {
            Lifecycle::Disposed => return Err(Error::Disposed),
            Lifecycle::Running => {
                trace!("operator_already_running");
                return Ok(());
            }
            Lifecycle::Idle | Lifecycle::Stopped => {}
        }
        let weak = Arc::downgrade(&self.inner);
        self.inner.ticker.start(self.inner.tick, move || {
            if let Some(inner) = weak.upgrade() {
                let now = inner.clock.now();
                ConditionalOperator { inner }.step(now, true);
            }
        })?;
        *lc = Lifecycle::Running;
        info!(profile = %self.inner.profile, tick_ms = self.inner.tick.as_millis(), "operator_started");
        self.inner.notifier.post(StatusMsg::Engine {
            state: EngineState::Running,
            profile: self.inner.profile.clone(),
        });
        Ok(())
    }

    /// Stop the loop and the running list and release all held input.
    ///
    /// Safe from any thread. Calling it again has no further effect. The
    /// lifecycle changes before the running slot is taken, so a loop tick
    /// already in flight cannot start a list afterwards.
    pub fn stop_running(&self) {
        let was_running = {
            let mut lc = self.inner.lifecycle.lock();
            let was = *lc == Lifecycle::Running;
            if was {
                *lc = Lifecycle::Stopped;
            }
            was
        };
        self.inner.ticker.stop();
        if let Some(list) = self.inner.running.lock().take() {
            debug!(scene = %list.label, "scene_stopped");
            Inner::stop_list(&list);
        }
        // async operations may outlive the list that started them
        for op in &self.inner.all_ops {
            if op.run_state() == RunState::Running {
                op.stop();
            }
        }
        let held = self.inner.relay.held_keys();
        if !held.is_empty() {
            debug!(keys = ?held, "releasing_held_keys");
        }
        self.inner.relay.release_all();
        if was_running {
            info!(profile = %self.inner.profile, "operator_stopped");
            self.inner.notifier.post(StatusMsg::Engine {
                state: EngineState::Stopped,
                profile: self.inner.profile.clone(),
            });
        }
    }

    /// Stop, drop bus subscriptions and disable every operation.
    pub fn dispose(&self) {
        if *self.inner.lifecycle.lock() == Lifecycle::Disposed {
            return;
        }
        self.stop_running();
        *self.inner.lifecycle.lock() = Lifecycle::Disposed;
        for sid in self.inner.subscriptions.lock().drain(..) {
            self.inner.bus.unsubscribe(sid);
        }
        for op in &self.inner.all_ops {
            op.dispose();
        }
        info!(profile = %self.inner.profile, "operator_disposed");
        self.inner.notifier.post(StatusMsg::Engine {
            state: EngineState::Disposed,
            profile: self.inner.profile.clone(),
        });
    }

    /// True while the evaluation loop runs.
    pub fn is_running(&self) -> bool {
        *self.inner.lifecycle.lock() == Lifecycle::Running
    }

    /// Label of the scene whose list is executing, if any.
    pub fn running_scene(&self) -> Option<String> {
        self.inner.running.lock().as_ref().map(|r| r.label.clone())
    }

    /// Wait until no list is executing, up to `timeout`.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.inner.running.lock().is_none() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            time::sleep(Duration::from_millis(IDLE_POLL_MS)).await;
        }
    }
}

//! Atomic operations: the unit of work a handler runs.
//!
//! Every operation shares one runtime ([`Operation`]): optional pre/post
//! delays, synchronous or fire-and-forget dispatch, and a run state machine
//!
//! ```text
//! WAIT -> RUNNING -> WAIT
//!            |
//!            +----> STOPPED (may start again)
//! ```
//!
//! guarded by a single lock. `execute` while RUNNING is a no-op. `stop` is
//! callable from any thread, cancels pending delays and releases any input
//! the operation may be holding, even if the task that pressed it has not yet
//! observed the cancellation.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chorebot_state::{StateEvent, StateStore};
use config::{OpKind, OpSpec, PressWay};
use gamekey::GameKey;
use parking_lot::Mutex;
use relaykey::RelayKey;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use crate::{Error, Result, clock::Clock};

/// Seconds a switch key is held.
const SWITCH_PRESS_TIME: f64 = 0.02;

/// Run state of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Idle, ready to execute.
    Wait,
    /// Executing.
    Running,
    /// Stopped; may execute again.
    Stopped,
}

/// Shared handles an operation acts on.
#[derive(Clone)]
pub struct OpContext {
    /// Input relay.
    pub relay: RelayKey,
    /// State records.
    pub states: StateStore,
    /// Engine time.
    pub clock: Arc<dyn Clock>,
}

/// An executable operation.
#[async_trait]
pub trait AtomicOp: Send + Sync {
    /// Short human-readable name.
    fn name(&self) -> &str;

    /// True when `execute` dispatches and returns immediately.
    fn is_async(&self) -> bool;

    /// Current run state.
    fn run_state(&self) -> RunState;

    /// Run the operation. A no-op while already running or after `dispose`.
    async fn execute(&self) -> Result<()> {
        self.execute_under(&CancellationToken::new()).await
    }

    /// Run the operation, also stopping when `parent` is cancelled.
    async fn execute_under(&self, parent: &CancellationToken) -> Result<()>;

    /// Stop the operation and release held input. Idempotent.
    fn stop(&self);

    /// Stop and make every later `execute` a no-op.
    fn dispose(&self);
}

/// Operations selected together, run in order.
pub type OpList = Arc<[Arc<dyn AtomicOp>]>;

/// Sleep for `secs`, returning [`Error::Stopped`] if `cancel` fires first.
pub(crate) async fn sleep_or_cancel(secs: f64, cancel: &CancellationToken) -> Result<()> {
    if secs.is_nan() || secs <= 0.0 {
        return if cancel.is_cancelled() {
            Err(Error::Stopped)
        } else {
            Ok(())
        };
    }
    // too long to represent: only cancellation ends it
    let Ok(d) = Duration::try_from_secs_f64(secs) else {
        cancel.cancelled().await;
        return Err(Error::Stopped);
    };
    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Stopped),
        _ = time::sleep(d) => Ok(()),
    }
}

/// Release `key`, logging failures.
fn release_key(cx: &OpContext, key: GameKey) {
    if let Err(e) = cx.relay.key_up(key) {
        warn!(key = %key, error = %e, "op_release_failed");
    }
}

/// The kind-specific part of an operation.
#[async_trait]
trait Body: Send + Sync {
    /// Perform the action once.
    async fn perform(&self, cx: &OpContext, cancel: &CancellationToken) -> Result<()>;

    /// Release any input this body may hold.
    fn release(&self, _cx: &OpContext) {}
}

/// Press a key: tap, down or up.
struct PressBody {
    /// Key to drive.
    key: GameKey,
    /// Tap, down or up.
    way: PressWay,
    /// Seconds held during a tap.
    press_time: f64,
    /// Number of presses.
    repeat: u32,
    /// Seconds between presses.
    interval: f64,
}

impl PressBody {
    /// A single tap of `key`.
    fn tap(key: GameKey, press_time: f64) -> Self {
        Self {
            key,
            way: PressWay::Tap,
            press_time,
            repeat: 1,
            interval: 0.0,
        }
    }
}

#[async_trait]
impl Body for PressBody {
    async fn perform(&self, cx: &OpContext, cancel: &CancellationToken) -> Result<()> {
        for i in 0..self.repeat {
            if i > 0 {
                sleep_or_cancel(self.interval, cancel).await?;
            }
            match self.way {
                PressWay::Tap => {
                    cx.relay.key_down(self.key)?;
                    let held = sleep_or_cancel(self.press_time, cancel).await;
                    cx.relay.key_up(self.key)?;
                    held?;
                }
                PressWay::Down => {
                    cx.relay.key_down(self.key)?;
                    // a stop may have released before our down landed
                    if cancel.is_cancelled() {
                        cx.relay.key_up(self.key)?;
                        return Err(Error::Stopped);
                    }
                }
                PressWay::Up => {
                    cx.relay.key_up(self.key)?;
                }
            }
        }
        Ok(())
    }

    fn release(&self, cx: &OpContext) {
        if self.way != PressWay::Up {
            release_key(cx, self.key);
        }
    }
}

/// Hold a key for a duration, or until stopped.
struct HoldBody {
    /// Key to hold.
    key: GameKey,
    /// Duration; `None` holds until stopped.
    seconds: Option<f64>,
}

#[async_trait]
impl Body for HoldBody {
    async fn perform(&self, cx: &OpContext, cancel: &CancellationToken) -> Result<()> {
        cx.relay.key_down(self.key)?;
        let held = match self.seconds {
            Some(s) => sleep_or_cancel(s, cancel).await,
            None => {
                cancel.cancelled().await;
                Err(Error::Stopped)
            }
        };
        cx.relay.key_up(self.key)?;
        held
    }

    fn release(&self, cx: &OpContext) {
        release_key(cx, self.key);
    }
}

/// Sleep.
struct WaitBody {
    /// Duration in seconds.
    seconds: f64,
}

#[async_trait]
impl Body for WaitBody {
    async fn perform(&self, _cx: &OpContext, cancel: &CancellationToken) -> Result<()> {
        sleep_or_cancel(self.seconds, cancel).await
    }
}

/// Record states as observed now.
struct SetStateBody {
    /// States to record.
    names: Vec<String>,
    /// Absolute value.
    value: Option<i64>,
    /// Delta value.
    value_add: Option<i64>,
    /// Seconds added to the current time.
    offset: f64,
}

#[async_trait]
impl Body for SetStateBody {
    async fn perform(&self, cx: &OpContext, _cancel: &CancellationToken) -> Result<()> {
        let event = StateEvent {
            trigger_time: cx.clock.now() + self.offset,
            value: self.value,
            value_add: self.value_add,
        };
        for name in &self.names {
            cx.states.update_state_record(name, &event)?;
        }
        Ok(())
    }
}

/// Clear states.
struct ClearStateBody {
    /// States to clear.
    names: Vec<String>,
}

#[async_trait]
impl Body for ClearStateBody {
    async fn perform(&self, cx: &OpContext, _cancel: &CancellationToken) -> Result<()> {
        for name in &self.names {
            cx.states.clear_state(name)?;
        }
        Ok(())
    }
}

/// Build the body for `kind`.
fn body_for(kind: &OpKind) -> Box<dyn Body> {
    match kind {
        OpKind::Press {
            key,
            way,
            press_time,
            repeat,
            interval,
        } => Box::new(PressBody {
            key: *key,
            way: *way,
            press_time: *press_time,
            repeat: *repeat,
            interval: *interval,
        }),
        OpKind::Hold { key, seconds } => Box::new(HoldBody {
            key: *key,
            seconds: *seconds,
        }),
        OpKind::Wait { seconds } => Box::new(WaitBody { seconds: *seconds }),
        OpKind::SetState {
            names,
            value,
            value_add,
            offset,
        } => Box::new(SetStateBody {
            names: names.clone(),
            value: *value,
            value_add: *value_add,
            offset: *offset,
        }),
        OpKind::ClearState { names } => Box::new(ClearStateBody {
            names: names.clone(),
        }),
        OpKind::Switch { direction } => Box::new(PressBody::tap(direction.key(), SWITCH_PRESS_TIME)),
    }
}

/// Mutable run-state bookkeeping, guarded by one lock.
struct Control {
    /// Current state.
    state: RunState,
    /// Cancels the current execution.
    token: CancellationToken,
    /// Bumped on every execution so stale completions are ignored.
    generation: u64,
    /// Set by `dispose`.
    disposed: bool,
}

/// Shared part of an [`Operation`], kept alive by detached executions.
struct OpInner {
    /// Display name.
    name: String,
    /// Seconds slept before the body.
    pre_delay: f64,
    /// Seconds slept after the body.
    post_delay: f64,
    /// Dispatch without waiting.
    is_async: bool,
    /// Kind-specific action.
    body: Box<dyn Body>,
    /// Handles the body acts on.
    cx: OpContext,
    /// Run state.
    control: Mutex<Control>,
}

impl OpInner {
    /// Run one execution and settle the run state.
    async fn run(&self, token: &CancellationToken, generation: u64) -> Result<()> {
        trace!("op_start" = %self.name);
        let result = self.steps(token).await;
        let mut c = self.control.lock();
        if c.generation == generation && c.state == RunState::Running {
            c.state = if token.is_cancelled() {
                RunState::Stopped
            } else {
                RunState::Wait
            };
        }
        trace!("op_end" = %self.name, ok = result.is_ok());
        result
    }

    /// Delays around the body.
    async fn steps(&self, token: &CancellationToken) -> Result<()> {
        sleep_or_cancel(self.pre_delay, token).await?;
        self.body.perform(&self.cx, token).await?;
        sleep_or_cancel(self.post_delay, token).await
    }
}

/// The standard [`AtomicOp`] implementation, built from an [`OpSpec`].
#[derive(Clone)]
pub struct Operation {
    /// Shared state.
    inner: Arc<OpInner>,
}

impl Operation {
    /// Build an operation acting on `cx`.
    pub fn new(spec: &OpSpec, cx: OpContext) -> Self {
        Self {
            inner: Arc::new(OpInner {
                name: spec.name(),
                pre_delay: spec.pre_delay,
                post_delay: spec.post_delay,
                is_async: spec.is_async,
                body: body_for(&spec.kind),
                cx,
                control: Mutex::new(Control {
                    state: RunState::Wait,
                    token: CancellationToken::new(),
                    generation: 0,
                    disposed: false,
                }),
            }),
        }
    }
}

#[async_trait]
impl AtomicOp for Operation {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn is_async(&self) -> bool {
        self.inner.is_async
    }

    fn run_state(&self) -> RunState {
        self.inner.control.lock().state
    }

    async fn execute_under(&self, parent: &CancellationToken) -> Result<()> {
        let (token, generation) = {
            let mut c = self.inner.control.lock();
            if c.disposed {
                trace!("op_execute_disposed" = %self.inner.name);
                return Ok(());
            }
            if c.state == RunState::Running {
                trace!("op_execute_busy" = %self.inner.name);
                return Ok(());
            }
            c.state = RunState::Running;
            c.generation += 1;
            c.token = parent.child_token();
            (c.token.clone(), c.generation)
        };

        if !self.inner.is_async {
            return self.inner.run(&token, generation).await;
        }
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            match inner.run(&token, generation).await {
                Ok(()) | Err(Error::Stopped) => {}
                Err(e) => warn!(op = %inner.name, error = %e, "async_op_failed"),
            }
        });
        Ok(())
    }

    fn stop(&self) {
        let was = {
            let mut c = self.inner.control.lock();
            c.token.cancel();
            let was = c.state;
            c.state = RunState::Stopped;
            was
        };
        self.inner.body.release(&self.inner.cx);
        trace!("op_stop" = %self.inner.name, was = ?was);
    }

    fn dispose(&self) {
        self.stop();
        self.inner.control.lock().disposed = true;
        trace!("op_dispose" = %self.inner.name);
    }
}

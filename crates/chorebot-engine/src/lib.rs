//! Chorebot Engine
//!
//! The engine turns a resolved [`config::Profile`] into running automation:
//! - keeps one [`chorebot_state::StateRecord`] per state and applies
//!   perception events delivered over the [`EventBus`]
//! - evaluates scenes on a fixed tick, selecting one operation list through
//!   each scene's handler trees
//! - runs the selected list on its own task, preempting by scene priority
//! - reports lifecycle, scene changes and failures as status messages
//!
//! The primary type is [`ConditionalOperator`]. Operations implement
//! [`AtomicOp`]; [`Operation`] is the implementation built from profile data.

mod bus;
mod clock;
mod error;
mod handler;
mod notification;
mod operator;
mod ops;
mod scene;
pub mod test_support;
mod ticker;

pub use bus::{BusConfig, EventBus, FULL_WARN_INTERVAL, Listener, SubscriptionId};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, Result};
pub use handler::{HandlerNode, Selection, select_first};
pub use notification::NotificationDispatcher;
pub use operator::{ConditionalOperator, Services, Tick};
pub use ops::{AtomicOp, OpContext, OpList, Operation, RunState};
pub use scene::{Candidate, Decision, Scene, SceneHandlerSet, decide};
pub use ticker::Ticker;

//! Resolved profile model consumed by the engine.
//!
//! Every template has been expanded, every expression compiled and every
//! key parsed by the time a [`Profile`] exists.

use std::{fmt, time::Duration};

use chorebot_state::{Expression, StateDecl};
use gamekey::GameKey;

/// A fully resolved automation profile.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    /// Display name.
    pub name: String,
    /// Evaluation period in milliseconds.
    pub tick_ms: u64,
    /// Every state the profile refers to, declared or implied.
    pub states: Vec<StateDecl>,
    /// Scenes in declaration order.
    pub scenes: Vec<SceneSpec>,
}

impl Profile {
    /// Evaluation period.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

/// A scene: a set of handler trees evaluated on a cadence.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneSpec {
    /// Label used in logs and status messages.
    pub label: String,
    /// Minimum seconds between evaluations.
    pub interval: f64,
    /// Preemption priority; `None` may be preempted by anything.
    pub priority: Option<i32>,
    /// States whose events wake this scene immediately.
    pub triggers: Vec<String>,
    /// Top-level handler trees in priority order.
    pub handlers: Vec<HandlerSpec>,
}

/// A conditional handler node.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerSpec {
    /// Label used in logs.
    pub label: String,
    /// Guard condition.
    pub condition: Expression,
    /// Child handlers, earlier ones first.
    pub children: Vec<HandlerSpec>,
    /// Operations run when this node is the deepest match.
    pub operations: Vec<OpSpec>,
}

/// How a `press` operation drives its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressWay {
    /// Down then up.
    Tap,
    /// Down only.
    Down,
    /// Up only.
    Up,
}

impl PressWay {
    fn as_str(self) -> &'static str {
        match self {
            Self::Tap => "tap",
            Self::Down => "down",
            Self::Up => "up",
        }
    }
}

/// Direction of a character switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchDirection {
    /// Next character.
    Next,
    /// Previous character.
    Prev,
}

impl SwitchDirection {
    /// Parse `next` or `prev`.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "next" => Some(Self::Next),
            "prev" | "previous" => Some(Self::Prev),
            _ => None,
        }
    }

    /// Key tapped to perform the switch.
    pub fn key(self) -> GameKey {
        match self {
            Self::Next => GameKey::SwitchNext,
            Self::Prev => GameKey::SwitchPrev,
        }
    }
}

/// What an operation does.
#[derive(Debug, Clone, PartialEq)]
pub enum OpKind {
    /// Press a key.
    Press {
        /// Key to drive.
        key: GameKey,
        /// Tap, down or up.
        way: PressWay,
        /// Seconds held during a tap.
        press_time: f64,
        /// Number of taps.
        repeat: u32,
        /// Seconds between taps.
        interval: f64,
    },
    /// Hold a key for `seconds`, or until stopped when `None`.
    Hold {
        /// Key to hold.
        key: GameKey,
        /// Hold duration.
        seconds: Option<f64>,
    },
    /// Sleep.
    Wait {
        /// Duration in seconds.
        seconds: f64,
    },
    /// Record states as observed now.
    SetState {
        /// States to record.
        names: Vec<String>,
        /// Absolute value.
        value: Option<i64>,
        /// Delta value.
        value_add: Option<i64>,
        /// Seconds added to the current time.
        offset: f64,
    },
    /// Clear states.
    ClearState {
        /// States to clear.
        names: Vec<String>,
    },
    /// Switch character.
    Switch {
        /// Direction.
        direction: SwitchDirection,
    },
}

/// One operation with its common modifiers.
#[derive(Debug, Clone, PartialEq)]
pub struct OpSpec {
    /// Behaviour.
    pub kind: OpKind,
    /// Seconds slept before the operation.
    pub pre_delay: f64,
    /// Seconds slept after the operation.
    pub post_delay: f64,
    /// Dispatch without waiting for completion.
    pub is_async: bool,
}

impl OpSpec {
    /// A synchronous operation without delays.
    pub fn new(kind: OpKind) -> Self {
        Self {
            kind,
            pre_delay: 0.0,
            post_delay: 0.0,
            is_async: false,
        }
    }

    /// Mark the operation as fire-and-forget.
    pub fn detached(mut self) -> Self {
        self.is_async = true;
        self
    }

    /// Short human-readable name, e.g. `press dodge`.
    pub fn name(&self) -> String {
        self.kind.to_string()
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Press {
                key, way, repeat, ..
            } => {
                write!(f, "press {}", key)?;
                if *way != PressWay::Tap {
                    write!(f, " {}", way.as_str())?;
                }
                if *repeat > 1 {
                    write!(f, " x{}", repeat)?;
                }
                Ok(())
            }
            Self::Hold { key, seconds } => match seconds {
                Some(s) => write!(f, "hold {} {}s", key, s),
                None => write!(f, "hold {}", key),
            },
            Self::Wait { seconds } => write!(f, "wait {}s", seconds),
            Self::SetState { names, .. } => write!(f, "set_state {}", names.join(",")),
            Self::ClearState { names } => write!(f, "clear_state {}", names.join(",")),
            Self::Switch { direction } => match direction {
                SwitchDirection::Next => f.write_str("switch next"),
                SwitchDirection::Prev => f.write_str("switch prev"),
            },
        }
    }
}

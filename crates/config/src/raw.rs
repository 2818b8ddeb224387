//! Serde schema of the profile document, before template expansion.

use std::collections::BTreeMap;

use serde::Deserialize;

/// Default evaluation period in milliseconds.
pub(crate) const DEFAULT_TICK_MS: u64 = 20;

/// Default hold duration of a tap, in seconds.
pub(crate) const DEFAULT_PRESS_TIME: f64 = 0.02;

fn default_tick_ms() -> u64 {
    DEFAULT_TICK_MS
}

/// Top-level profile document.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawProfile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Reject references to states missing from `states`.
    #[serde(default)]
    pub strict_states: bool,
    #[serde(default)]
    pub states: Vec<RawState>,
    #[serde(default)]
    pub handler_templates: BTreeMap<String, RawHandler>,
    #[serde(default)]
    pub operation_templates: BTreeMap<String, Vec<RawOp>>,
    #[serde(default)]
    pub scenes: Vec<RawScene>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawState {
    pub name: String,
    #[serde(default)]
    pub mutex_group: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawScene {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub triggers: Vec<String>,
    /// Cadence in seconds; 0 evaluates on every tick.
    #[serde(default)]
    pub interval: f64,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub handlers: Vec<RawHandler>,
}

/// A handler node. Fields set here override those of `template`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawHandler {
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    /// Condition expression text.
    #[serde(default)]
    pub states: Option<String>,
    #[serde(default)]
    pub sub_handlers: Option<Vec<RawHandler>>,
    #[serde(default)]
    pub operations: Option<Vec<RawOp>>,
}

impl RawHandler {
    /// Overlay the fields set on `self` onto `base`.
    pub fn overlay(self, base: RawHandler) -> RawHandler {
        RawHandler {
            template: None,
            label: self.label.or(base.label),
            states: self.states.or(base.states),
            sub_handlers: self.sub_handlers.or(base.sub_handlers),
            operations: self.operations.or(base.operations),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub(crate) enum RawOpKind {
    Press,
    Hold,
    Wait,
    SetState,
    ClearState,
    Switch,
}

impl RawOpKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Press => "press",
            Self::Hold => "hold",
            Self::Wait => "wait",
            Self::SetState => "set_state",
            Self::ClearState => "clear_state",
            Self::Switch => "switch",
        }
    }

    /// Operation-specific fields this kind accepts.
    fn accepts(self, field: &str) -> bool {
        let allowed: &[&str] = match self {
            Self::Press => &["key", "way", "press_time", "repeat", "interval"],
            Self::Hold => &["key", "seconds"],
            Self::Wait => &["seconds"],
            Self::SetState => &["state", "state_list", "value", "value_add", "offset"],
            Self::ClearState => &["state", "state_list"],
            Self::Switch => &["target"],
        };
        allowed.contains(&field)
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub(crate) enum RawWay {
    Tap,
    #[serde(alias = "press")]
    Down,
    #[serde(alias = "release")]
    Up,
}

/// One operation entry, or a reference to an operation template.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawOp {
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub op: Option<RawOpKind>,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub way: Option<RawWay>,
    #[serde(default)]
    pub press_time: Option<f64>,
    #[serde(default)]
    pub repeat: Option<u32>,
    #[serde(default)]
    pub interval: Option<f64>,
    #[serde(default)]
    pub seconds: Option<f64>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub state_list: Option<Vec<String>>,
    #[serde(default)]
    pub value: Option<i64>,
    #[serde(default)]
    pub value_add: Option<i64>,
    #[serde(default)]
    pub offset: Option<f64>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub pre_delay: Option<f64>,
    #[serde(default)]
    pub post_delay: Option<f64>,
    #[serde(default, rename = "async")]
    pub is_async: bool,
}

impl RawOp {
    /// Names of the operation-specific fields that are set.
    pub fn set_fields(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        let mut mark = |set: bool, name: &'static str| {
            if set {
                out.push(name);
            }
        };
        mark(self.key.is_some(), "key");
        mark(self.way.is_some(), "way");
        mark(self.press_time.is_some(), "press_time");
        mark(self.repeat.is_some(), "repeat");
        mark(self.interval.is_some(), "interval");
        mark(self.seconds.is_some(), "seconds");
        mark(self.state.is_some(), "state");
        mark(self.state_list.is_some(), "state_list");
        mark(self.value.is_some(), "value");
        mark(self.value_add.is_some(), "value_add");
        mark(self.offset.is_some(), "offset");
        mark(self.target.is_some(), "target");
        out
    }

    /// First set field that `kind` does not accept.
    pub fn stray_field(&self, kind: RawOpKind) -> Option<&'static str> {
        self.set_fields().into_iter().find(|f| !kind.accepts(f))
    }

    /// True when only `template` is set.
    pub fn is_bare_template(&self) -> bool {
        let bare = RawOp {
            template: self.template.clone(),
            ..RawOp::default()
        };
        *self == bare
    }

    /// State names named by `state` and `state_list`, in order.
    pub fn state_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.iter().cloned().collect();
        for n in self.state_list.iter().flatten() {
            if !names.contains(n) {
                names.push(n.clone());
            }
        }
        names
    }
}

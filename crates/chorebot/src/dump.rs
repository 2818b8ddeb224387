//! JSON view of a resolved profile for `check --dump`.

use config::{HandlerSpec, Profile, SceneSpec};
use serde::Serialize;

/// Resolved profile summary.
#[derive(Debug, Serialize)]
pub struct ProfileDump {
    /// Profile name.
    name: String,
    /// Loop period.
    tick_ms: u64,
    /// Every registered state, with its mutex group.
    states: Vec<StateDump>,
    /// Scenes in declaration order.
    scenes: Vec<SceneDump>,
}

/// One registered state.
#[derive(Debug, Serialize)]
struct StateDump {
    /// Name.
    name: String,
    /// Mutex group.
    #[serde(skip_serializing_if = "Option::is_none")]
    mutex_group: Option<String>,
}

/// One scene.
#[derive(Debug, Serialize)]
struct SceneDump {
    /// Label.
    label: String,
    /// Evaluation cadence in seconds.
    interval: f64,
    /// Preemption priority.
    priority: Option<i32>,
    /// Trigger states.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    triggers: Vec<String>,
    /// Handler trees.
    handlers: Vec<HandlerDump>,
}

/// One handler node.
#[derive(Debug, Serialize)]
struct HandlerDump {
    /// Label.
    label: String,
    /// Condition source.
    states: String,
    /// Operation names.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    operations: Vec<String>,
    /// Children.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sub_handlers: Vec<Self>,
}

impl HandlerDump {
    /// Summarize a handler subtree.
    fn from_spec(h: &HandlerSpec) -> Self {
        Self {
            label: h.label.clone(),
            states: h.condition.text().to_string(),
            operations: h.operations.iter().map(|o| o.name()).collect(),
            sub_handlers: h.children.iter().map(Self::from_spec).collect(),
        }
    }
}

impl SceneDump {
    /// Summarize a scene.
    fn from_spec(s: &SceneSpec) -> Self {
        Self {
            label: s.label.clone(),
            interval: s.interval,
            priority: s.priority,
            triggers: s.triggers.clone(),
            handlers: s.handlers.iter().map(HandlerDump::from_spec).collect(),
        }
    }
}

impl ProfileDump {
    /// Summarize a profile.
    pub fn new(p: &Profile) -> Self {
        Self {
            name: p.name.clone(),
            tick_ms: p.tick_ms,
            states: p
                .states
                .iter()
                .map(|d| StateDump {
                    name: d.name.clone(),
                    mutex_group: d.mutex_group.clone(),
                })
                .collect(),
            scenes: p.scenes.iter().map(SceneDump::from_spec).collect(),
        }
    }
}

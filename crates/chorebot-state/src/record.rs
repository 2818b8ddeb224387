use std::collections::BTreeSet;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// An immutable perception fact for one state.
///
/// `value` overwrites the recorded value; `value_add` accumulates onto it
/// (treating a missing value as 0). When both are present `value` wins.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateEvent {
    /// Time the fact was observed, in engine clock seconds.
    pub trigger_time: f64,
    /// Absolute value to record.
    #[serde(default)]
    pub value: Option<i64>,
    /// Delta to add to the current value.
    #[serde(default)]
    pub value_add: Option<i64>,
}

impl StateEvent {
    /// An event carrying only a timestamp.
    pub fn at(trigger_time: f64) -> Self {
        Self {
            trigger_time,
            value: None,
            value_add: None,
        }
    }

    /// An event overwriting the value.
    pub fn with_value(trigger_time: f64, value: i64) -> Self {
        Self {
            value: Some(value),
            ..Self::at(trigger_time)
        }
    }

    /// An event accumulating onto the value.
    pub fn with_add(trigger_time: f64, value_add: i64) -> Self {
        Self {
            value_add: Some(value_add),
            ..Self::at(trigger_time)
        }
    }
}

/// Point-in-time copy of a record's observation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordSnapshot {
    /// Last time the state was recorded.
    pub time: Option<f64>,
    /// Last recorded value.
    pub value: Option<i64>,
}

impl RecordSnapshot {
    /// Apply `event` on top of this snapshot.
    pub fn apply(&mut self, event: &StateEvent) {
        self.time = Some(event.trigger_time);
        if let Some(v) = event.value {
            self.value = Some(v);
        } else if let Some(add) = event.value_add {
            self.value = Some(self.value.unwrap_or(0).saturating_add(add));
        }
    }
}

/// Latest observation for one named state.
///
/// Each record carries its own lock; records never lock each other.
#[derive(Debug)]
pub struct StateRecord {
    /// State name.
    name: String,
    /// All members of this record's mutex group (including itself).
    mutex_group: Option<BTreeSet<String>>,
    /// Current observation.
    inner: Mutex<RecordSnapshot>,
}

impl StateRecord {
    /// Create an empty record.
    pub fn new(name: impl Into<String>, mutex_group: Option<BTreeSet<String>>) -> Self {
        Self {
            name: name.into(),
            mutex_group,
            inner: Mutex::new(RecordSnapshot::default()),
        }
    }

    /// State name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Mutex group members, when the state belongs to one.
    pub fn mutex_group(&self) -> Option<&BTreeSet<String>> {
        self.mutex_group.as_ref()
    }

    /// Peers that must be cleared when this state is recorded.
    pub fn mutex_peers(&self) -> impl Iterator<Item = &str> {
        self.mutex_group
            .iter()
            .flatten()
            .map(String::as_str)
            .filter(move |n| *n != self.name)
    }

    /// Record an event, returning the resulting snapshot.
    pub fn update(&self, event: &StateEvent) -> RecordSnapshot {
        let mut guard = self.inner.lock();
        guard.apply(event);
        *guard
    }

    /// Reset time and value to unset.
    pub fn clear(&self) {
        *self.inner.lock() = RecordSnapshot::default();
    }

    /// Current observation.
    pub fn snapshot(&self) -> RecordSnapshot {
        *self.inner.lock()
    }

    /// Last record time.
    pub fn last_record_time(&self) -> Option<f64> {
        self.inner.lock().time
    }

    /// Last recorded value.
    pub fn last_value(&self) -> Option<i64> {
        self.inner.lock().value
    }
}

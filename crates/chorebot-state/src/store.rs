use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use tracing::trace;

use crate::{Error, RecordSnapshot, Result, StateEvent, StateRecord};

/// Read access to state observations, as used by expression evaluation.
pub trait StateLookup {
    /// Current observation for `name`, or `None` if the state is unknown.
    fn snapshot(&self, name: &str) -> Option<RecordSnapshot>;
}

impl StateLookup for HashMap<String, RecordSnapshot> {
    fn snapshot(&self, name: &str) -> Option<RecordSnapshot> {
        self.get(name).copied()
    }
}

/// Declaration of one state and the mutex group it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateDecl {
    /// State name.
    pub name: String,
    /// Name of the mutex group, if any.
    pub mutex_group: Option<String>,
}

impl StateDecl {
    /// A state outside any mutex group.
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mutex_group: None,
        }
    }

    /// A state belonging to `group`.
    pub fn grouped(name: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mutex_group: Some(group.into()),
        }
    }
}

/// Owns every state record of a profile.
///
/// The set of records is fixed at construction; only record contents change
/// afterwards, each under its own lock.
#[derive(Debug, Clone, Default)]
pub struct StateStore {
    /// Records keyed by name.
    records: Arc<HashMap<String, Arc<StateRecord>>>,
}

impl StateStore {
    /// Build a store from declarations. Names must be unique.
    pub fn new(decls: &[StateDecl]) -> Result<Self> {
        let mut groups: HashMap<&str, BTreeSet<String>> = HashMap::new();
        for d in decls {
            if let Some(g) = d.mutex_group.as_deref() {
                groups.entry(g).or_default().insert(d.name.clone());
            }
        }
        let mut records = HashMap::with_capacity(decls.len());
        for d in decls {
            let group = d
                .mutex_group
                .as_deref()
                .and_then(|g| groups.get(g))
                .cloned();
            let rec = Arc::new(StateRecord::new(d.name.clone(), group));
            if records.insert(d.name.clone(), rec).is_some() {
                return Err(Error::Duplicate(d.name.clone()));
            }
        }
        Ok(Self {
            records: Arc::new(records),
        })
    }

    /// Look up a record.
    pub fn record(&self, name: &str) -> Option<&Arc<StateRecord>> {
        self.records.get(name)
    }

    /// True when `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.records.keys().cloned().collect();
        names.sort();
        names
    }

    /// Apply `event` to `name` and clear its mutex peers.
    pub fn update_state_record(&self, name: &str, event: &StateEvent) -> Result<RecordSnapshot> {
        let rec = self
            .records
            .get(name)
            .ok_or_else(|| Error::UnknownState(name.to_string()))?;
        let snap = rec.update(event);
        for peer in rec.mutex_peers() {
            if let Some(p) = self.records.get(peer) {
                p.clear();
            }
        }
        trace!(state = name, time = event.trigger_time, value = ?snap.value, "state_recorded");
        Ok(snap)
    }

    /// Clear a single record.
    pub fn clear_state(&self, name: &str) -> Result<()> {
        self.records
            .get(name)
            .ok_or_else(|| Error::UnknownState(name.to_string()))?
            .clear();
        trace!(state = name, "state_cleared");
        Ok(())
    }
}

impl StateLookup for StateStore {
    fn snapshot(&self, name: &str) -> Option<RecordSnapshot> {
        self.records.get(name).map(|r| r.snapshot())
    }
}

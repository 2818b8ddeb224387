//! Scenes and priority-gated preemption.

use std::sync::Arc;

use chorebot_state::StateLookup;
use config::SceneSpec;
use tracing::trace;

use crate::{
    handler::{HandlerNode, select_first},
    ops::{AtomicOp, OpContext, OpList},
};

/// A set of handler trees evaluated on a cadence.
pub struct Scene {
    /// Label used in logs and status messages.
    label: String,
    /// Minimum seconds between evaluations.
    interval: f64,
    /// Preemption priority.
    priority: Option<i32>,
    /// States whose events wake the scene.
    triggers: Vec<String>,
    /// Top-level handler trees.
    handlers: Vec<HandlerNode>,
    /// Time of the last evaluation.
    last_eval: Option<f64>,
    /// Woken by a trigger since the last evaluation.
    woken: bool,
}

impl Scene {
    /// Build a scene from its resolved form.
    pub fn build(spec: &SceneSpec, cx: &OpContext, all_ops: &mut Vec<Arc<dyn AtomicOp>>) -> Self {
        Self::new(
            spec.label.clone(),
            spec.interval,
            spec.priority,
            spec.triggers.clone(),
            spec.handlers
                .iter()
                .map(|h| HandlerNode::build(h, cx, all_ops))
                .collect(),
        )
    }

    /// Assemble a scene from parts.
    pub fn new(
        label: impl Into<String>,
        interval: f64,
        priority: Option<i32>,
        triggers: Vec<String>,
        handlers: Vec<HandlerNode>,
    ) -> Self {
        Self {
            label: label.into(),
            interval,
            priority,
            triggers,
            handlers,
            last_eval: None,
            woken: false,
        }
    }

    /// Label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Priority.
    pub fn priority(&self) -> Option<i32> {
        self.priority
    }

    /// True when the scene should be evaluated at `now`.
    fn due(&self, now: f64) -> bool {
        if self.woken {
            return true;
        }
        match self.last_eval {
            None => true,
            // a clock that went backwards counts as due
            Some(last) => now < last || now - last >= self.interval,
        }
    }
}

/// The operation list a scene proposes to run.
#[derive(Clone)]
pub struct Candidate {
    /// Index of the scene in declaration order.
    pub scene: usize,
    /// Scene label.
    pub label: String,
    /// Label of the selected handler.
    pub handler: String,
    /// Scene priority.
    pub priority: Option<i32>,
    /// Operations to run.
    pub actions: OpList,
}

/// What to do with a candidate given what is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Nothing is running: start the candidate.
    Start,
    /// The candidate belongs to the running scene: let it continue.
    Continue,
    /// Stop the running list and start the candidate.
    Preempt,
    /// The running list outranks the candidate.
    Keep,
}

/// Decide whether `candidate` may replace a list running at `running`.
///
/// `running` is `(scene index, priority)` of the running list. A candidate
/// preempts when the running priority is `None`, or when the candidate has a
/// priority at least as high as the running one. A scene never preempts its
/// own running list.
pub fn decide(running: Option<(usize, Option<i32>)>, candidate: &Candidate) -> Decision {
    let Some((scene, priority)) = running else {
        return Decision::Start;
    };
    if scene == candidate.scene {
        return Decision::Continue;
    }
    match (priority, candidate.priority) {
        (None, _) => Decision::Preempt,
        (Some(p), Some(c)) if c >= p => Decision::Preempt,
        _ => Decision::Keep,
    }
}

/// Flat collection of scenes in declaration order.
pub struct SceneHandlerSet {
    /// Scenes.
    scenes: Vec<Scene>,
}

impl SceneHandlerSet {
    /// Build every scene of a profile.
    pub fn build(specs: &[SceneSpec], cx: &OpContext, all_ops: &mut Vec<Arc<dyn AtomicOp>>) -> Self {
        Self::new(specs.iter().map(|s| Scene::build(s, cx, all_ops)).collect())
    }

    /// Wrap prebuilt scenes.
    pub fn new(scenes: Vec<Scene>) -> Self {
        Self { scenes }
    }

    /// Scenes in declaration order.
    pub fn scenes(&self) -> &[Scene] {
        &self.scenes
    }

    /// Wake every scene triggered by `state`. Returns true if any was woken.
    pub fn wake(&mut self, state: &str) -> bool {
        let mut any = false;
        for s in &mut self.scenes {
            if s.triggers.iter().any(|t| t == state) {
                s.woken = true;
                any = true;
            }
        }
        any
    }

    /// Evaluate every due scene at `now` and return the best candidate.
    ///
    /// The best candidate has the highest priority (`None` lowest); ties go
    /// to the earlier scene.
    pub fn evaluate<L>(&mut self, now: f64, lookup: &L) -> Option<Candidate>
    where
        L: StateLookup + ?Sized,
    {
        let mut best: Option<Candidate> = None;
        for (i, scene) in self.scenes.iter_mut().enumerate() {
            if !scene.due(now) {
                continue;
            }
            scene.last_eval = Some(now);
            scene.woken = false;
            let Some(sel) = select_first(&scene.handlers, now, lookup) else {
                continue;
            };
            trace!(scene = %scene.label, handler = sel.label, "scene_match");
            if best.as_ref().is_some_and(|b| b.priority >= scene.priority) {
                continue;
            }
            best = Some(Candidate {
                scene: i,
                label: scene.label.clone(),
                handler: sel.label.to_string(),
                priority: scene.priority,
                actions: Arc::clone(sel.actions),
            });
        }
        best
    }
}

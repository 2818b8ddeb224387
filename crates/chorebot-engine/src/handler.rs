//! Conditional handler trees.
//!
//! A node's operations are eligible when its condition holds and none of its
//! children match. Children are tried in order and the first match wins, so
//! the deepest matching node along the first matching path is selected.

use std::sync::Arc;

use chorebot_state::{Expression, StateLookup};
use config::HandlerSpec;

use crate::ops::{AtomicOp, OpContext, OpList, Operation};

/// The operation list chosen by a handler tree.
#[derive(Clone, Copy)]
pub struct Selection<'a> {
    /// Label of the selected node.
    pub label: &'a str,
    /// Its operations.
    pub actions: &'a OpList,
}

/// One node of a handler tree. Immutable after construction.
pub struct HandlerNode {
    /// Label used in logs.
    label: String,
    /// Guard condition.
    condition: Expression,
    /// Children in priority order.
    children: Vec<HandlerNode>,
    /// Operations run when this node is selected.
    actions: OpList,
}

impl HandlerNode {
    /// Build a node (and its subtree) from a resolved handler.
    ///
    /// Every operation created is also pushed onto `all_ops`.
    pub fn build(spec: &HandlerSpec, cx: &OpContext, all_ops: &mut Vec<Arc<dyn AtomicOp>>) -> Self {
        let actions: Vec<Arc<dyn AtomicOp>> = spec
            .operations
            .iter()
            .map(|o| Arc::new(Operation::new(o, cx.clone())) as Arc<dyn AtomicOp>)
            .collect();
        all_ops.extend(actions.iter().cloned());
        Self {
            label: spec.label.clone(),
            condition: spec.condition.clone(),
            children: spec
                .children
                .iter()
                .map(|c| Self::build(c, cx, all_ops))
                .collect(),
            actions: actions.into(),
        }
    }

    /// Assemble a node from parts.
    pub fn new(
        label: impl Into<String>,
        condition: Expression,
        children: Vec<Self>,
        actions: Vec<Arc<dyn AtomicOp>>,
    ) -> Self {
        Self {
            label: label.into(),
            condition,
            children,
            actions: actions.into(),
        }
    }

    /// Label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Select the operation list to run at `now`, if any.
    ///
    /// Children are not evaluated when this node's condition is false. A
    /// node without operations and without a matching child selects nothing.
    pub fn select<'a, L>(&'a self, now: f64, lookup: &L) -> Option<Selection<'a>>
    where
        L: StateLookup + ?Sized,
    {
        if !self.condition.evaluate(now, lookup) {
            return None;
        }
        if let Some(sel) = self.children.iter().find_map(|c| c.select(now, lookup)) {
            return Some(sel);
        }
        if self.actions.is_empty() {
            return None;
        }
        Some(Selection {
            label: &self.label,
            actions: &self.actions,
        })
    }
}

/// Select from a list of top-level nodes: the first match wins.
pub fn select_first<'a, L>(nodes: &'a [HandlerNode], now: f64, lookup: &L) -> Option<Selection<'a>>
where
    L: StateLookup + ?Sized,
{
    nodes.iter().find_map(|n| n.select(now, lookup))
}

//! Traversal cursors and their supervision.
//!
//! A [`Workflow`] is one independent cursor through a graph; the
//! [`manager::WorkflowManager`] tracks every concurrently running cursor
//! task, supports cooperative cancellation, and joins them all while new
//! forks keep arriving.

pub mod manager;

pub use manager::{CancelFlag, WorkflowManager};

use rustc_hash::FxHashMap;

use crate::state::ConclusionOverlay;
use crate::types::{NodeId, WorkflowId};

/// Context key a fork stamps with the branch target it was created for.
pub const BRANCH_KEY: &str = "branch";

/// One independent traversal cursor.
///
/// Created when a branch starts (the initial workflow, or a fork at a
/// decision node); destroyed when it reaches a terminal node, a dead end,
/// or an unrecoverable error. The `history` is append-only and survives
/// for audit until the manager drops the bookkeeping.
#[derive(Clone, Debug)]
pub struct Workflow {
    pub workflow_id: WorkflowId,
    pub current_node_id: NodeId,
    /// Visited node ids in order.
    pub history: Vec<NodeId>,
    /// Free-form key/value bag, cloned on fork.
    pub context: FxHashMap<String, String>,
    /// Branch-private conclusions layered over the shared annotations.
    pub overlay: ConclusionOverlay,
}

impl Workflow {
    pub fn new(start_node_id: impl Into<NodeId>, context: Option<FxHashMap<String, String>>) -> Self {
        Self {
            workflow_id: uuid::Uuid::new_v4(),
            current_node_id: start_node_id.into(),
            history: Vec::new(),
            context: context.unwrap_or_default(),
            overlay: ConclusionOverlay::new(),
        }
    }

    /// Derive a sibling cursor exploring `branch_node`.
    ///
    /// The child inherits a copy of the context (tagged with the branch
    /// target) and of the conclusion overlay, but starts a fresh history.
    #[must_use]
    pub fn fork(&self, branch_node: impl Into<NodeId>) -> Self {
        let branch_node = branch_node.into();
        let mut context = self.context.clone();
        context.insert(BRANCH_KEY.to_string(), branch_node.clone());
        Self {
            workflow_id: uuid::Uuid::new_v4(),
            current_node_id: branch_node,
            history: Vec::new(),
            context,
            overlay: self.overlay.clone(),
        }
    }

    /// Record the current node in history.
    pub fn visit(&mut self) {
        self.history.push(self.current_node_id.clone());
    }

    pub fn set_current(&mut self, node_id: impl Into<NodeId>) {
        self.current_node_id = node_id.into();
    }

    pub fn update_context(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.context.insert(key.into(), value.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fork_copies_context_and_tags_branch() {
        let mut parent = Workflow::new("d1", None);
        parent.update_context("subject", "web-1");
        let child = parent.fork("d2");

        assert_ne!(child.workflow_id, parent.workflow_id);
        assert_eq!(child.current_node_id, "d2");
        assert_eq!(child.context.get("subject").map(String::as_str), Some("web-1"));
        assert_eq!(child.context.get(BRANCH_KEY).map(String::as_str), Some("d2"));
        assert!(child.history.is_empty());
        // Parent context is untouched by the fork.
        assert!(!parent.context.contains_key(BRANCH_KEY));
    }

    #[test]
    fn visit_appends_history() {
        let mut workflow = Workflow::new("e1", None);
        workflow.visit();
        workflow.set_current("d1");
        workflow.visit();
        assert_eq!(workflow.history, vec!["e1", "d1"]);
    }
}

//! Shared per-node execution state.
//!
//! The graph itself is immutable after load; everything a run mutates —
//! conclusions, status, timing, oracle call counts — lives here. One
//! [`NodeAnnotations`] instance is shared (via `Arc`) by every workflow
//! task traversing the same graph plus the memory refresher, so writes use
//! last-writer-wins semantics. Forked branches that want to read their own
//! conclusions before the shared value layer a private
//! [`ConclusionOverlay`] on top.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::types::{NodeId, NodeStatus};

/// Mutable annotation attached to one node during execution.
#[derive(Clone, Debug, Default)]
pub struct NodeAnnotation {
    pub conclusion: Option<String>,
    pub status: NodeStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Number of oracle invocations attributed to this node.
    pub oracle_calls: u32,
}

/// Shared map of node id to execution annotation.
///
/// All access goes through short critical sections on a
/// `parking_lot::RwLock`; no lock is held across an await point.
#[derive(Debug, Default)]
pub struct NodeAnnotations {
    inner: RwLock<FxHashMap<NodeId, NodeAnnotation>>,
}

impl NodeAnnotations {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The last conclusion written for `node_id`, if any.
    #[must_use]
    pub fn conclusion(&self, node_id: &str) -> Option<String> {
        self.inner
            .read()
            .get(node_id)
            .and_then(|a| a.conclusion.clone())
    }

    /// Record a conclusion. Concurrent writers race; the last one wins.
    pub fn set_conclusion(&self, node_id: &str, conclusion: impl Into<String>) {
        let mut guard = self.inner.write();
        guard.entry(node_id.to_string()).or_default().conclusion = Some(conclusion.into());
    }

    #[must_use]
    pub fn status(&self, node_id: &str) -> NodeStatus {
        self.inner
            .read()
            .get(node_id)
            .map(|a| a.status)
            .unwrap_or_default()
    }

    /// Mark a node as executing and stamp its start time.
    pub fn begin_execution(&self, node_id: &str) {
        let mut guard = self.inner.write();
        let annotation = guard.entry(node_id.to_string()).or_default();
        annotation.status = NodeStatus::Executing;
        annotation.start_time = Some(Utc::now());
    }

    /// Mark a node as completed and stamp its end time.
    pub fn complete_execution(&self, node_id: &str) {
        let mut guard = self.inner.write();
        let annotation = guard.entry(node_id.to_string()).or_default();
        annotation.status = NodeStatus::Completed;
        annotation.end_time = Some(Utc::now());
    }

    /// Attribute `count` oracle calls to a node.
    pub fn add_oracle_calls(&self, node_id: &str, count: u32) {
        let mut guard = self.inner.write();
        guard.entry(node_id.to_string()).or_default().oracle_calls += count;
    }

    /// Snapshot one node's annotation.
    #[must_use]
    pub fn get(&self, node_id: &str) -> Option<NodeAnnotation> {
        self.inner.read().get(node_id).cloned()
    }
}

/// A workflow-private view over conclusions.
///
/// Reads consult the overlay first and fall back to the shared
/// annotations; writes go to both (write-through), so siblings observe
/// last-writer-wins on the shared map while the owning branch always sees
/// its own values.
#[derive(Clone, Debug, Default)]
pub struct ConclusionOverlay {
    local: FxHashMap<NodeId, String>,
}

impl ConclusionOverlay {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn conclusion(&self, annotations: &NodeAnnotations, node_id: &str) -> Option<String> {
        self.local
            .get(node_id)
            .cloned()
            .or_else(|| annotations.conclusion(node_id))
    }

    pub fn record(
        &mut self,
        annotations: &NodeAnnotations,
        node_id: &str,
        conclusion: impl Into<String>,
    ) {
        let conclusion = conclusion.into();
        self.local.insert(node_id.to_string(), conclusion.clone());
        annotations.set_conclusion(node_id, conclusion);
    }
}

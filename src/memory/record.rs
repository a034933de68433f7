//! Action-keyed execution records.

use chrono::{DateTime, Utc};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::types::NodeId;

/// Reserved action key for records produced by terminal nodes.
pub const ERROR_ACTION: &str = "error";

/// The most recent execution of one action, together with every
/// (question, nodes) association that shares it.
///
/// At most one live record exists per distinct action string; re-storing
/// the same action merges question/node associations instead of
/// duplicating the record.
#[derive(Clone, Debug)]
pub struct MemoryRecord {
    pub action: String,
    pub observation: String,
    pub description: String,
    /// question -> ids of the nodes asking it against this action.
    pub questions: FxHashMap<String, FxHashSet<NodeId>>,
    pub timestamp: DateTime<Utc>,
}

impl MemoryRecord {
    pub fn new(
        action: impl Into<String>,
        observation: impl Into<String>,
        description: impl Into<String>,
        question: impl Into<String>,
        node_id: impl Into<NodeId>,
    ) -> Self {
        let mut questions: FxHashMap<String, FxHashSet<NodeId>> = FxHashMap::default();
        questions
            .entry(question.into())
            .or_default()
            .insert(node_id.into());
        Self {
            action: action.into(),
            observation: observation.into(),
            description: description.into(),
            questions,
            timestamp: Utc::now(),
        }
    }

    /// Record for a terminal node: the description doubles as the
    /// question so summaries render the failure text.
    pub fn error(description: impl Into<String>, node_id: impl Into<NodeId>) -> Self {
        let description = description.into();
        Self::new(
            ERROR_ACTION,
            ERROR_ACTION,
            description.clone(),
            description,
            node_id,
        )
    }

    /// Associate another (question, node) pair with this action.
    pub fn add_question(&mut self, question: impl Into<String>, node_id: impl Into<NodeId>) {
        self.questions
            .entry(question.into())
            .or_default()
            .insert(node_id.into());
    }

    /// Merge another record's associations into this one and adopt its
    /// timestamp. Caller guarantees equal action keys.
    pub fn merge(&mut self, other: &MemoryRecord) {
        for (question, node_ids) in &other.questions {
            let entry = self.questions.entry(question.clone()).or_default();
            entry.extend(node_ids.iter().cloned());
        }
        self.timestamp = other.timestamp;
    }

    /// Questions in deterministic (sorted) order, for summaries and
    /// refresh fan-out.
    #[must_use]
    pub fn sorted_questions(&self) -> Vec<(&String, Vec<&NodeId>)> {
        let mut questions: Vec<(&String, Vec<&NodeId>)> = self
            .questions
            .iter()
            .map(|(question, node_ids)| {
                let mut ids: Vec<&NodeId> = node_ids.iter().collect();
                ids.sort();
                (question, ids)
            })
            .collect();
        questions.sort_by_key(|(question, _)| *question);
        questions
    }
}

//! Core types for the triagegraph diagnosis engine.
//!
//! This module defines the fundamental identifiers and enumerations used
//! throughout the system: node identity, node kinds, and execution status.
//! These are the core domain concepts that define what a diagnostic graph *is*.
//!
//! # Key Types
//!
//! - [`NodeKind`]: The four node roles a diagnostic graph is built from
//! - [`NodeStatus`]: Execution lifecycle of a single node
//! - [`NodeId`] / [`WorkflowId`]: Identity aliases used across modules
//!
//! # Examples
//!
//! ```rust
//! use triagegraph::types::{NodeKind, NodeStatus};
//!
//! let kind = NodeKind::Decision;
//! assert_eq!(kind.to_string(), "default");
//! assert!(!kind.is_terminal());
//!
//! let status = NodeStatus::Waiting;
//! assert_eq!(status.to_string(), "waiting");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable identifier of a node within one graph.
///
/// Node ids come from the graph description and are never synthesized
/// during traversal.
pub type NodeId = String;

/// Opaque unique token identifying one traversal cursor.
pub type WorkflowId = uuid::Uuid;

/// The role a node plays in a diagnostic graph.
///
/// The serialized names ("input", "default", "output", "group") match the
/// authoring format produced by the graph editor and are fixed; the Rust
/// variant names describe the semantics.
///
/// # Examples
///
/// ```rust
/// use triagegraph::types::NodeKind;
///
/// let parsed: NodeKind = serde_json::from_str("\"input\"").unwrap();
/// assert_eq!(parsed, NodeKind::Entry);
/// assert_eq!(serde_json::to_string(&NodeKind::Group).unwrap(), "\"group\"");
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    /// Sole traversal starting point of a graph or of a group.
    ///
    /// Every graph has exactly one top-level entry, and every group has
    /// exactly one entry child; an entry always has exactly one outgoing
    /// edge.
    #[serde(rename = "input")]
    Entry,

    /// Executes an action and/or asks the oracle for a conclusion, then
    /// transitions on that conclusion.
    #[serde(rename = "default")]
    Decision,

    /// Records a diagnostic failure and ends its workflow.
    #[serde(rename = "output")]
    Terminal,

    /// Aggregates its child decision/terminal nodes into one combined
    /// conclusion.
    #[serde(rename = "group")]
    Group,
}

impl NodeKind {
    /// Returns `true` if this is an [`Entry`](Self::Entry) node.
    #[must_use]
    pub fn is_entry(&self) -> bool {
        matches!(self, Self::Entry)
    }

    /// Returns `true` if this is a [`Decision`](Self::Decision) node.
    #[must_use]
    pub fn is_decision(&self) -> bool {
        matches!(self, Self::Decision)
    }

    /// Returns `true` if this is a [`Terminal`](Self::Terminal) node.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal)
    }

    /// Returns `true` if this is a [`Group`](Self::Group) node.
    #[must_use]
    pub fn is_group(&self) -> bool {
        matches!(self, Self::Group)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entry => write!(f, "input"),
            Self::Decision => write!(f, "default"),
            Self::Terminal => write!(f, "output"),
            Self::Group => write!(f, "group"),
        }
    }
}

/// Execution lifecycle of a single node.
///
/// Status transitions are driven by the executor: `Waiting` until a
/// workflow cursor reaches the node, `Executing` while its action and
/// oracle calls run, `Completed` once a conclusion is recorded.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    #[default]
    Waiting,
    Executing,
    Completed,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::Executing => write!(f, "executing"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

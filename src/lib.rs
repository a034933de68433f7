//! # Triagegraph: Graph-driven Workload Diagnosis Engine
//!
//! Triagegraph walks a directed graph of decision nodes to diagnose a
//! running workload. At each decision node it runs an opaque inspection
//! action, asks an external reasoning oracle to turn the observation into
//! a conclusion, and transitions on that conclusion; groups aggregate
//! their children into combined verdicts. Multiple branches of the same
//! graph run as independent concurrent workflows, and everything observed
//! is kept in an action-keyed memory that refreshes itself in the
//! background.
//!
//! ## Core Concepts
//!
//! - **Graph**: Immutable-after-load nodes and edges with entry/group
//!   invariants, built from a serialized description
//! - **Traversal**: Pure transition rules with group entry and
//!   parent-climb fallback
//! - **Workflow**: One traversal cursor; many run concurrently under a
//!   manager with cooperative cancellation
//! - **Stage**: One oracle call hardened by self-consistency sampling,
//!   bounded repair, and majority voting
//! - **Memory**: Action-keyed records with priority-ordered background
//!   refresh
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use triagegraph::graph::{GraphMeta, load_graph};
//! use triagegraph::state::NodeAnnotations;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let description = std::fs::read_to_string("diagnosis.json")?;
//! let graph = Arc::new(load_graph("pod-triage", &description, GraphMeta::default())?);
//! let annotations = Arc::new(NodeAnnotations::new());
//! // Wire the graph, annotations, stages, and an action executor into a
//! // GraphExecutor, then call execute().
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Guide
//!
//! - [`graph`] - Graph model and description loading
//! - [`traversal`] - The transition state machine
//! - [`workflow`] - Cursors, forking, and task supervision
//! - [`executor`] - The per-workflow step loop
//! - [`memory`] - Action-keyed records and background refresh
//! - [`stage`] - Self-consistency, repair, and voting around oracle calls
//! - [`oracle`] - External collaborator traits
//! - [`events`] - Lifecycle event bus
//! - [`state`] - Shared per-node execution annotations

pub mod config;
pub mod events;
pub mod executor;
pub mod graph;
pub mod memory;
pub mod oracle;
pub mod stage;
pub mod state;
pub mod subject;
pub mod telemetry;
pub mod traversal;
pub mod types;
pub mod utils;
pub mod workflow;

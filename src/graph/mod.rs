//! Graph data model and description loading.
//!
//! The graph is the static half of the engine: nodes, edges, and the
//! entry/group invariants the traversal state machine depends on. See
//! [`crate::traversal`] for the transition rules and
//! [`crate::state`] for the mutable per-node execution overlay.

pub mod loader;
pub mod model;
pub mod node;

pub use loader::{GraphMeta, GraphStructureError, load_graph};
pub use model::Graph;
pub use node::{Edge, Node};

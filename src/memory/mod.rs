//! Action-keyed memory with priority-ordered background refresh.
//!
//! Decision and terminal nodes persist what they executed and observed;
//! the store keeps one record per distinct action and periodically
//! re-executes them so conclusions age out instead of fossilizing. See
//! [`store::MemoryStore`] for the refresh contract.

pub mod record;
pub mod store;

pub use record::{ERROR_ACTION, MemoryRecord};
pub use store::{MemoryStore, RefreshReport};

//! Supervision of concurrent workflow tasks.
//!
//! The manager tracks every running cursor task and joins them all while
//! allowing new forks to register mid-wait: the join loop re-scans the
//! task map after every completion instead of snapshotting the set once.
//! A task failure (panic included) is logged and treated as an implicit
//! removal — one branch dying never aborts its siblings.
//!
//! Cancellation is cooperative. [`remove_workflow`] raises a flag the
//! task polls at step boundaries; in-flight oracle or action calls are
//! allowed to complete so side effects are never half-applied.
//!
//! [`remove_workflow`]: WorkflowManager::remove_workflow

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::task::JoinHandle;

use super::Workflow;
use crate::events::{EventSender, WorkflowEvent};
use crate::types::{NodeId, WorkflowId};

/// Shared cooperative cancellation flag, polled between node steps.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
struct WorkflowEntry {
    start_node: NodeId,
    cancel: CancelFlag,
}

/// Registry of live workflows and their tasks.
#[derive(Debug)]
pub struct WorkflowManager {
    workflows: Mutex<FxHashMap<WorkflowId, WorkflowEntry>>,
    tasks: Mutex<FxHashMap<WorkflowId, JoinHandle<()>>>,
    events: EventSender,
}

impl WorkflowManager {
    #[must_use]
    pub fn new(events: EventSender) -> Self {
        Self {
            workflows: Mutex::new(FxHashMap::default()),
            tasks: Mutex::new(FxHashMap::default()),
            events,
        }
    }

    /// Create and register a workflow cursor with a fresh unique id.
    pub fn create_workflow(
        &self,
        start_node_id: impl Into<NodeId>,
        context: Option<FxHashMap<String, String>>,
    ) -> Workflow {
        let workflow = Workflow::new(start_node_id, context);
        self.track(&workflow);
        workflow
    }

    /// Register an externally constructed cursor (a fork).
    pub fn track(&self, workflow: &Workflow) {
        self.workflows.lock().insert(
            workflow.workflow_id,
            WorkflowEntry {
                start_node: workflow.current_node_id.clone(),
                cancel: CancelFlag::default(),
            },
        );
        self.events.emit(WorkflowEvent::Created {
            workflow: workflow.workflow_id,
            start_node: workflow.current_node_id.clone(),
        });
    }

    /// The cancellation flag a workflow's task should poll.
    #[must_use]
    pub fn cancel_flag(&self, workflow_id: &WorkflowId) -> Option<CancelFlag> {
        self.workflows
            .lock()
            .get(workflow_id)
            .map(|entry| entry.cancel.clone())
    }

    /// Attach the running task for a workflow.
    pub fn add_task(&self, workflow_id: WorkflowId, handle: JoinHandle<()>) {
        self.tasks.lock().insert(workflow_id, handle);
    }

    #[must_use]
    pub fn has_task(&self, workflow_id: &WorkflowId) -> bool {
        self.tasks.lock().contains_key(workflow_id)
    }

    /// Whether the task attached to a workflow has finished; `None` when
    /// no task is attached (or it was already joined).
    #[must_use]
    pub fn task_finished(&self, workflow_id: &WorkflowId) -> Option<bool> {
        self.tasks
            .lock()
            .get(workflow_id)
            .map(JoinHandle::is_finished)
    }

    #[must_use]
    pub fn is_tracked(&self, workflow_id: &WorkflowId) -> bool {
        self.workflows.lock().contains_key(workflow_id)
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.workflows.lock().len()
    }

    /// Starting node recorded for a workflow, for audit.
    #[must_use]
    pub fn start_node(&self, workflow_id: &WorkflowId) -> Option<NodeId> {
        self.workflows
            .lock()
            .get(workflow_id)
            .map(|entry| entry.start_node.clone())
    }

    /// Drop bookkeeping and request cooperative cancellation of the task
    /// if it is still running.
    pub fn remove_workflow(&self, workflow_id: &WorkflowId, reason: impl Into<String>) {
        let entry = self.workflows.lock().remove(workflow_id);
        if let Some(entry) = entry {
            entry.cancel.cancel();
            self.events.emit(WorkflowEvent::Removed {
                workflow: *workflow_id,
                reason: reason.into(),
            });
        }
        // The join handle stays in the task map; run_all_tasks awaits it
        // so the task can observe the flag and wind down at its next step
        // boundary.
    }

    /// Await every tracked task until none remain.
    ///
    /// The map is re-scanned after each join, so tasks registered while
    /// waiting (forked branches) are picked up. Panicking tasks are
    /// logged and dropped; siblings keep running.
    pub async fn run_all_tasks(&self) {
        loop {
            let next = {
                let mut tasks = self.tasks.lock();
                let id = tasks.keys().next().copied();
                id.and_then(|id| tasks.remove(&id).map(|handle| (id, handle)))
            };
            let Some((workflow_id, handle)) = next else {
                break;
            };
            if let Err(join_error) = handle.await {
                tracing::error!(
                    workflow = %workflow_id,
                    error = %join_error,
                    "workflow task failed; removing"
                );
            }
            self.workflows.lock().remove(&workflow_id);
        }
    }
}

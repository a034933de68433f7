//! Workflow lifecycle events.
//!
//! Executor, workflow manager, and memory refresher emit structured
//! events onto one unbounded channel; a background listener drains them
//! into tracing. Senders are cheap clones handed to every task. The bus
//! exists so operators can follow a diagnosis run without interleaving
//! ad-hoc log lines from a dozen concurrent branches.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task;

use crate::types::{NodeId, WorkflowId};

/// One observable moment in a diagnosis run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkflowEvent {
    Created {
        workflow: WorkflowId,
        start_node: NodeId,
    },
    Forked {
        parent: WorkflowId,
        child: WorkflowId,
        branch_node: NodeId,
    },
    Step {
        workflow: WorkflowId,
        node: NodeId,
    },
    Removed {
        workflow: WorkflowId,
        reason: String,
    },
    Completed {
        workflow: WorkflowId,
        final_node: NodeId,
    },
    RefreshStarted {
        actions: usize,
    },
    RefreshFinished {
        refreshed: usize,
        failed: usize,
    },
}

impl fmt::Display for WorkflowEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created {
                workflow,
                start_node,
            } => write!(f, "workflow {workflow} created at {start_node}"),
            Self::Forked {
                parent,
                child,
                branch_node,
            } => write!(f, "workflow {parent} forked {child} toward {branch_node}"),
            Self::Step { workflow, node } => write!(f, "workflow {workflow} stepping at {node}"),
            Self::Removed { workflow, reason } => {
                write!(f, "workflow {workflow} removed: {reason}")
            }
            Self::Completed {
                workflow,
                final_node,
            } => write!(f, "workflow {workflow} completed at {final_node}"),
            Self::RefreshStarted { actions } => {
                write!(f, "memory refresh started over {actions} actions")
            }
            Self::RefreshFinished { refreshed, failed } => {
                write!(f, "memory refresh finished: {refreshed} ok, {failed} failed")
            }
        }
    }
}

/// Cloneable sending side of the event bus.
#[derive(Clone, Debug)]
pub struct EventSender {
    sender: flume::Sender<WorkflowEvent>,
}

impl EventSender {
    /// Emit an event; a disconnected bus is tolerated silently (the run
    /// must not care whether anyone is listening).
    pub fn emit(&self, event: WorkflowEvent) {
        let _ = self.sender.send(event);
    }

    /// A sender connected to nothing, for tests and standalone use.
    #[must_use]
    pub fn disconnected() -> Self {
        let (sender, _) = flume::unbounded();
        Self { sender }
    }
}

/// Receives workflow events and drains them into tracing.
pub struct EventBus {
    channel: (flume::Sender<WorkflowEvent>, flume::Receiver<WorkflowEvent>),
    listener: Arc<Mutex<Option<ListenerState>>>,
}

struct ListenerState {
    shutdown_tx: oneshot::Sender<()>,
    handle: task::JoinHandle<()>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            channel: flume::unbounded(),
            listener: Arc::new(Mutex::new(None)),
        }
    }

    #[must_use]
    pub fn sender(&self) -> EventSender {
        EventSender {
            sender: self.channel.0.clone(),
        }
    }

    /// Direct access to the receiving side, for callers that want the raw
    /// stream instead of the tracing drain.
    #[must_use]
    pub fn receiver(&self) -> flume::Receiver<WorkflowEvent> {
        self.channel.1.clone()
    }

    /// Spawn the background drain task. Idempotent.
    pub fn listen(&self) {
        let mut guard = self.listener.lock();
        if guard.is_some() {
            return;
        }
        let receiver = self.channel.1.clone();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let handle = task::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    received = receiver.recv_async() => match received {
                        Err(_) => break,
                        Ok(event) => tracing::info!(target: "triagegraph::events", %event),
                    }
                }
            }
        });
        *guard = Some(ListenerState {
            shutdown_tx,
            handle,
        });
    }

    /// Stop the drain task and wait for it to exit.
    pub async fn stop(&self) {
        let state = self.listener.lock().take();
        if let Some(state) = state {
            let _ = state.shutdown_tx.send(());
            let _ = state.handle.await;
        }
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        if let Some(state) = self.listener.lock().take() {
            let _ = state.shutdown_tx.send(());
            state.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_reach_receiver() {
        let bus = EventBus::new();
        let sender = bus.sender();
        let receiver = bus.receiver();
        let id = uuid::Uuid::new_v4();
        sender.emit(WorkflowEvent::Created {
            workflow: id,
            start_node: "e1".to_string(),
        });
        let event = receiver.recv_async().await.unwrap();
        assert!(matches!(event, WorkflowEvent::Created { workflow, .. } if workflow == id));
    }

    #[tokio::test]
    async fn disconnected_sender_does_not_panic() {
        let sender = EventSender::disconnected();
        sender.emit(WorkflowEvent::RefreshStarted { actions: 0 });
    }

    #[tokio::test]
    async fn listener_is_idempotent_and_stoppable() {
        let bus = EventBus::new();
        bus.listen();
        bus.listen();
        bus.stop().await;
    }
}

//! Per-workflow step orchestration.
//!
//! [`GraphExecutor`] drives one graph run: it seeds a workflow at the
//! graph's start node, dispatches each step on the current node's kind,
//! calls the stage layer for conclusions, persists memory records, and
//! asks the traversal state machine for the next cursor position. Forked
//! branches get their own tasks under the [`WorkflowManager`]; any error
//! inside one branch's step loop removes that branch only.

use std::sync::Arc;

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::instrument;

use crate::events::{EventSender, WorkflowEvent};
use crate::graph::{Graph, Node};
use crate::memory::{MemoryRecord, MemoryStore};
use crate::oracle::{ActionError, ActionExecutor};
use crate::stage::{ParsedAction, Stage, StageError};
use crate::state::NodeAnnotations;
use crate::subject::Subject;
use crate::traversal::{self, GroupSinkMode, Transition, TraversalError};
use crate::types::NodeKind;
use crate::workflow::{CancelFlag, Workflow, WorkflowManager};

/// Behavior toggles for one executor instance.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExecutorOptions {
    /// Fork one speculative sibling workflow per reachable branch before
    /// running a decision node's action.
    pub fork_reachable: bool,
    /// Treat an unmatched group edge as a dead end instead of completion.
    pub strict_groups: bool,
}

impl ExecutorOptions {
    fn sink_mode(&self) -> GroupSinkMode {
        if self.strict_groups {
            GroupSinkMode::Strict
        } else {
            GroupSinkMode::Complete
        }
    }
}

/// Errors that end one workflow's step loop.
///
/// These never cross workflow boundaries: the task catches them, logs,
/// and removes itself.
#[derive(Debug, Error, Diagnostic)]
pub enum ExecutorError {
    #[error("workflow cursor points at unknown node {node_id}")]
    #[diagnostic(code(triagegraph::executor::unknown_node))]
    UnknownNode { node_id: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Traversal(#[from] TraversalError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Stage(#[from] StageError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Action(#[from] ActionError),
}

enum StepOutcome {
    Continue,
    Finished { final_node: String },
}

/// Everything a workflow task needs, shared across branches.
struct ExecutorShared {
    graph: Arc<Graph>,
    annotations: Arc<NodeAnnotations>,
    memory: Arc<MemoryStore>,
    subject: Subject,
    action_executor: Arc<dyn ActionExecutor>,
    /// Tool-mode stage proposing a command when a decision node has none.
    thinking_stage: Arc<Stage>,
    /// Conclusion-mode stage matching observations against edge labels.
    extract_stage: Arc<Stage>,
    /// Raw-mode stage producing free-text group conclusions.
    conclusion_stage: Arc<Stage>,
    manager: WorkflowManager,
    events: EventSender,
    options: ExecutorOptions,
}

/// Drives a full diagnosis run over one graph.
pub struct GraphExecutor {
    shared: Arc<ExecutorShared>,
}

/// Assembles a [`GraphExecutor`] from its collaborators.
#[derive(Default)]
pub struct GraphExecutorBuilder {
    graph: Option<Arc<Graph>>,
    annotations: Option<Arc<NodeAnnotations>>,
    memory: Option<Arc<MemoryStore>>,
    subject: Subject,
    action_executor: Option<Arc<dyn ActionExecutor>>,
    thinking_stage: Option<Arc<Stage>>,
    extract_stage: Option<Arc<Stage>>,
    conclusion_stage: Option<Arc<Stage>>,
    events: Option<EventSender>,
    options: ExecutorOptions,
}

impl GraphExecutorBuilder {
    #[must_use]
    pub fn graph(mut self, graph: Arc<Graph>) -> Self {
        self.graph = Some(graph);
        self
    }

    #[must_use]
    pub fn annotations(mut self, annotations: Arc<NodeAnnotations>) -> Self {
        self.annotations = Some(annotations);
        self
    }

    #[must_use]
    pub fn memory(mut self, memory: Arc<MemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    #[must_use]
    pub fn subject(mut self, subject: Subject) -> Self {
        self.subject = subject;
        self
    }

    #[must_use]
    pub fn action_executor(mut self, action_executor: Arc<dyn ActionExecutor>) -> Self {
        self.action_executor = Some(action_executor);
        self
    }

    #[must_use]
    pub fn thinking_stage(mut self, stage: Arc<Stage>) -> Self {
        self.thinking_stage = Some(stage);
        self
    }

    #[must_use]
    pub fn extract_stage(mut self, stage: Arc<Stage>) -> Self {
        self.extract_stage = Some(stage);
        self
    }

    #[must_use]
    pub fn conclusion_stage(mut self, stage: Arc<Stage>) -> Self {
        self.conclusion_stage = Some(stage);
        self
    }

    #[must_use]
    pub fn events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    #[must_use]
    pub fn options(mut self, options: ExecutorOptions) -> Self {
        self.options = options;
        self
    }

    /// # Panics
    ///
    /// Panics when a required collaborator is missing; executors are
    /// assembled once at startup, so this is a programming error, not a
    /// runtime condition.
    #[must_use]
    pub fn build(self) -> GraphExecutor {
        let events = self.events.unwrap_or_else(EventSender::disconnected);
        GraphExecutor {
            shared: Arc::new(ExecutorShared {
                graph: self.graph.expect("graph is required"),
                annotations: self.annotations.expect("annotations are required"),
                memory: self.memory.expect("memory store is required"),
                subject: self.subject,
                action_executor: self.action_executor.expect("action executor is required"),
                thinking_stage: self.thinking_stage.expect("thinking stage is required"),
                extract_stage: self.extract_stage.expect("extract stage is required"),
                conclusion_stage: self.conclusion_stage.expect("conclusion stage is required"),
                manager: WorkflowManager::new(events.clone()),
                events,
                options: self.options,
            }),
        }
    }
}

impl GraphExecutor {
    #[must_use]
    pub fn builder() -> GraphExecutorBuilder {
        GraphExecutorBuilder::default()
    }

    /// Run the graph to completion.
    ///
    /// Seeds one workflow at the graph's start node and blocks until
    /// every branch (including forks registered mid-run) has finished.
    /// Results are observable through the memory store; per-branch
    /// failures are logged, not returned.
    #[instrument(skip(self), fields(graph = %self.shared.graph.graph_id))]
    pub async fn execute(&self) {
        let start = self.shared.graph.start_node_id().clone();
        let workflow = self.shared.manager.create_workflow(start, None);
        spawn_workflow(Arc::clone(&self.shared), workflow);
        self.shared.manager.run_all_tasks().await;
        tracing::info!("graph run complete");
    }

    /// The manager supervising this executor's branches.
    #[must_use]
    pub fn manager(&self) -> &WorkflowManager {
        &self.shared.manager
    }
}

fn spawn_workflow(shared: Arc<ExecutorShared>, workflow: Workflow) {
    let workflow_id = workflow.workflow_id;
    let cancel = shared
        .manager
        .cancel_flag(&workflow_id)
        .unwrap_or_default();
    let task_shared = Arc::clone(&shared);
    let handle = tokio::spawn(run_workflow(task_shared, workflow, cancel));
    shared.manager.add_task(workflow_id, handle);
}

async fn run_workflow(shared: Arc<ExecutorShared>, mut workflow: Workflow, cancel: CancelFlag) {
    let workflow_id = workflow.workflow_id;
    loop {
        if cancel.is_cancelled() {
            tracing::debug!(workflow = %workflow_id, "cancelled at step boundary");
            break;
        }
        match step(&shared, &mut workflow).await {
            Ok(StepOutcome::Continue) => {}
            Ok(StepOutcome::Finished { final_node }) => {
                shared.events.emit(WorkflowEvent::Completed {
                    workflow: workflow_id,
                    final_node,
                });
                break;
            }
            Err(error) => {
                tracing::warn!(
                    workflow = %workflow_id,
                    node = %workflow.current_node_id,
                    %error,
                    "workflow step failed; removing branch"
                );
                shared
                    .manager
                    .remove_workflow(&workflow_id, error.to_string());
                return;
            }
        }
    }
}

/// Execute one step of a workflow: process the current node, then advance.
async fn step(
    shared: &Arc<ExecutorShared>,
    workflow: &mut Workflow,
) -> Result<StepOutcome, ExecutorError> {
    let node_id = workflow.current_node_id.clone();
    let node = shared
        .graph
        .get_node(&node_id)
        .cloned()
        .ok_or(ExecutorError::UnknownNode {
            node_id: node_id.clone(),
        })?;

    workflow.visit();
    shared.events.emit(WorkflowEvent::Step {
        workflow: workflow.workflow_id,
        node: node_id.clone(),
    });

    let transition = match node.kind {
        NodeKind::Entry => traversal::advance(&shared.graph, &node_id, None)?,
        NodeKind::Decision => {
            shared.annotations.begin_execution(&node_id);
            let conclusion = decision_step(shared, workflow, &node).await?;
            shared.annotations.complete_execution(&node_id);
            traversal::advance_with_mode(
                &shared.graph,
                &node_id,
                Some(&conclusion),
                shared.options.sink_mode(),
            )?
        }
        NodeKind::Terminal => {
            shared.annotations.begin_execution(&node_id);
            shared
                .memory
                .store(MemoryRecord::error(node.description.clone(), &node_id));
            shared.annotations.complete_execution(&node_id);
            return Ok(StepOutcome::Finished {
                final_node: node_id,
            });
        }
        NodeKind::Group => {
            shared.annotations.begin_execution(&node_id);
            let conclusion = group_step(shared, workflow, &node).await?;
            shared.annotations.complete_execution(&node_id);
            traversal::advance_with_mode(
                &shared.graph,
                &node_id,
                Some(&conclusion),
                shared.options.sink_mode(),
            )?
        }
    };

    match transition {
        Transition::To(next) => {
            workflow.set_current(next);
            Ok(StepOutcome::Continue)
        }
        Transition::Complete => Ok(StepOutcome::Finished {
            final_node: node_id,
        }),
    }
}

/// Run a decision node: resolve its action, observe, conclude, remember.
async fn decision_step(
    shared: &Arc<ExecutorShared>,
    workflow: &mut Workflow,
    node: &Node,
) -> Result<String, ExecutorError> {
    // Speculative branch exploration happens before the action runs so
    // siblings overlap with this node's oracle latency.
    if shared.options.fork_reachable {
        for target in node.reachable_targets() {
            let child = workflow.fork(target.clone());
            shared.manager.track(&child);
            shared.events.emit(WorkflowEvent::Forked {
                parent: workflow.workflow_id,
                child: child.workflow_id,
                branch_node: target,
            });
            spawn_workflow(Arc::clone(shared), child);
        }
    }

    let action = if node.action.is_empty() {
        propose_action(shared, node).await?
    } else {
        node.action.clone()
    };

    let observation = shared.action_executor.execute(&action).await?;

    let conclusion = if let Some(pattern) = &node.regex {
        crate::utils::regex_ext::extract_with_pattern(&observation, pattern)
    } else {
        let labels = node.condition_labels();
        let mut variables = FxHashMap::default();
        variables.insert("raw_input".to_string(), observation.clone());
        variables.insert("question".to_string(), node.question.clone());
        variables.insert("details".to_string(), shared.subject.info());
        let conclusion = shared
            .extract_stage
            .conclude(&variables, &labels)
            .await?;
        shared.annotations.add_oracle_calls(
            &node.node_id,
            shared.extract_stage.self_consistency() as u32,
        );
        conclusion
    };

    workflow
        .overlay
        .record(&shared.annotations, &node.node_id, conclusion.clone());

    shared.memory.store(MemoryRecord::new(
        action,
        observation,
        node.description.clone(),
        node.question.clone(),
        &node.node_id,
    ));

    Ok(conclusion)
}

/// Ask the tool-mode stage for a command when the node brings none.
///
/// History context comes from the memory store's digest, so later nodes
/// see what earlier ones already observed.
async fn propose_action(
    shared: &Arc<ExecutorShared>,
    node: &Node,
) -> Result<String, ExecutorError> {
    let mut variables = FxHashMap::default();
    variables.insert("history".to_string(), shared.memory.summaries());
    variables.insert("question".to_string(), node.question.clone());
    variables.insert("details".to_string(), shared.subject.info());

    let parsed = shared.thinking_stage.invoke_tool(&variables).await?;
    shared.annotations.add_oracle_calls(
        &node.node_id,
        shared.thinking_stage.self_consistency() as u32,
    );

    let command = match parsed {
        ParsedAction::Invoke { tool, args } => {
            let mut command = tool;
            for (key, value) in args {
                command.push(' ');
                command.push_str(&key);
                command.push('=');
                command.push_str(&value);
            }
            command
        }
        ParsedAction::Finish { output } => output,
    };
    tracing::debug!(node = %node.node_id, command = %command, "adopted proposed action");
    Ok(command)
}

/// Aggregate a group's children into one conclusion.
async fn group_step(
    shared: &Arc<ExecutorShared>,
    workflow: &mut Workflow,
    node: &Node,
) -> Result<String, ExecutorError> {
    let mut execution_summary = String::new();
    let mut error_summary = String::new();

    for child in shared.graph.children_of(&node.node_id) {
        match child.kind {
            NodeKind::Decision => {
                let conclusion = workflow
                    .overlay
                    .conclusion(&shared.annotations, &child.node_id)
                    .unwrap_or_else(|| "unresolved".to_string());
                execution_summary.push_str(&format!(
                    "question: {}\naction: {}\ndescription: {}\nconclusion: {}\n\n",
                    child.question, child.action, child.description, conclusion
                ));
            }
            NodeKind::Terminal => {
                error_summary.push_str(&format!("{}\n", child.description));
            }
            NodeKind::Entry | NodeKind::Group => {}
        }
    }

    let mut variables = FxHashMap::default();
    variables.insert("question".to_string(), node.question.clone());
    variables.insert("description".to_string(), node.description.clone());
    variables.insert("details".to_string(), shared.subject.info());
    variables.insert("history".to_string(), execution_summary);
    variables.insert("errors".to_string(), error_summary);

    let conclusion = shared.conclusion_stage.invoke_raw(&variables).await?;
    shared.annotations.add_oracle_calls(
        &node.node_id,
        shared.conclusion_stage.self_consistency() as u32,
    );

    workflow
        .overlay
        .record(&shared.annotations, &node.node_id, conclusion.clone());
    Ok(conclusion)
}

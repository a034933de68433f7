//! Shared fixtures: scripted oracles, recording action executors, and
//! graph/stage builders used across the integration suites.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use triagegraph::oracle::{ActionError, ActionExecutor, Oracle, OracleError};
use triagegraph::stage::{
    FixingPolicy, MemoryStrategy, PromptTemplate, Stage, StageConfig, StructuredJsonParser,
};

/// Oracle that replies with the same text to every prompt.
pub struct FixedOracle {
    pub reply: String,
    pub calls: AtomicUsize,
}

impl FixedOracle {
    pub fn new(reply: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.into(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Oracle for FixedOracle {
    async fn complete(&self, _prompt: &str) -> Result<String, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }
}

/// Oracle that pops scripted replies in order and fails when exhausted.
pub struct ScriptedOracle {
    replies: Mutex<VecDeque<String>>,
}

impl ScriptedOracle {
    pub fn new<I, S>(replies: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
        })
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn complete(&self, _prompt: &str) -> Result<String, OracleError> {
        self.replies
            .lock()
            .pop_front()
            .ok_or_else(|| OracleError::new("script exhausted"))
    }
}

/// Oracle that always errors.
pub struct FailingOracle;

#[async_trait]
impl Oracle for FailingOracle {
    async fn complete(&self, _prompt: &str) -> Result<String, OracleError> {
        Err(OracleError::new("oracle unavailable"))
    }
}

/// Action executor that returns a fixed observation and records the
/// actions it was asked to run, in order.
pub struct RecordingExecutor {
    pub observation: String,
    pub invocations: Mutex<Vec<String>>,
}

impl RecordingExecutor {
    pub fn new(observation: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            observation: observation.into(),
            invocations: Mutex::new(Vec::new()),
        })
    }

    pub fn invoked(&self) -> Vec<String> {
        self.invocations.lock().clone()
    }
}

#[async_trait]
impl ActionExecutor for RecordingExecutor {
    async fn execute(&self, action: &str) -> Result<String, ActionError> {
        self.invocations.lock().push(action.to_string());
        Ok(self.observation.clone())
    }
}

/// Deterministic stage config: sequential sampling, no repair.
pub fn sequential_config(self_consistency: usize) -> StageConfig {
    StageConfig {
        self_consistency,
        fixing: None,
        sample_concurrency: 1,
        memory: MemoryStrategy::Discard,
    }
}

/// Conclusion-mode stage over the standard extraction variables.
pub fn extract_stage(oracle: Arc<dyn Oracle>, self_consistency: usize) -> Arc<Stage> {
    Arc::new(
        Stage::new(
            oracle,
            Arc::new(StructuredJsonParser),
            PromptTemplate::new("{question}\n{raw_input}\n{details}").unwrap(),
            sequential_config(self_consistency),
        )
        .unwrap(),
    )
}

/// Tool-mode stage over the thinking variables, with optional repair.
pub fn thinking_stage(
    oracle: Arc<dyn Oracle>,
    repair: Option<(Arc<dyn Oracle>, FixingPolicy)>,
) -> Arc<Stage> {
    let mut config = sequential_config(1);
    if let Some((_, policy)) = &repair {
        config.fixing = Some(*policy);
    }
    let mut stage = Stage::new(
        oracle,
        Arc::new(StructuredJsonParser),
        PromptTemplate::new("{history}\n{question}\n{details}").unwrap(),
        config,
    )
    .unwrap();
    if let Some((repair_oracle, _)) = repair {
        stage = stage.with_repair(
            repair_oracle,
            PromptTemplate::new("{error}\n{raw_action}\n{cur_action}").unwrap(),
        );
    }
    Arc::new(stage)
}

/// Raw-mode stage over the group aggregation variables.
pub fn conclusion_stage(oracle: Arc<dyn Oracle>) -> Arc<Stage> {
    Arc::new(
        Stage::new(
            oracle,
            Arc::new(StructuredJsonParser),
            PromptTemplate::new("{question}\n{description}\n{details}\n{history}\n{errors}")
                .unwrap(),
            sequential_config(1),
        )
        .unwrap(),
    )
}

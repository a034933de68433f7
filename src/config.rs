//! Runtime configuration.
//!
//! Defaults match the engine's normal operating point; every knob can be
//! overridden through `TRIAGEGRAPH_*` environment variables (a `.env`
//! file is honored via dotenvy).

use std::time::Duration;

use crate::executor::ExecutorOptions;
use crate::stage::{FixingPolicy, MemoryStrategy, StageConfig};

/// Tunables for a diagnosis run.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Interval between memory refresh sweeps.
    pub refresh_interval: Duration,
    /// Concurrent per-question extractions during refresh.
    pub refresh_concurrency: usize,
    /// Samples for the extraction (conclusion) stage.
    pub extract_consistency: usize,
    /// Samples for the thinking (tool) stage.
    pub thinking_consistency: usize,
    /// Concurrent in-flight oracle calls while sampling.
    pub sample_concurrency: usize,
    /// Repair policy for the thinking stage; `None` disables repair.
    pub fixing: Option<FixingPolicy>,
    pub executor: ExecutorOptions,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(60),
            refresh_concurrency: 5,
            extract_consistency: 11,
            thinking_consistency: 7,
            sample_concurrency: 4,
            fixing: Some(FixingPolicy::default()),
            executor: ExecutorOptions::default(),
        }
    }
}

impl RuntimeConfig {
    /// Defaults overlaid with `TRIAGEGRAPH_*` environment variables.
    ///
    /// Unparsable values fall back to the default for that knob; a bad
    /// env var should degrade, not wedge startup.
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let mut config = Self::default();

        if let Some(secs) = env_parse::<u64>("TRIAGEGRAPH_REFRESH_SECS") {
            config.refresh_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(value) = env_parse::<usize>("TRIAGEGRAPH_REFRESH_CONCURRENCY") {
            config.refresh_concurrency = value.max(1);
        }
        if let Some(value) = env_parse::<usize>("TRIAGEGRAPH_EXTRACT_CONSISTENCY") {
            config.extract_consistency = value.max(1);
        }
        if let Some(value) = env_parse::<usize>("TRIAGEGRAPH_THINKING_CONSISTENCY") {
            config.thinking_consistency = value.max(1);
        }
        if let Some(value) = env_parse::<usize>("TRIAGEGRAPH_SAMPLE_CONCURRENCY") {
            config.sample_concurrency = value.max(1);
        }
        if let Some(rounds) = env_parse::<u32>("TRIAGEGRAPH_FIXING_ROUNDS") {
            config.fixing = if rounds == 0 {
                None
            } else {
                Some(FixingPolicy {
                    rounds,
                    dynamic: env_parse::<bool>("TRIAGEGRAPH_DYNAMIC_FIXING").unwrap_or(true),
                })
            };
        }
        if let Some(value) = env_parse::<bool>("TRIAGEGRAPH_FORK_REACHABLE") {
            config.executor.fork_reachable = value;
        }
        if let Some(value) = env_parse::<bool>("TRIAGEGRAPH_STRICT_GROUPS") {
            config.executor.strict_groups = value;
        }
        config
    }

    /// Sampling config for the extraction (conclusion) stage.
    #[must_use]
    pub fn extract_stage_config(&self) -> StageConfig {
        StageConfig {
            self_consistency: self.extract_consistency,
            fixing: None,
            sample_concurrency: self.sample_concurrency,
            memory: MemoryStrategy::Discard,
        }
    }

    /// Sampling config for the thinking (tool) stage, repair included.
    #[must_use]
    pub fn thinking_stage_config(&self) -> StageConfig {
        StageConfig {
            self_consistency: self.thinking_consistency,
            fixing: self.fixing,
            sample_concurrency: self.sample_concurrency,
            memory: MemoryStrategy::Discard,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(var = name, value = %raw, "unparsable environment override ignored");
            None
        }
    }
}

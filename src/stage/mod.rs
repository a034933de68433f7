//! Reasoning invocation with self-consistency, repair, and voting.
//!
//! A [`Stage`] wraps one logical call to the reasoning oracle and makes it
//! robust to malformed or inconsistent output:
//!
//! 1. **Sampling** — the same rendered prompt is issued
//!    `self_consistency` times (bounded concurrency, order-preserving);
//! 2. **Repair** — outputs that fail structured parsing are re-prompted to
//!    a repair oracle with the parse diagnostic, under a global budget of
//!    `rounds × N` so a batch of bad outputs cannot retry unboundedly;
//! 3. **Voting** — the surviving outputs are reduced to one answer by one
//!    of three selection modes: tool-signature majority
//!    ([`Stage::invoke_tool`]), permissible-label matching
//!    ([`Stage::conclude`]), or plain most-common-output
//!    ([`Stage::invoke_raw`]).
//!
//! The three modes replace what used to be a stage class hierarchy; the
//! differences are selection policy, not structure, so they are methods on
//! one configured type.

pub mod parser;
pub mod prompt;

pub use parser::{OutputParser, ParseError, ParsedAction, StructuredJsonParser, match_conclusion};
pub use prompt::{PromptError, PromptRegistry, PromptTemplate};

use std::sync::Arc;

use futures_util::StreamExt;
use miette::Diagnostic;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::instrument;

use crate::oracle::{Oracle, OracleError};

/// Bounded repair configuration.
#[derive(Clone, Copy, Debug)]
pub struct FixingPolicy {
    /// Repair rounds available to each individual output.
    pub rounds: u32,
    /// Spend leftover budget on a second pass over already-repaired
    /// outputs.
    pub dynamic: bool,
}

impl Default for FixingPolicy {
    fn default() -> Self {
        Self {
            rounds: 3,
            dynamic: true,
        }
    }
}

/// What a stage does with the outputs it selects.
///
/// Two variants cover every need the engine has; anything richer belongs
/// to the caller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MemoryStrategy {
    /// Keep nothing.
    #[default]
    Discard,
    /// Append every selected output to an inspectable buffer.
    RecordOutputs,
}

/// Sampling and selection configuration for a [`Stage`].
#[derive(Clone, Debug)]
pub struct StageConfig {
    /// Independent oracle samples per invocation. Must be at least 1.
    pub self_consistency: usize,
    /// Repair policy; `None` disables repair entirely.
    pub fixing: Option<FixingPolicy>,
    /// Concurrent in-flight oracle calls while sampling.
    pub sample_concurrency: usize,
    pub memory: MemoryStrategy,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            self_consistency: 1,
            fixing: None,
            sample_concurrency: 4,
            memory: MemoryStrategy::Discard,
        }
    }
}

/// Errors surfaced by a stage invocation.
///
/// Parse failures during sampling are handled internally by the repair
/// loop; only exhaustion of every recovery path reaches the caller.
#[derive(Debug, Error, Diagnostic)]
pub enum StageError {
    #[error("oracle produced no outputs")]
    #[diagnostic(
        code(triagegraph::stage::empty_generation),
        help("Every sampling call failed; check the oracle endpoint.")
    )]
    EmptyGeneration,

    #[error("no output could be parsed after repair")]
    #[diagnostic(code(triagegraph::stage::no_parsable_output))]
    NoParsableOutput {
        /// Diagnostic from the last failed parse attempt.
        last_error: String,
    },

    #[error("no unambiguous conclusion in {text:?}")]
    #[diagnostic(
        code(triagegraph::stage::ambiguous_conclusion),
        help("The output must contain exactly one of the permissible labels.")
    )]
    AmbiguousConclusion {
        text: String,
        candidates: Vec<String>,
    },

    #[error("self_consistency must be at least 1")]
    #[diagnostic(code(triagegraph::stage::invalid_config))]
    InvalidConfig,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Prompt(#[from] PromptError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Oracle(#[from] OracleError),
}

/// One configured call site against the reasoning oracle.
pub struct Stage {
    oracle: Arc<dyn Oracle>,
    repair_oracle: Arc<dyn Oracle>,
    parser: Arc<dyn OutputParser>,
    template: PromptTemplate,
    repair_template: Option<PromptTemplate>,
    config: StageConfig,
    recorded: Mutex<Vec<String>>,
}

impl Stage {
    /// Build a stage. `repair_oracle` falls back to the sampling oracle
    /// and `repair_template` is only required when fixing is enabled.
    pub fn new(
        oracle: Arc<dyn Oracle>,
        parser: Arc<dyn OutputParser>,
        template: PromptTemplate,
        config: StageConfig,
    ) -> Result<Self, StageError> {
        if config.self_consistency < 1 {
            return Err(StageError::InvalidConfig);
        }
        Ok(Self {
            repair_oracle: oracle.clone(),
            oracle,
            parser,
            template,
            repair_template: None,
            config,
            recorded: Mutex::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn with_repair(
        mut self,
        repair_oracle: Arc<dyn Oracle>,
        repair_template: PromptTemplate,
    ) -> Self {
        self.repair_oracle = repair_oracle;
        self.repair_template = Some(repair_template);
        self
    }

    /// Samples issued per invocation.
    #[must_use]
    pub fn self_consistency(&self) -> usize {
        self.config.self_consistency
    }

    /// Outputs retained under [`MemoryStrategy::RecordOutputs`].
    #[must_use]
    pub fn recorded_outputs(&self) -> Vec<String> {
        self.recorded.lock().clone()
    }

    fn remember(&self, output: &str) {
        if self.config.memory == MemoryStrategy::RecordOutputs {
            self.recorded.lock().push(output.to_string());
        }
    }

    /// Render the prompt and collect up to `self_consistency` completions.
    ///
    /// Individual call failures are logged and dropped; only a fully
    /// failed batch is fatal.
    async fn sample(&self, variables: &FxHashMap<String, String>) -> Result<Vec<String>, StageError> {
        let prompt = self.template.render(variables)?;
        let results: Vec<Result<String, OracleError>> =
            futures_util::stream::iter((0..self.config.self_consistency).map(|_| {
                let prompt = prompt.clone();
                let oracle = self.oracle.clone();
                async move { oracle.complete(&prompt).await }
            }))
            .buffered(self.config.sample_concurrency.max(1))
            .collect()
            .await;

        let mut outputs = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(output) => outputs.push(output),
                Err(error) => {
                    tracing::warn!(%error, "oracle sample failed; dropping");
                }
            }
        }
        if outputs.is_empty() {
            return Err(StageError::EmptyGeneration);
        }
        Ok(outputs)
    }

    /// Run the bounded repair protocol over a batch of raw outputs.
    ///
    /// Each output gets up to `rounds` attempts; a shared budget of
    /// `rounds × N` caps the whole batch. With `dynamic` set, budget left
    /// after the first pass is spent on a second sweep.
    async fn repair(&self, outputs: Vec<String>) -> Vec<String> {
        let Some(policy) = self.config.fixing else {
            return outputs;
        };
        let mut budget = policy.rounds as i64 * outputs.len() as i64;

        let mut repaired = Vec::with_capacity(outputs.len());
        for output in outputs {
            repaired.push(self.repair_one(output, policy.rounds, &mut budget).await);
        }

        if policy.dynamic && budget > 0 {
            let mut second_pass = Vec::with_capacity(repaired.len());
            for output in repaired {
                if budget > 0 {
                    second_pass.push(self.repair_one(output, policy.rounds, &mut budget).await);
                } else {
                    second_pass.push(output);
                }
            }
            repaired = second_pass;
        }
        repaired
    }

    async fn repair_one(&self, mut output: String, rounds: u32, budget: &mut i64) -> String {
        let raw = output.clone();
        let mut attempt = 0;
        while attempt < rounds && *budget > 0 {
            let Err(parse_error) = self.parser.parse(&output) else {
                break;
            };
            attempt += 1;
            *budget -= 1;

            let Some(template) = &self.repair_template else {
                tracing::warn!("fixing enabled without a repair template; skipping repair");
                break;
            };
            let prompt = match render_repair_prompt(
                template,
                &parse_error.diagnostic,
                &raw,
                &output,
                &self.parser.format_instructions(),
            ) {
                Ok(prompt) => prompt,
                Err(error) => {
                    tracing::warn!(%error, "repair prompt render failed");
                    break;
                }
            };
            match self.repair_oracle.complete(&prompt).await {
                Ok(fixed) => {
                    tracing::debug!(attempt, "applied repair round");
                    output = fixed;
                }
                Err(error) => {
                    tracing::warn!(%error, "repair oracle call failed");
                    break;
                }
            }
        }
        output
    }

    /// Tool mode: signature-majority voting over parsed outputs.
    ///
    /// Returns the parsed action of the winning output. The winner is the
    /// most frequent signature (ties broken by first occurrence); among
    /// outputs sharing it, the median-length one is chosen so neither the
    /// tersest nor the most verbose sample dominates.
    #[instrument(skip(self, variables), err)]
    pub async fn invoke_tool(
        &self,
        variables: &FxHashMap<String, String>,
    ) -> Result<ParsedAction, StageError> {
        let outputs = self.repair(self.sample(variables).await?).await;
        let (selected, action) = select_by_signature(&outputs, self.parser.as_ref())?;
        self.remember(&selected);
        Ok(action)
    }

    /// Conclusion mode: match each sample against a finite label list.
    ///
    /// A sample containing exactly one label votes for it; the label with
    /// the most votes wins (ties broken by first vote). If no sample
    /// produces exactly one match the invocation fails with the candidate
    /// list for diagnosis.
    #[instrument(skip(self, variables, labels), err)]
    pub async fn conclude(
        &self,
        variables: &FxHashMap<String, String>,
        labels: &[String],
    ) -> Result<String, StageError> {
        let outputs = self.sample(variables).await?;
        let mut votes: Vec<(String, usize)> = Vec::new();
        for output in &outputs {
            if let Ok(label) = match_conclusion(output, labels) {
                match votes.iter_mut().find(|(candidate, _)| candidate == label) {
                    Some((_, count)) => *count += 1,
                    None => votes.push((label.to_string(), 1)),
                }
            }
        }
        // Strictly-greater keeps the earliest label on ties.
        let mut winner: Option<&(String, usize)> = None;
        for vote in &votes {
            if winner.is_none_or(|(_, best)| vote.1 > *best) {
                winner = Some(vote);
            }
        }
        let Some((winner, _)) = winner else {
            return Err(StageError::AmbiguousConclusion {
                text: outputs.last().cloned().unwrap_or_default(),
                candidates: labels.to_vec(),
            });
        };
        self.remember(winner);
        Ok(winner.clone())
    }

    /// Raw mode: plain most-common-output vote, ties broken by first
    /// occurrence. Used for free-text group conclusions.
    #[instrument(skip(self, variables), err)]
    pub async fn invoke_raw(
        &self,
        variables: &FxHashMap<String, String>,
    ) -> Result<String, StageError> {
        let outputs = self.sample(variables).await?;
        let mut counts: Vec<(&String, usize)> = Vec::new();
        for output in &outputs {
            match counts.iter_mut().find(|(candidate, _)| *candidate == output) {
                Some((_, count)) => *count += 1,
                None => counts.push((output, 1)),
            }
        }
        // Strictly-greater keeps the earliest output on ties.
        let mut winner: Option<(&String, usize)> = None;
        for (candidate, count) in &counts {
            if winner.is_none_or(|(_, best)| *count > best) {
                winner = Some((*candidate, *count));
            }
        }
        let winner = winner
            .map(|(output, _)| output.clone())
            .expect("sample() guarantees at least one output");
        self.remember(&winner);
        Ok(winner)
    }
}

fn render_repair_prompt(
    template: &PromptTemplate,
    error: &str,
    raw_action: &str,
    cur_action: &str,
    format_instructions: &str,
) -> Result<String, PromptError> {
    let mut variables = FxHashMap::default();
    variables.insert("error".to_string(), error.to_string());
    variables.insert("raw_action".to_string(), raw_action.to_string());
    variables.insert("cur_action".to_string(), cur_action.to_string());
    variables.insert(
        "format_instructions".to_string(),
        format_instructions.to_string(),
    );
    // The template declares which of the known variables it uses.
    variables.retain(|name, _| template.variables().contains(name));
    template.render(&variables)
}

/// Majority vote over tool signatures with median-length tie-break.
///
/// Outputs that still fail to parse are discarded; if none parse the
/// whole batch is rejected with the last parse diagnostic.
fn select_by_signature(
    outputs: &[String],
    parser: &dyn OutputParser,
) -> Result<(String, ParsedAction), StageError> {
    type Signature = (String, Vec<(String, String)>);

    let mut parsed: Vec<(usize, &String, ParsedAction, Signature)> = Vec::new();
    let mut last_error = String::new();
    for (index, output) in outputs.iter().enumerate() {
        match parser.parse(output) {
            Ok(action) => {
                let signature = action.signature();
                parsed.push((index, output, action, signature));
            }
            Err(error) => last_error = error.diagnostic,
        }
    }
    if parsed.is_empty() {
        return Err(StageError::NoParsableOutput { last_error });
    }

    // Count signatures; ties go to the signature seen first.
    let mut tally: Vec<(&Signature, usize, usize)> = Vec::new();
    for (index, _, _, signature) in &parsed {
        match tally.iter_mut().find(|(s, _, _)| *s == signature) {
            Some((_, count, _)) => *count += 1,
            None => tally.push((signature, 1, *index)),
        }
    }
    let (winning_signature, _, _) = tally
        .iter()
        .max_by(|(_, count_a, first_a), (_, count_b, first_b)| {
            count_a.cmp(count_b).then(first_b.cmp(first_a))
        })
        .expect("at least one parsed output");
    let winning_signature = (*winning_signature).clone();

    let mut matched: Vec<(&String, ParsedAction)> = parsed
        .into_iter()
        .filter(|(_, _, _, signature)| *signature == winning_signature)
        .map(|(_, output, action, _)| (output, action))
        .collect();
    matched.sort_by_key(|(output, _)| output.len());
    let middle = matched.len() / 2;
    let (output, action) = matched.swap_remove(middle);
    Ok((output.clone(), action))
}

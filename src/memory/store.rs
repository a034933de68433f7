//! The action-keyed memory store and its background refresher.
//!
//! Records are indexed two ways: an `action -> record` map for O(1)
//! lookup and merge, and a max-heap of `(timestamp, action)` entries so
//! the most recently touched action is served first during refresh.
//! Merged records leave stale heap entries behind; those are detected by
//! timestamp mismatch and skipped on pop.
//!
//! The refresher re-executes every stored action in recency order,
//! re-extracts a conclusion for every associated question (regex if the
//! node has one, extraction stage otherwise), and writes the result onto
//! every node sharing the question. It runs on an interval for as long as
//! the process lives; one bad action never stops the rest of a sweep.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::sync::Semaphore;
use tokio::time::MissedTickBehavior;
use tracing::instrument;

use super::record::MemoryRecord;
use crate::events::{EventSender, WorkflowEvent};
use crate::graph::Graph;
use crate::oracle::ActionExecutor;
use crate::stage::Stage;
use crate::state::NodeAnnotations;
use crate::subject::Subject;
use crate::types::NodeId;
use crate::utils::regex_ext::extract_with_pattern;

/// Heap entry ordering: newest timestamp first, action as tie-break so
/// the order is total and deterministic.
#[derive(Clone, Debug, PartialEq, Eq)]
struct RefreshEntry {
    timestamp: DateTime<Utc>,
    action: String,
}

impl Ord for RefreshEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.action.cmp(&other.action))
    }
}

impl PartialOrd for RefreshEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    heap: BinaryHeap<RefreshEntry>,
    index: FxHashMap<String, MemoryRecord>,
}

/// Outcome counts of one refresh sweep.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub refreshed: usize,
    pub failed: usize,
    pub skipped_stale: usize,
}

/// Shared store of [`MemoryRecord`]s with priority-ordered refresh.
pub struct MemoryStore {
    inner: Mutex<StoreInner>,
    graph: Arc<Graph>,
    annotations: Arc<NodeAnnotations>,
    subject: Subject,
    action_executor: Arc<dyn ActionExecutor>,
    extract_stage: Arc<Stage>,
    events: EventSender,
    refresh_concurrency: usize,
}

impl MemoryStore {
    /// Assemble a store without starting the refresh loop. Use
    /// [`spawn`](Self::spawn) for the normal path.
    pub fn with_parts(
        graph: Arc<Graph>,
        annotations: Arc<NodeAnnotations>,
        subject: Subject,
        action_executor: Arc<dyn ActionExecutor>,
        extract_stage: Arc<Stage>,
        events: EventSender,
        refresh_concurrency: usize,
    ) -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
            graph,
            annotations,
            subject,
            action_executor,
            extract_stage,
            events,
            refresh_concurrency: refresh_concurrency.max(1),
        }
    }

    /// Construct the store and start its background refresh loop.
    ///
    /// The loop runs for the remainder of the process; there is no stop
    /// handle. Must be called from within a tokio runtime.
    pub fn spawn(
        graph: Arc<Graph>,
        annotations: Arc<NodeAnnotations>,
        subject: Subject,
        action_executor: Arc<dyn ActionExecutor>,
        extract_stage: Arc<Stage>,
        events: EventSender,
        refresh_concurrency: usize,
        refresh_interval: Duration,
    ) -> Arc<Self> {
        let store = Arc::new(Self::with_parts(
            graph,
            annotations,
            subject,
            action_executor,
            extract_stage,
            events,
            refresh_concurrency,
        ));
        let looper = Arc::clone(&store);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(refresh_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick of a tokio interval fires immediately;
            // consume it so the first sweep happens one interval in.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                looper.refresh_all().await;
            }
        });
        store
    }

    /// Insert or merge a record.
    ///
    /// An existing record for the same action absorbs the new question
    /// and node associations and adopts the newer timestamp; a heap entry
    /// is pushed either way, leaving any older entry for the same action
    /// to be skipped as stale.
    pub fn store(&self, record: MemoryRecord) {
        let mut inner = self.inner.lock();
        let timestamp = record.timestamp;
        let action = record.action.clone();
        match inner.index.entry(action.clone()) {
            Entry::Occupied(mut slot) => {
                slot.get_mut().merge(&record);
                tracing::debug!(action = %action, "merged record into existing action");
            }
            Entry::Vacant(slot) => {
                slot.insert(record);
                tracing::debug!(action = %action, "stored new action record");
            }
        }
        inner.heap.push(RefreshEntry { timestamp, action });
    }

    /// Look up the live record for an action.
    #[must_use]
    pub fn get(&self, action: &str) -> Option<MemoryRecord> {
        self.inner.lock().index.get(action).cloned()
    }

    /// Administrative removal. Stale heap entries left behind are skipped
    /// on the next sweep.
    pub fn remove(&self, action: &str) -> Option<MemoryRecord> {
        self.inner.lock().index.remove(action)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().index.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().index.is_empty()
    }

    /// Re-execute every stored action in recency order and recompute the
    /// conclusions of every question sharing it.
    ///
    /// The drain order is fixed when the sweep starts; records stored
    /// mid-sweep wait for the next one. Per-action failures are logged
    /// and the record is reinserted untouched.
    #[instrument(skip(self))]
    pub async fn refresh_all(&self) -> RefreshReport {
        let mut report = RefreshReport::default();

        // Drain the heap under the lock, skipping entries superseded by a
        // later store for the same action.
        let batch: Vec<String> = {
            let mut inner = self.inner.lock();
            let mut seen: FxHashSet<String> = FxHashSet::default();
            let mut batch = Vec::new();
            while let Some(entry) = inner.heap.pop() {
                let live = inner
                    .index
                    .get(&entry.action)
                    .is_some_and(|record| record.timestamp == entry.timestamp);
                if live && seen.insert(entry.action.clone()) {
                    batch.push(entry.action);
                } else {
                    report.skipped_stale += 1;
                }
            }
            batch
        };

        self.events.emit(WorkflowEvent::RefreshStarted {
            actions: batch.len(),
        });

        for action in &batch {
            match self.refresh_action(action).await {
                Ok(()) => report.refreshed += 1,
                Err(error) => {
                    report.failed += 1;
                    tracing::warn!(action = %action, %error, "action refresh failed");
                }
            }
        }

        // Reinsert processed actions with their current timestamps.
        {
            let mut inner = self.inner.lock();
            for action in batch {
                let timestamp = inner.index.get(&action).map(|record| record.timestamp);
                if let Some(timestamp) = timestamp {
                    inner.heap.push(RefreshEntry { timestamp, action });
                }
            }
        }

        self.events.emit(WorkflowEvent::RefreshFinished {
            refreshed: report.refreshed,
            failed: report.failed,
        });
        report
    }

    /// Re-run one action and propagate fresh conclusions.
    async fn refresh_action(&self, action: &str) -> Result<(), crate::oracle::ActionError> {
        let Some(snapshot) = self.get(action) else {
            return Ok(()); // removed between drain and processing
        };

        let observation = self.action_executor.execute(action).await?;

        // Per-question re-extraction under bounded concurrency.
        let semaphore = Arc::new(Semaphore::new(self.refresh_concurrency));
        let questions = snapshot.sorted_questions();
        let extractions = questions.iter().map(|(question, node_ids)| {
            let semaphore = Arc::clone(&semaphore);
            let observation = observation.clone();
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore never closed");
                self.extract_for_question(&observation, question.as_str(), node_ids.as_slice())
                    .await;
            }
        });
        futures_util::future::join_all(extractions).await;

        // Commit the fresh observation and bump recency.
        let mut inner = self.inner.lock();
        if let Some(record) = inner.index.get_mut(action) {
            record.observation = observation;
            record.timestamp = Utc::now();
        }
        Ok(())
    }

    /// Compute a conclusion for one question and write it onto every node
    /// sharing it. Extraction failures are logged, never raised; a stale
    /// conclusion is better than a poisoned sweep.
    async fn extract_for_question(&self, observation: &str, question: &str, node_ids: &[&NodeId]) {
        let Some(first) = node_ids
            .first()
            .and_then(|id| self.graph.get_node(id.as_str()))
        else {
            return;
        };

        let conclusion = if let Some(pattern) = &first.regex {
            extract_with_pattern(observation, pattern)
        } else {
            let labels = first.condition_labels();
            let mut variables = FxHashMap::default();
            variables.insert("raw_input".to_string(), observation.to_string());
            variables.insert("question".to_string(), question.to_string());
            variables.insert("details".to_string(), self.subject.info());
            match self.extract_stage.conclude(&variables, &labels).await {
                Ok(conclusion) => conclusion,
                Err(error) => {
                    tracing::warn!(question, %error, "conclusion re-extraction failed");
                    return;
                }
            }
        };

        for node_id in node_ids {
            self.annotations
                .set_conclusion(node_id.as_str(), conclusion.clone());
        }
    }

    /// Deterministic human-readable digest of every stored action.
    ///
    /// Sorted by action key; per question the conclusion shown is the
    /// current annotation of its first (sorted) node. Fed back into later
    /// stage prompts as history context.
    #[must_use]
    pub fn summaries(&self) -> String {
        let inner = self.inner.lock();
        let mut actions: Vec<&MemoryRecord> = inner.index.values().collect();
        actions.sort_by(|a, b| a.action.cmp(&b.action));

        let mut digest = String::new();
        for record in actions {
            digest.push_str(&format!(
                "action: {}\ndescription: {}\n",
                record.action, record.description
            ));
            for (question, node_ids) in record.sorted_questions() {
                let conclusion = node_ids
                    .first()
                    .and_then(|id| self.annotations.conclusion(id.as_str()))
                    .unwrap_or_else(|| "unresolved".to_string());
                digest.push_str(&format!("  {question} -> {conclusion}\n"));
            }
        }
        digest
    }
}

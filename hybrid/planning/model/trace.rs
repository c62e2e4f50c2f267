use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reward attached to a proposal that did not yield a feasible trajectory.
pub const FAILED_REWARD: f64 = -1.0;

/// Record of one repair proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingTraceEntry {
    /// Entry identifier.
    pub id: Uuid,
    /// Wall-clock time of the proposal.
    pub recorded_at: DateTime<Utc>,
    /// Parameter receiving the proposal.
    pub target: String,
    /// Proposed values per attribute.
    pub proposal: IndexMap<String, Vec<f64>>,
    /// Violation time step.
    pub step: usize,
    /// Predicate being repaired.
    pub predicate: String,
    /// Action containing the step.
    pub action: String,
    /// `-1` once the proposal is known to have failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reward: Option<f64>,
}

impl SamplingTraceEntry {
    /// Creates an entry with no reward yet.
    #[must_use]
    pub fn new(
        target: impl Into<String>,
        step: usize,
        predicate: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            recorded_at: Utc::now(),
            target: target.into(),
            proposal: IndexMap::new(),
            step,
            predicate: predicate.into(),
            action: action.into(),
            reward: None,
        }
    }

    /// Adds proposed values for an attribute.
    #[must_use]
    pub fn propose(mut self, attr: impl Into<String>, values: &[f64]) -> Self {
        self.proposal.insert(attr.into(), values.to_vec());
        self
    }

    /// Marks the proposal as failed.
    pub fn fail(&mut self) {
        self.reward = Some(FAILED_REWARD);
    }

    /// True once marked failed.
    #[must_use]
    pub fn failed(&self) -> bool {
        self.reward.is_some_and(|reward| reward <= FAILED_REWARD)
    }
}

/// Aggregate view over a trace, used by reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceSummary {
    /// Total proposals.
    pub proposals: usize,
    /// Proposals marked failed.
    pub failed: usize,
    /// Proposals per predicate name.
    pub by_predicate: IndexMap<String, usize>,
}

impl TraceSummary {
    /// Summarizes a trace.
    #[must_use]
    pub fn of(entries: &[SamplingTraceEntry]) -> Self {
        let mut summary = Self::default();
        for entry in entries {
            summary.proposals += 1;
            if entry.failed() {
                summary.failed += 1;
            }
            *summary
                .by_predicate
                .entry(entry.predicate.clone())
                .or_insert(0) += 1;
        }
        summary
    }
}

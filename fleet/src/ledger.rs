//! Per-agent decision ledger and the observer port for human review.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::core::types::Decision;

/// Append-only record of one agent's decisions, in the order they were made.
#[derive(Debug, Clone, Default)]
pub struct DecisionLedger {
    entries: Vec<Decision>,
}

impl DecisionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, decision: Decision) {
        debug!(decision = %decision, "decision recorded");
        self.entries.push(decision);
    }

    pub fn entries(&self) -> &[Decision] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn blocking(&self) -> impl Iterator<Item = &Decision> {
        self.entries.iter().filter(|decision| decision.blocking)
    }

    pub fn speculative(&self) -> impl Iterator<Item = &Decision> {
        self.entries.iter().filter(|decision| !decision.blocking)
    }

    pub fn into_trail(self) -> Vec<Decision> {
        self.entries
    }
}

/// Observer response to a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Override(String),
}

/// Receives each decision as it is made and may replace the chosen option.
#[async_trait]
pub trait DecisionObserver: Send + Sync {
    async fn review(&self, approach: &str, decision: &Decision) -> Verdict;
}

/// Forwards only blocking decisions; everything else is accepted unseen.
pub struct BlockingOnly {
    inner: Arc<dyn DecisionObserver>,
}

impl BlockingOnly {
    pub fn new(inner: Arc<dyn DecisionObserver>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl DecisionObserver for BlockingOnly {
    async fn review(&self, approach: &str, decision: &Decision) -> Verdict {
        if decision.blocking {
            self.inner.review(approach, decision).await
        } else {
            Verdict::Accept
        }
    }
}

/// Apply an observer verdict to a decision before it is recorded.
pub fn apply_verdict(decision: &mut Decision, verdict: Verdict) {
    if let Verdict::Override(choice) = verdict
        && let Err(err) = decision.override_choice(choice)
    {
        warn!(err = %err, "ignoring repeated override");
    }
}

//! Tournament data model shared by the convergence loop, orchestrator, and scoring.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::plan::EvaluationPlan;

/// Evaluator-reported metrics, keyed by metric name.
pub type Metrics = BTreeMap<String, f64>;

/// A choice an agent made where the requirements left room for judgement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub question: String,
    pub options: Vec<String>,
    pub chosen: String,
    pub reasoning: String,
    /// Whether the choice materially changes behavior or interface.
    #[serde(default)]
    pub blocking: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    overridden: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("decision '{question}' was already overridden")]
pub struct OverrideError {
    pub question: String,
}

impl Decision {
    pub fn new(
        question: impl Into<String>,
        options: Vec<String>,
        chosen: impl Into<String>,
        reasoning: impl Into<String>,
        blocking: bool,
    ) -> Self {
        Self {
            question: question.into(),
            options,
            chosen: chosen.into(),
            reasoning: reasoning.into(),
            blocking,
            timestamp: Utc::now(),
            overridden: false,
        }
    }

    /// Replace the chosen option. Allowed at most once.
    pub fn override_choice(&mut self, chosen: impl Into<String>) -> Result<(), OverrideError> {
        if self.overridden {
            return Err(OverrideError {
                question: self.question.clone(),
            });
        }
        self.chosen = chosen.into();
        self.overridden = true;
        Ok(())
    }

    pub fn is_overridden(&self) -> bool {
        self.overridden
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.blocking {
            "BLOCKING"
        } else {
            "speculative"
        };
        write!(f, "[{kind}] {} -> {}", self.question, self.chosen)
    }
}

/// One generate-then-evaluate cycle of a single agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Iteration {
    /// 1-based attempt number.
    pub attempt: u32,
    pub tests_passed: u32,
    pub tests_failed: u32,
    pub decisions: Vec<Decision>,
    pub error_messages: Vec<String>,
    #[serde(default)]
    pub metrics: Metrics,
    pub code_snapshot: String,
}

impl Iteration {
    pub fn total_tests(&self) -> u32 {
        self.tests_passed + self.tests_failed
    }

    /// True when at least one test ran and none failed.
    pub fn success(&self) -> bool {
        self.tests_failed == 0 && self.tests_passed > 0
    }
}

/// Final outcome of one agent's run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    pub approach: String,
    pub success: bool,
    pub iterations: Vec<Iteration>,
    pub decision_trail: Vec<Decision>,
    /// Metrics from the final iteration.
    pub metrics: Metrics,
    /// Error messages from the final iteration, kept for failed runs.
    #[serde(default)]
    pub diagnostics: Vec<String>,
    pub final_code: String,
    pub work_dir: PathBuf,
    pub branch: Option<String>,
    /// Assigned once by the orchestrator after all agents finish.
    pub score: f64,
    pub error: Option<String>,
}

impl AgentResult {
    /// Failed result for an agent that never produced iterations (setup failure, crash, cancel).
    pub fn crashed(approach: impl Into<String>, work_dir: PathBuf, error: impl Into<String>) -> Self {
        Self {
            approach: approach.into(),
            success: false,
            iterations: Vec::new(),
            decision_trail: Vec::new(),
            metrics: Metrics::new(),
            diagnostics: Vec::new(),
            final_code: String::new(),
            work_dir,
            branch: None,
            score: 0.0,
            error: Some(error.into()),
        }
    }

    pub fn iteration_count(&self) -> usize {
        self.iterations.len()
    }

    pub fn decision_count(&self) -> usize {
        self.decision_trail.len()
    }

    pub fn final_iteration(&self) -> Option<&Iteration> {
        self.iterations.last()
    }

    /// Succeeded after at least one iteration.
    pub fn converged(&self) -> bool {
        self.success && !self.iterations.is_empty()
    }

    pub fn blocking_decisions(&self) -> impl Iterator<Item = &Decision> {
        self.decision_trail.iter().filter(|decision| decision.blocking)
    }
}

/// Ranked tournament outcome. Results are ordered by score, highest first.
#[derive(Debug, Clone, Serialize)]
pub struct TournamentResult {
    results: Vec<AgentResult>,
    plan: EvaluationPlan,
    completed_at: DateTime<Utc>,
}

impl TournamentResult {
    /// Rank results by descending score; ties keep their input order.
    pub fn new(mut results: Vec<AgentResult>, plan: EvaluationPlan) -> Self {
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        Self {
            results,
            plan,
            completed_at: Utc::now(),
        }
    }

    pub fn results(&self) -> &[AgentResult] {
        &self.results
    }

    pub fn plan(&self) -> &EvaluationPlan {
        &self.plan
    }

    pub fn completed_at(&self) -> DateTime<Utc> {
        self.completed_at
    }

    /// Highest-scoring result, if any agent ran.
    pub fn winner(&self) -> Option<&AgentResult> {
        self.results.first()
    }

    /// Approach names in rank order.
    pub fn approaches(&self) -> Vec<&str> {
        self.results
            .iter()
            .map(|result| result.approach.as_str())
            .collect()
    }

    pub fn result_for(&self, approach: &str) -> Option<&AgentResult> {
        self.results
            .iter()
            .find(|result| result.approach == approach)
    }

    pub fn top(&self, n: usize) -> &[AgentResult] {
        &self.results[..n.min(self.results.len())]
    }
}

/// Whether agents decide alone or pause blocking decisions for a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    #[default]
    Speculative,
    Interactive,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Speculative => "speculative",
            Self::Interactive => "interactive",
        })
    }
}

//! Evaluation plan: the shared, immutable contract every agent is judged by.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::core::scoring::metric_key;

/// Weights must sum to this total (within [`WEIGHT_TOLERANCE`]).
pub const WEIGHT_TOTAL: f64 = 100.0;
pub const WEIGHT_TOLERANCE: f64 = 0.01;

/// Planner output must describe at least this many tests and metrics.
pub const MIN_PLAN_TESTS: usize = 3;
pub const MIN_PLAN_METRICS: usize = 3;

pub const CORRECTNESS: &str = "correctness";
pub const SIMPLICITY: &str = "simplicity";
pub const PERFORMANCE: &str = "performance";

/// Weight categories a generated plan must always carry.
pub const REQUIRED_WEIGHTS: [&str; 3] = [CORRECTNESS, SIMPLICITY, PERFORMANCE];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestCategory {
    Correctness,
    EdgeCases,
    Performance,
}

impl TestCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            TestCategory::Correctness => "correctness",
            TestCategory::EdgeCases => "edge_cases",
            TestCategory::Performance => "performance",
        }
    }
}

impl fmt::Display for TestCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestSpec {
    pub name: String,
    pub category: TestCategory,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    #[error("weights must sum to 100, got {total}")]
    WeightSum { total: f64 },
    #[error("plan must include at least {min} tests, got {found}")]
    TooFewTests { found: usize, min: usize },
    #[error("plan must include at least {min} metrics, got {found}")]
    TooFewMetrics { found: usize, min: usize },
    #[error("weights missing required category '{0}'")]
    MissingWeight(String),
    #[error("plan schema violations:\n- {}", .0.join("\n- "))]
    Schema(Vec<String>),
    #[error("no JSON object found in planner response")]
    NoJson,
    #[error("invalid plan JSON: {0}")]
    Json(String),
}

/// Unvalidated plan fields, as produced by the planner or read from disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDraft {
    pub resolved_task: String,
    pub interface_contract: String,
    pub tests: Vec<TestSpec>,
    pub metrics: Vec<String>,
    pub weights: BTreeMap<String, f64>,
    pub eval_script: String,
}

/// Validated evaluation plan. Read-only after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PlanDraft")]
pub struct EvaluationPlan {
    resolved_task: String,
    interface_contract: String,
    tests: Vec<TestSpec>,
    metrics: Vec<String>,
    weights: BTreeMap<String, f64>,
    eval_script: String,
}

impl EvaluationPlan {
    /// Build a plan; fails only when the weights do not sum to 100.
    ///
    /// A non-finite weight makes the sum non-finite and is rejected too.
    pub fn new(draft: PlanDraft) -> Result<Self, PlanError> {
        let total: f64 = draft.weights.values().sum();
        if !total.is_finite() || (total - WEIGHT_TOTAL).abs() > WEIGHT_TOLERANCE {
            return Err(PlanError::WeightSum { total });
        }
        let plan = Self {
            resolved_task: draft.resolved_task,
            interface_contract: draft.interface_contract,
            tests: draft.tests,
            metrics: draft.metrics,
            weights: draft.weights,
            eval_script: draft.eval_script,
        };
        for category in plan.unmetered_categories() {
            warn!(
                category,
                metric = %metric_key(category),
                "weighted category has no matching metric"
            );
        }
        Ok(plan)
    }

    /// Weight categories whose `<category>_score` is not among the plan's metrics.
    ///
    /// Agents can still report such a metric; until one does, the category scores 0.
    pub fn unmetered_categories(&self) -> Vec<&str> {
        self.weights
            .keys()
            .filter(|category| !self.metrics.contains(&metric_key(category)))
            .map(String::as_str)
            .collect()
    }

    /// Stricter checks applied to planner output before any agent starts.
    pub fn validate_generated(&self) -> Result<(), PlanError> {
        if self.tests.len() < MIN_PLAN_TESTS {
            return Err(PlanError::TooFewTests {
                found: self.tests.len(),
                min: MIN_PLAN_TESTS,
            });
        }
        if self.metrics.len() < MIN_PLAN_METRICS {
            return Err(PlanError::TooFewMetrics {
                found: self.metrics.len(),
                min: MIN_PLAN_METRICS,
            });
        }
        if let Some(missing) = REQUIRED_WEIGHTS
            .iter()
            .find(|category| !self.weights.contains_key(**category))
        {
            return Err(PlanError::MissingWeight((*missing).to_string()));
        }
        Ok(())
    }

    pub fn resolved_task(&self) -> &str {
        &self.resolved_task
    }

    pub fn interface_contract(&self) -> &str {
        &self.interface_contract
    }

    pub fn tests(&self) -> &[TestSpec] {
        &self.tests
    }

    pub fn metrics(&self) -> &[String] {
        &self.metrics
    }

    pub fn weights(&self) -> &BTreeMap<String, f64> {
        &self.weights
    }

    pub fn eval_script(&self) -> &str {
        &self.eval_script
    }

    pub fn test_count(&self) -> usize {
        self.tests.len()
    }

    pub fn tests_in(&self, category: TestCategory) -> impl Iterator<Item = &TestSpec> {
        self.tests
            .iter()
            .filter(move |test| test.category == category)
    }

    /// Weight for a category, or 0 when the plan does not score it.
    pub fn category_weight(&self, category: &str) -> f64 {
        self.weights.get(category).copied().unwrap_or(0.0)
    }
}

impl TryFrom<PlanDraft> for EvaluationPlan {
    type Error = PlanError;

    fn try_from(draft: PlanDraft) -> Result<Self, Self::Error> {
        Self::new(draft)
    }
}

impl From<EvaluationPlan> for PlanDraft {
    fn from(plan: EvaluationPlan) -> Self {
        Self {
            resolved_task: plan.resolved_task,
            interface_contract: plan.interface_contract,
            tests: plan.tests,
            metrics: plan.metrics,
            weights: plan.weights,
            eval_script: plan.eval_script,
        }
    }
}

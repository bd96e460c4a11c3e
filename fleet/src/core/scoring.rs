//! Weighted scoring of agent results against the plan's category weights.

use tracing::warn;

use crate::core::plan::{CORRECTNESS, EvaluationPlan};
use crate::core::types::{AgentResult, Metrics};

/// Non-correctness credit kept by agents that never passed every test.
pub const FAILING_DISCOUNT: f64 = 0.5;

/// Metric that carries the `[0,1]` score for a weight category.
pub fn metric_key(category: &str) -> String {
    format!("{category}_score")
}

/// Score one agent in `[0, 100]`.
///
/// Each weight category reads `<category>_score` from the metrics (missing
/// counts as 0, values clamp to `[0,1]`). A failing agent gets no correctness
/// credit and half credit everywhere else.
pub fn score_result(metrics: &Metrics, plan: &EvaluationPlan, success: bool) -> f64 {
    plan.weights()
        .iter()
        .map(|(category, weight)| {
            let value = metrics
                .get(&metric_key(category))
                .copied()
                .filter(|value| value.is_finite())
                .unwrap_or(0.0)
                .clamp(0.0, 1.0);
            let credited = match (success, category.as_str()) {
                (true, _) => value,
                (false, CORRECTNESS) => 0.0,
                (false, _) => value * FAILING_DISCOUNT,
            };
            credited * weight
        })
        .sum()
}

/// Assign scores to every result in place.
pub fn apply_scores(results: &mut [AgentResult], plan: &EvaluationPlan) {
    warn_unscored_categories(results, plan);
    for result in results.iter_mut() {
        result.score = score_result(&result.metrics, plan, result.success);
    }
}

fn warn_unscored_categories(results: &[AgentResult], plan: &EvaluationPlan) {
    for category in plan.weights().keys() {
        let key = metric_key(category);
        let reported = results
            .iter()
            .any(|result| result.metrics.contains_key(&key));
        if !reported && results.iter().any(|result| !result.iterations.is_empty()) {
            warn!(category = %category, metric = %key, "no agent reported metric for weighted category");
        }
    }
}

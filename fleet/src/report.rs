//! Plain-text rendering of plans, progress, and tournament results for the CLI.

use crate::core::plan::EvaluationPlan;
use crate::core::types::{Iteration, TournamentResult};

pub fn render_plan(plan: &EvaluationPlan) -> String {
    let mut out = format!("Task: {}\n", plan.resolved_task().trim());
    out.push_str(&format!(
        "\nInterface:\n{}\n",
        plan.interface_contract().trim_end()
    ));
    out.push_str(&format!("\nTests ({}):\n", plan.test_count()));
    for test in plan.tests() {
        out.push_str(&format!("  [{}] {}\n", test.category, test.name));
    }
    out.push_str("\nWeights:\n");
    for (category, weight) in plan.weights() {
        out.push_str(&format!("  {category}: {weight}\n"));
    }
    out
}

/// One line per finished iteration.
pub fn render_progress(approach: &str, iteration: &Iteration) -> String {
    let status = if iteration.success() { "pass" } else { "fail" };
    format!(
        "[{approach}] iteration {}: {} passed / {} total ({status})",
        iteration.attempt,
        iteration.tests_passed,
        iteration.total_tests()
    )
}

/// Ranked results table followed by the winner's details.
pub fn render_results(tournament: &TournamentResult) -> String {
    let width = tournament
        .results()
        .iter()
        .map(|result| result.approach.chars().count())
        .max()
        .unwrap_or(0)
        .max("Approach".len());

    let mut out = format!(
        "{:>4}  {:<width$}  {:<6}  {:>6}  {:>10}  {:>9}\n",
        "Rank", "Approach", "Status", "Score", "Iterations", "Decisions"
    );
    for (rank, result) in tournament.results().iter().enumerate() {
        let status = if result.success { "PASS" } else { "FAIL" };
        out.push_str(&format!(
            "{:>4}  {:<width$}  {:<6}  {:>6.1}  {:>10}  {:>9}\n",
            rank + 1,
            result.approach,
            status,
            result.score,
            result.iteration_count(),
            result.decision_count()
        ));
    }

    for result in tournament.results() {
        if let Some(error) = &result.error {
            out.push_str(&format!("\n{}: {error}\n", result.approach));
        }
    }

    if let Some(winner) = tournament.winner() {
        out.push_str(&format!(
            "\nWinner: {} with {:.1} / 100\n",
            winner.approach, winner.score
        ));
        for (name, value) in &winner.metrics {
            out.push_str(&format!("  {name}: {value}\n"));
        }
    }
    out
}

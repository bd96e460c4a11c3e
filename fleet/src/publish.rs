//! Publication of the winning agent's branch as a pull request.

use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::{info, instrument};

use crate::core::plan::EvaluationPlan;
use crate::core::types::AgentResult;
use crate::io::artifacts::write_pull_request_body;
use crate::io::git::{PullRequest, PullRequestOutcome, VersionControlGateway};

/// Markdown body describing how the winner was chosen.
pub fn render_pr_body(result: &AgentResult, plan: &EvaluationPlan) -> String {
    let mut body = format!("## {}\n\n", result.approach);
    body.push_str(&format!("{}\n\n", plan.resolved_task().trim()));
    body.push_str(&format!("Score: {:.1} / 100\n", result.score));
    let status = if result.success { "all tests passed" } else { "some tests failed" };
    body.push_str(&format!("Status: {status}\n"));
    body.push_str(&format!("Iterations: {}\n", result.iteration_count()));
    if let Some(last) = result.final_iteration() {
        body.push_str(&format!(
            "Tests: {} passed / {} total\n",
            last.tests_passed,
            last.total_tests()
        ));
    }

    if !result.metrics.is_empty() {
        body.push_str("\n### Metrics\n\n");
        for (name, value) in &result.metrics {
            body.push_str(&format!("- {name}: {value:.2}\n"));
        }
    }

    body.push_str("\n### Weights\n\n");
    for (category, weight) in plan.weights() {
        body.push_str(&format!("- {category}: {weight}\n"));
    }

    if !result.decision_trail.is_empty() {
        body.push_str("\n### Decisions\n\n");
        for decision in &result.decision_trail {
            body.push_str(&format!("- {decision}\n"));
            if !decision.reasoning.is_empty() {
                body.push_str(&format!("  {}\n", decision.reasoning));
            }
        }
    }
    body
}

/// Commit, push, and open a pull request for the winner's branch.
#[instrument(skip_all, fields(approach = %result.approach))]
pub async fn publish_winner(
    gateway: &dyn VersionControlGateway,
    result: &AgentResult,
    plan: &EvaluationPlan,
    base_branch: &str,
    work_base: &Path,
) -> Result<PullRequestOutcome> {
    let Some(branch) = result.branch.as_deref() else {
        bail!("agent '{}' has no branch to publish", result.approach);
    };
    let message = format!("{}: tournament winner", result.approach);
    let committed = gateway
        .commit_if_dirty(&result.work_dir, &message)
        .await
        .with_context(|| format!("commit {branch}"))?;
    if !committed {
        info!(branch, "worktree clean, pushing existing commits");
    }
    gateway
        .push(&result.work_dir, branch)
        .await
        .with_context(|| format!("push {branch}"))?;

    let body_path = write_pull_request_body(work_base, branch, &render_pr_body(result, plan))?;
    let request = PullRequest {
        branch: branch.to_string(),
        base: base_branch.to_string(),
        title: format!("{} ({:.1} / 100)", result.approach, result.score),
        body_path,
    };
    let outcome = gateway
        .open_pull_request(&result.work_dir, &request)
        .await
        .with_context(|| format!("open pull request for {branch}"))?;
    info!(branch, outcome = ?outcome, "winner published");
    Ok(outcome)
}

//! Tournament orchestrator: runs every approach concurrently against one plan
//! and ranks the results.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::join_all;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use crate::agent::{AgentRun, AgentServices, ProgressHook, run_agent_loop};
use crate::core::naming::{branch_for_approach, workspace_dir_name};
use crate::core::plan::EvaluationPlan;
use crate::core::scoring::apply_scores;
use crate::core::types::{AgentResult, RunMode, TournamentResult};
use crate::ledger::{BlockingOnly, DecisionObserver};

pub const MIN_APPROACHES: usize = 2;

/// Preconditions that abort a tournament before any agent starts.
#[derive(Debug, Error)]
pub enum TournamentError {
    #[error("at least {min} approaches are required, got {found}")]
    TooFewApproaches { found: usize, min: usize },
    #[error("approaches '{first}' and '{second}' would share workspace '{dir}'")]
    WorkspaceCollision {
        first: String,
        second: String,
        dir: String,
    },
    #[error("approaches '{first}' and '{second}' would share branch '{branch}'")]
    BranchCollision {
        first: String,
        second: String,
        branch: String,
    },
    #[error("source repository not found: {}", .0.display())]
    RepositoryMissing(PathBuf),
    #[error("interactive mode needs a decision observer")]
    MissingObserver,
}

/// What to run.
#[derive(Debug, Clone)]
pub struct TournamentRequest {
    pub approaches: Vec<String>,
    pub max_iterations: u32,
    pub mode: RunMode,
    /// Parent of every agent workspace.
    pub work_base: PathBuf,
    /// Repository each agent branches its worktree from.
    pub source_repo: PathBuf,
    /// Agents still running when this elapses are cancelled.
    pub deadline: Option<Duration>,
}

/// Runs tournaments with a fixed set of capabilities.
#[derive(Clone)]
pub struct Tournament {
    services: AgentServices,
    human: Option<Arc<dyn DecisionObserver>>,
    progress: Option<ProgressHook>,
}

impl Tournament {
    pub fn new(services: AgentServices) -> Self {
        Self {
            services,
            human: None,
            progress: None,
        }
    }

    /// Observer consulted for blocking decisions in interactive mode.
    pub fn with_observer(mut self, observer: Arc<dyn DecisionObserver>) -> Self {
        self.human = Some(observer);
        self
    }

    pub fn with_progress(mut self, progress: ProgressHook) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Run every approach to completion and rank the results.
    ///
    /// Only precondition failures are errors; each agent's own failure ends up
    /// in its [`AgentResult`].
    #[instrument(skip_all, fields(approaches = request.approaches.len(), mode = ?request.mode))]
    pub async fn run(
        &self,
        plan: Arc<EvaluationPlan>,
        request: TournamentRequest,
    ) -> Result<TournamentResult> {
        let workspaces = check_preconditions(&request)?;
        let source_repo = request
            .source_repo
            .canonicalize()
            .with_context(|| format!("resolve {}", request.source_repo.display()))?;
        tokio::fs::create_dir_all(&request.work_base)
            .await
            .with_context(|| format!("create directory {}", request.work_base.display()))?;

        let observer: Option<Arc<dyn DecisionObserver>> = match request.mode {
            RunMode::Speculative => None,
            RunMode::Interactive => {
                let human = self.human.clone().ok_or(TournamentError::MissingObserver)?;
                Some(Arc::new(BlockingOnly::new(human)))
            }
        };
        let deadline = request.deadline.map(|limit| Instant::now() + limit);

        info!(approaches = ?request.approaches, "launching agents");
        let handles: Vec<_> = request
            .approaches
            .iter()
            .zip(workspaces)
            .map(|(approach, work_dir)| {
                let run = AgentRun {
                    approach: approach.clone(),
                    work_dir,
                    max_iterations: request.max_iterations,
                    source_repo: Some(source_repo.clone()),
                    observer: observer.clone(),
                    progress: self.progress.clone(),
                };
                let plan = Arc::clone(&plan);
                let services = self.services.clone();
                let task =
                    tokio::spawn(async move { run_bounded(&plan, &services, run, deadline).await });
                (approach.clone(), task)
            })
            .collect();

        let (labels, tasks): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        let joined = join_all(tasks).await;
        let mut results: Vec<AgentResult> = labels
            .into_iter()
            .zip(joined)
            .map(|(approach, joined)| match joined {
                Ok(result) => result,
                Err(err) => {
                    warn!(approach = %approach, err = %err, "agent task failed");
                    let work_dir = request.work_base.join(workspace_dir_name(&approach));
                    AgentResult::crashed(approach, work_dir, format!("agent task failed: {err}"))
                }
            })
            .collect();

        apply_scores(&mut results, &plan);
        let ranked = TournamentResult::new(results, (*plan).clone());
        if let Some(winner) = ranked.winner() {
            info!(winner = %winner.approach, score = winner.score, "tournament complete");
        }
        Ok(ranked)
    }
}

/// Run one agent, converting a missed deadline into a failing result.
async fn run_bounded(
    plan: &EvaluationPlan,
    services: &AgentServices,
    run: AgentRun,
    deadline: Option<Instant>,
) -> AgentResult {
    let Some(deadline) = deadline else {
        return run_agent_loop(plan, services, run).await;
    };
    let approach = run.approach.clone();
    let work_dir = run.work_dir.clone();
    match tokio::time::timeout_at(deadline, run_agent_loop(plan, services, run)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(approach = %approach, "agent cancelled at tournament deadline");
            AgentResult::crashed(approach, work_dir, "tournament deadline exceeded")
        }
    }
}

/// Validate the request and derive one workspace per approach.
fn check_preconditions(request: &TournamentRequest) -> Result<Vec<PathBuf>, TournamentError> {
    if request.approaches.len() < MIN_APPROACHES {
        return Err(TournamentError::TooFewApproaches {
            found: request.approaches.len(),
            min: MIN_APPROACHES,
        });
    }
    if !request.source_repo.is_dir() {
        return Err(TournamentError::RepositoryMissing(
            request.source_repo.clone(),
        ));
    }
    let mut seen: Vec<(String, String, &str)> = Vec::new();
    for approach in &request.approaches {
        let dir = workspace_dir_name(approach);
        if let Some((_, _, first)) = seen.iter().find(|(name, _, _)| *name == dir) {
            return Err(TournamentError::WorkspaceCollision {
                first: (*first).to_string(),
                second: approach.clone(),
                dir,
            });
        }
        let branch = branch_for_approach(approach);
        if let Some((_, _, first)) = seen.iter().find(|(_, taken, _)| *taken == branch) {
            return Err(TournamentError::BranchCollision {
                first: (*first).to_string(),
                second: approach.clone(),
                branch,
            });
        }
        seen.push((dir, branch, approach));
    }
    Ok(seen
        .into_iter()
        .map(|(dir, _, _)| request.work_base.join(dir))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        LocalWorkspaces, RoutedGenerator, ScriptedEvaluator, failing_outcome, passing_outcome,
        services, sample_plan,
    };

    fn request(dir: &std::path::Path, approaches: &[&str]) -> TournamentRequest {
        let repo = dir.join("repo");
        std::fs::create_dir_all(&repo).expect("repo dir");
        TournamentRequest {
            approaches: approaches.iter().map(|a| (*a).to_string()).collect(),
            max_iterations: 3,
            mode: RunMode::Speculative,
            work_base: dir.join("work"),
            source_repo: repo,
            deadline: None,
        }
    }

    #[tokio::test]
    async fn rejects_single_approach_before_running_anything() {
        let temp = tempfile::tempdir().expect("tempdir");
        let generator = RoutedGenerator::new();
        let services = services(
            generator.clone(),
            ScriptedEvaluator::repeating(passing_outcome(&[])),
            LocalWorkspaces::new(),
        );
        let err = Tournament::new(services)
            .run(Arc::new(sample_plan()), request(temp.path(), &["solo"]))
            .await
            .expect_err("too few");
        assert!(matches!(
            err.downcast_ref::<TournamentError>(),
            Some(TournamentError::TooFewApproaches { found: 1, min: 2 })
        ));
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn rejects_missing_repository() {
        let temp = tempfile::tempdir().expect("tempdir");
        let services = services(
            RoutedGenerator::new(),
            ScriptedEvaluator::repeating(passing_outcome(&[])),
            LocalWorkspaces::new(),
        );
        let mut req = request(temp.path(), &["A", "B"]);
        req.source_repo = temp.path().join("absent");
        let err = Tournament::new(services)
            .run(Arc::new(sample_plan()), req)
            .await
            .expect_err("missing repo");
        assert!(matches!(
            err.downcast_ref::<TournamentError>(),
            Some(TournamentError::RepositoryMissing(_))
        ));
    }

    #[tokio::test]
    async fn rejects_approaches_sharing_a_workspace() {
        let temp = tempfile::tempdir().expect("tempdir");
        let services = services(
            RoutedGenerator::new(),
            ScriptedEvaluator::repeating(passing_outcome(&[])),
            LocalWorkspaces::new(),
        );
        let err = Tournament::new(services)
            .run(
                Arc::new(sample_plan()),
                request(temp.path(), &["token bucket", "token_bucket"]),
            )
            .await
            .expect_err("collision");
        assert!(err.to_string().contains("token_bucket"));
    }

    #[tokio::test]
    async fn rejects_approaches_sharing_a_branch() {
        let temp = tempfile::tempdir().expect("tempdir");
        let generator = RoutedGenerator::new();
        let services = services(
            generator.clone(),
            ScriptedEvaluator::repeating(passing_outcome(&[])),
            LocalWorkspaces::new(),
        );
        let err = Tournament::new(services)
            .run(
                Arc::new(sample_plan()),
                request(temp.path(), &["Sliding Window", "sliding window"]),
            )
            .await
            .expect_err("collision");
        assert!(matches!(
            err.downcast_ref::<TournamentError>(),
            Some(TournamentError::BranchCollision { branch, .. }) if branch == "agent/sliding-window"
        ));
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn interactive_mode_requires_observer() {
        let temp = tempfile::tempdir().expect("tempdir");
        let services = services(
            RoutedGenerator::new(),
            ScriptedEvaluator::repeating(passing_outcome(&[])),
            LocalWorkspaces::new(),
        );
        let mut req = request(temp.path(), &["A", "B"]);
        req.mode = RunMode::Interactive;
        let err = Tournament::new(services)
            .run(Arc::new(sample_plan()), req)
            .await
            .expect_err("no observer");
        assert!(matches!(
            err.downcast_ref::<TournamentError>(),
            Some(TournamentError::MissingObserver)
        ));
    }

    #[tokio::test]
    async fn crashed_agent_does_not_stop_siblings() {
        let temp = tempfile::tempdir().expect("tempdir");
        let generator = RoutedGenerator::new()
            .route("steady", "```python\nclass Steady: pass\n```")
            .panic_on("flaky");
        let services = services(
            generator,
            ScriptedEvaluator::repeating(passing_outcome(&[("correctness_score", 1.0)])),
            LocalWorkspaces::new(),
        );

        let result = Tournament::new(services)
            .run(
                Arc::new(sample_plan()),
                request(temp.path(), &["flaky", "steady"]),
            )
            .await
            .expect("tournament");

        assert_eq!(result.approaches(), vec!["steady", "flaky"]);
        let flaky = result.result_for("flaky").expect("flaky result");
        assert!(!flaky.success);
        assert!(flaky.iterations.is_empty());
        assert!(
            flaky
                .error
                .as_deref()
                .is_some_and(|e| e.starts_with("agent task failed:")),
            "{:?}",
            flaky.error
        );
        assert_eq!(flaky.work_dir, temp.path().join("work/flaky"));
        assert!(result.result_for("steady").expect("steady").success);
    }

    #[tokio::test]
    async fn deadline_cancels_slow_agents() {
        let temp = tempfile::tempdir().expect("tempdir");
        let generator = RoutedGenerator::new()
            .route("quick", "```python\nx = 1\n```")
            .stall_on("slow");
        let services = services(
            generator,
            ScriptedEvaluator::repeating(passing_outcome(&[])),
            LocalWorkspaces::new(),
        );
        let mut req = request(temp.path(), &["slow", "quick"]);
        req.deadline = Some(Duration::from_millis(300));

        let result = Tournament::new(services)
            .run(Arc::new(sample_plan()), req)
            .await
            .expect("tournament");

        let slow = result.result_for("slow").expect("slow");
        assert_eq!(slow.error.as_deref(), Some("tournament deadline exceeded"));
        assert!(result.result_for("quick").expect("quick").success);
    }

    #[tokio::test]
    async fn failing_agents_rank_below_passing_ones() {
        let temp = tempfile::tempdir().expect("tempdir");
        let generator = RoutedGenerator::new()
            .route("good", "```python\ngood = True\n```")
            .route("bad", "```python\nbad = True\n```");
        let evaluator = ScriptedEvaluator::by_candidate(vec![
            (
                "good = True",
                passing_outcome(&[("correctness_score", 0.5), ("simplicity_score", 0.5)]),
            ),
            (
                "bad = True",
                failing_outcome(1, &["t: Failed"], &[("simplicity_score", 1.0)]),
            ),
        ]);
        let services = services(generator, evaluator, LocalWorkspaces::new());

        let result = Tournament::new(services)
            .run(Arc::new(sample_plan()), request(temp.path(), &["bad", "good"]))
            .await
            .expect("tournament");

        assert_eq!(result.winner().map(|w| w.approach.as_str()), Some("good"));
        let good = result.result_for("good").expect("good");
        let bad = result.result_for("bad").expect("bad");
        assert!((good.score - 45.0).abs() < 1e-9, "{}", good.score);
        assert!((bad.score - 10.0).abs() < 1e-9, "{}", bad.score);
        assert_eq!(bad.iteration_count(), 3);
    }
}

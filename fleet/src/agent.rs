//! Convergence loop: one agent generating, evaluating, and retrying until its
//! candidate passes or the iteration budget runs out.
//!
//! The loop never fails. Setup problems, generator errors, and budget
//! exhaustion all end in an [`AgentResult`] with `success == false`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::evaluation::EvalOutcome;
use crate::core::feedback::{INITIAL_STATUS, format_failure_summary, format_status};
use crate::core::naming::branch_for_approach;
use crate::core::plan::EvaluationPlan;
use crate::core::types::{AgentResult, Decision, Iteration, Metrics};
use crate::io::evaluator::Evaluator;
use crate::io::generator::{CodeGenerator, GenerationLimits, GenerationRequest, RequestKind};
use crate::io::git::VersionControlGateway;
use crate::io::parser::ResponseParser;
use crate::io::prompt::{AgentPromptInputs, PromptEngine};
use crate::ledger::{DecisionLedger, DecisionObserver, apply_verdict};

pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// Called after every iteration with the approach label.
pub type ProgressHook = Arc<dyn Fn(&str, &Iteration) + Send + Sync>;

/// Capabilities shared by every agent in a tournament.
#[derive(Clone)]
pub struct AgentServices {
    pub generator: Arc<dyn CodeGenerator>,
    pub parser: Arc<dyn ResponseParser>,
    pub evaluator: Arc<dyn Evaluator>,
    pub vcs: Arc<dyn VersionControlGateway>,
    pub prompts: Arc<PromptEngine>,
    pub limits: GenerationLimits,
    /// Fence tag candidates are requested in.
    pub language: String,
}

/// Per-agent inputs.
#[derive(Clone)]
pub struct AgentRun {
    pub approach: String,
    pub work_dir: PathBuf,
    pub max_iterations: u32,
    /// Repository to branch a worktree from; `None` uses a plain directory.
    pub source_repo: Option<PathBuf>,
    pub observer: Option<Arc<dyn DecisionObserver>>,
    pub progress: Option<ProgressHook>,
}

impl AgentRun {
    pub fn new(approach: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            approach: approach.into(),
            work_dir: work_dir.into(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            source_repo: None,
            observer: None,
            progress: None,
        }
    }
}

/// Why the loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
enum LoopStop {
    Converged,
    Crashed(String),
    Exhausted,
}

/// Run one agent to completion.
#[instrument(skip_all, fields(approach = %run.approach))]
pub async fn run_agent_loop(
    plan: &EvaluationPlan,
    services: &AgentServices,
    run: AgentRun,
) -> AgentResult {
    let branch = match prepare_workspace(plan, services, &run).await {
        Ok(branch) => branch,
        Err(err) => {
            warn!(err = %format!("{err:#}"), "agent setup failed");
            return AgentResult::crashed(
                run.approach.as_str(),
                run.work_dir.clone(),
                format!("setup failed: {err:#}"),
            );
        }
    };

    let mut state = ConvergenceLoop {
        plan,
        services,
        run: &run,
        iterations: Vec::new(),
        ledger: DecisionLedger::new(),
        final_code: String::new(),
    };
    let stop = state.drive().await;
    info!(stop = ?stop, iterations = state.iterations.len(), "agent finished");
    state.finish(stop, branch)
}

/// Create the worktree (or plain directory) and install the evaluator.
async fn prepare_workspace(
    plan: &EvaluationPlan,
    services: &AgentServices,
    run: &AgentRun,
) -> Result<Option<String>> {
    let branch = match &run.source_repo {
        Some(source) => {
            let branch = branch_for_approach(&run.approach);
            services
                .vcs
                .create_worktree(source, &branch, &run.work_dir)
                .await?;
            Some(branch)
        }
        None => {
            tokio::fs::create_dir_all(&run.work_dir)
                .await
                .with_context(|| format!("create directory {}", run.work_dir.display()))?;
            None
        }
    };
    services
        .evaluator
        .install(&run.work_dir, plan.eval_script())
        .await?;
    Ok(branch)
}

struct ConvergenceLoop<'a> {
    plan: &'a EvaluationPlan,
    services: &'a AgentServices,
    run: &'a AgentRun,
    iterations: Vec<Iteration>,
    ledger: DecisionLedger,
    final_code: String,
}

impl ConvergenceLoop<'_> {
    async fn drive(&mut self) -> LoopStop {
        let mut previous_status = INITIAL_STATUS.to_string();
        let mut failure = String::new();

        for attempt in 1..=self.run.max_iterations {
            let (iteration, outcome_success) =
                match self.attempt(attempt, &previous_status, &failure).await {
                    Ok(result) => result,
                    Err(err) => {
                        warn!(attempt, err = %format!("{err:#}"), "generation crashed");
                        return LoopStop::Crashed(format!("code generation failed: {err:#}"));
                    }
                };

            previous_status = format_status(iteration.tests_passed, iteration.tests_failed);
            failure = format_failure_summary(&iteration.error_messages);
            if let Some(progress) = &self.run.progress {
                progress(&self.run.approach, &iteration);
            }
            self.iterations.push(iteration);

            if outcome_success {
                return LoopStop::Converged;
            }
            debug!(attempt, status = %previous_status, "iteration failed, retrying");
        }
        LoopStop::Exhausted
    }

    /// One generate, extract, record, evaluate pass.
    async fn attempt(
        &mut self,
        attempt: u32,
        previous_status: &str,
        failure: &str,
    ) -> Result<(Iteration, bool)> {
        let services = self.services;
        let prompt = services.prompts.render_agent(&AgentPromptInputs {
            approach: &self.run.approach,
            resolved_task: self.plan.resolved_task(),
            interface_contract: self.plan.interface_contract(),
            eval_script: self.plan.eval_script(),
            iteration: attempt,
            max_iterations: self.run.max_iterations,
            previous_status,
            failure,
            language: &services.language,
        })?;
        let output = services
            .generator
            .generate(&GenerationRequest {
                kind: RequestKind::Candidate,
                prompt,
                max_tokens: services.limits.max_tokens,
            })
            .await?;
        let code = services.parser.extract_code(&output)?;

        let candidate = services.evaluator.candidate_path(&self.run.work_dir);
        tokio::fs::write(&candidate, &code)
            .await
            .with_context(|| format!("write {}", candidate.display()))?;
        self.final_code.clone_from(&code);

        let decisions = self.record_decisions(&output).await;
        let EvalOutcome {
            success,
            tests_passed,
            tests_failed,
            error_messages,
            metrics,
        } = services
            .evaluator
            .evaluate(&self.run.work_dir, &candidate)
            .await;
        debug!(attempt, success, tests_passed, tests_failed, "candidate evaluated");

        Ok((
            Iteration {
                attempt,
                tests_passed,
                tests_failed,
                decisions,
                error_messages,
                metrics,
                code_snapshot: code,
            },
            success,
        ))
    }

    /// Extract decisions, let the observer weigh in, and append them to the ledger.
    async fn record_decisions(&mut self, output: &str) -> Vec<Decision> {
        let mut decisions = self.extract_decisions(output).await;
        for decision in &mut decisions {
            if let Some(observer) = &self.run.observer {
                let verdict = observer.review(&self.run.approach, decision).await;
                apply_verdict(decision, verdict);
            }
            self.ledger.record(decision.clone());
        }
        decisions
    }

    /// Ask the generator to list decisions; fall back to parsing the raw output.
    async fn extract_decisions(&self, output: &str) -> Vec<Decision> {
        let services = self.services;
        let request = match services.prompts.render_decisions(output) {
            Ok(prompt) => GenerationRequest {
                kind: RequestKind::Decisions,
                prompt,
                max_tokens: services.limits.decision_max_tokens,
            },
            Err(err) => {
                warn!(err = %format!("{err:#}"), "render decision prompt");
                return services.parser.extract_decisions(output);
            }
        };
        match services.generator.generate(&request).await {
            Ok(listing) => services.parser.extract_decisions(&listing),
            Err(err) => {
                warn!(err = %format!("{err:#}"), "decision extraction call failed, parsing response");
                services.parser.extract_decisions(output)
            }
        }
    }

    fn finish(self, stop: LoopStop, branch: Option<String>) -> AgentResult {
        let (metrics, diagnostics) = self
            .iterations
            .last()
            .map(|last| (last.metrics.clone(), last.error_messages.clone()))
            .unwrap_or_else(|| (Metrics::new(), Vec::new()));
        let (success, error, diagnostics) = match stop {
            LoopStop::Converged => (true, None, Vec::new()),
            LoopStop::Crashed(error) => (false, Some(error), diagnostics),
            LoopStop::Exhausted => (
                false,
                Some(format!(
                    "max iterations ({}) reached without passing all tests",
                    self.run.max_iterations
                )),
                diagnostics,
            ),
        };
        AgentResult {
            approach: self.run.approach.clone(),
            success,
            iterations: self.iterations,
            decision_trail: self.ledger.into_trail(),
            metrics,
            diagnostics,
            final_code: self.final_code,
            work_dir: self.run.work_dir.clone(),
            branch,
            score: 0.0,
            error,
        }
    }
}

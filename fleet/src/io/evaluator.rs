//! Evaluation runner: executes the plan's evaluator script against a candidate.
//!
//! The [`Evaluator`] trait decouples the convergence loop from process
//! execution. Tests use scripted evaluators that return predetermined
//! outcomes without spawning processes.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::core::evaluation::{EvalOutcome, normalize_report};
use crate::io::config::EvaluatorConfig;
use crate::io::process::run_command_with_timeout;

/// Runs a candidate against the installed evaluator inside a workspace.
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Write the evaluator source into the workspace. Called once per agent.
    async fn install(&self, workspace: &Path, script: &str) -> Result<()>;

    /// Where the convergence loop must write each candidate.
    fn candidate_path(&self, workspace: &Path) -> PathBuf;

    /// Evaluate the candidate. Never fails: every problem becomes a failing outcome.
    async fn evaluate(&self, workspace: &Path, candidate: &Path) -> EvalOutcome;
}

/// Evaluator that spawns `<command..> <script> <candidate>` in the workspace.
#[derive(Debug, Clone)]
pub struct ProcessEvaluator {
    command: Vec<String>,
    script_name: String,
    candidate_name: String,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl ProcessEvaluator {
    pub fn new(config: &EvaluatorConfig) -> Self {
        Self {
            command: config.command.clone(),
            script_name: config.script_name.clone(),
            candidate_name: config.candidate_name.clone(),
            timeout: config.timeout(),
            output_limit_bytes: config.output_limit_bytes,
        }
    }

    pub fn script_path(&self, workspace: &Path) -> PathBuf {
        workspace.join(&self.script_name)
    }

    async fn run(&self, workspace: &Path, candidate: &Path) -> Result<EvalOutcome> {
        let (program, prefix) = self
            .command
            .split_first()
            .context("evaluator command is empty")?;
        // The child runs inside the workspace, so relative paths must not be joined twice.
        let candidate = std::path::absolute(candidate).context("resolve candidate path")?;
        let mut cmd = Command::new(program);
        cmd.args(prefix)
            .arg(&self.script_name)
            .arg(&candidate)
            .current_dir(workspace);

        let output =
            run_command_with_timeout(cmd, None, self.timeout, self.output_limit_bytes).await?;
        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "evaluator timed out");
            return Ok(EvalOutcome::timed_out(self.timeout));
        }
        let stderr = output.stderr_lossy();
        if !stderr.trim().is_empty() {
            debug!(stderr = %stderr.trim(), "evaluator stderr");
        }
        Ok(normalize_report(&output.stdout_lossy(), output.status.code()))
    }
}

#[async_trait]
impl Evaluator for ProcessEvaluator {
    async fn install(&self, workspace: &Path, script: &str) -> Result<()> {
        let path = self.script_path(workspace);
        tokio::fs::write(&path, script)
            .await
            .with_context(|| format!("write {}", path.display()))
    }

    fn candidate_path(&self, workspace: &Path) -> PathBuf {
        workspace.join(&self.candidate_name)
    }

    #[instrument(skip_all, fields(workspace = %workspace.display()))]
    async fn evaluate(&self, workspace: &Path, candidate: &Path) -> EvalOutcome {
        match self.run(workspace, candidate).await {
            Ok(outcome) => {
                debug!(
                    success = outcome.success,
                    passed = outcome.tests_passed,
                    failed = outcome.tests_failed,
                    "evaluation finished"
                );
                outcome
            }
            Err(err) => {
                warn!(err = %format!("{err:#}"), "evaluator could not run");
                EvalOutcome::launch_failed(&err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluator(command: &[&str], timeout_secs: u64) -> ProcessEvaluator {
        ProcessEvaluator::new(&EvaluatorConfig {
            command: command.iter().map(|s| (*s).to_string()).collect(),
            language: "sh".to_string(),
            script_name: "eval.sh".to_string(),
            candidate_name: "solution.txt".to_string(),
            timeout_secs,
            output_limit_bytes: 10_000,
        })
    }

    #[tokio::test]
    async fn passes_candidate_path_and_runs_in_workspace() {
        let temp = tempfile::tempdir().expect("tempdir");
        let workspace = temp.path();
        let eval = evaluator(&["sh"], 5);
        eval.install(
            workspace,
            "test -f ./eval.sh || exit 2\n\
             name=$(basename \"$1\")\n\
             echo \"{\\\"success\\\": true, \\\"tests\\\": {\\\"$name\\\": {\\\"pass\\\": true}}}\"\n",
        )
        .await
        .expect("install");
        let candidate = eval.candidate_path(workspace);
        tokio::fs::write(&candidate, "x").await.expect("write");

        let outcome = eval.evaluate(workspace, &candidate).await;
        assert!(outcome.success, "{outcome:?}");
        assert_eq!(outcome.tests_passed, 1);
    }

    #[tokio::test]
    async fn missing_interpreter_becomes_failure() {
        let temp = tempfile::tempdir().expect("tempdir");
        let eval = evaluator(&["no-such-interpreter-xyz"], 5);
        let candidate = eval.candidate_path(temp.path());
        let outcome = eval.evaluate(temp.path(), &candidate).await;
        assert!(!outcome.success);
        assert_eq!(outcome.error_messages.len(), 1);
        assert!(outcome.error_messages[0].starts_with("evaluation error:"));
    }
}

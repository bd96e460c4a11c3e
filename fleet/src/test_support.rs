//! Test-only helpers: scripted capabilities, sample plans, and a git fixture.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use tempfile::TempDir;

use crate::agent::AgentServices;
use crate::core::evaluation::EvalOutcome;
use crate::core::naming::branch_for_approach;
use crate::core::plan::{EvaluationPlan, PlanDraft, TestCategory, TestSpec};
use crate::core::types::{AgentResult, Iteration, Metrics};
use crate::io::evaluator::Evaluator;
use crate::io::generator::{CodeGenerator, GenerationLimits, GenerationRequest, RequestKind};
use crate::io::git::{PullRequest, PullRequestOutcome, SetupError, VersionControlGateway};
use crate::io::parser::FencedResponseParser;
use crate::io::prompt::PromptEngine;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Rate-limiter plan weighted 70/20/10 across correctness, simplicity, performance.
pub fn sample_plan() -> EvaluationPlan {
    let test = |name: &str, category| TestSpec {
        name: name.to_string(),
        category,
        description: format!("{name} behaves"),
    };
    EvaluationPlan::new(PlanDraft {
        resolved_task: "Implement a rate limiter allowing N calls per window.".to_string(),
        interface_contract: "class RateLimiter:\n    def __init__(self, limit: int, window: float)\n    def allow(self) -> bool".to_string(),
        tests: vec![
            test("allows_up_to_limit", TestCategory::Correctness),
            test("zero_limit_blocks", TestCategory::EdgeCases),
            test("many_calls_fast", TestCategory::Performance),
        ],
        metrics: vec![
            "correctness_score".to_string(),
            "simplicity_score".to_string(),
            "performance_score".to_string(),
        ],
        weights: [
            ("correctness".to_string(), 70.0),
            ("simplicity".to_string(), 20.0),
            ("performance".to_string(), 10.0),
        ]
        .into_iter()
        .collect(),
        eval_script: "import sys, json\nprint(json.dumps({'success': True}))\nsys.exit(0)\n"
            .to_string(),
    })
    .unwrap_or_else(|err| panic!("sample plan must be valid: {err}"))
}

fn metrics(pairs: &[(&str, f64)]) -> Metrics {
    pairs
        .iter()
        .map(|(name, value)| ((*name).to_string(), *value))
        .collect()
}

/// Evaluator outcome with three passing tests.
pub fn passing_outcome(reported: &[(&str, f64)]) -> EvalOutcome {
    EvalOutcome {
        success: true,
        tests_passed: 3,
        tests_failed: 0,
        error_messages: Vec::new(),
        metrics: metrics(reported),
    }
}

/// Evaluator outcome with one failing test per message.
pub fn failing_outcome(passed: u32, messages: &[&str], reported: &[(&str, f64)]) -> EvalOutcome {
    EvalOutcome {
        success: false,
        tests_passed: passed,
        tests_failed: u32::try_from(messages.len()).unwrap_or(u32::MAX),
        error_messages: messages.iter().map(|m| (*m).to_string()).collect(),
        metrics: metrics(reported),
    }
}

/// Successful single-iteration result with the given final code.
pub fn passing_result(approach: &str, code: &str) -> AgentResult {
    AgentResult {
        approach: approach.to_string(),
        success: true,
        iterations: vec![Iteration {
            attempt: 1,
            tests_passed: 3,
            tests_failed: 0,
            decisions: Vec::new(),
            error_messages: Vec::new(),
            metrics: Metrics::new(),
            code_snapshot: code.to_string(),
        }],
        decision_trail: Vec::new(),
        metrics: Metrics::new(),
        diagnostics: Vec::new(),
        final_code: code.to_string(),
        work_dir: PathBuf::from(approach),
        branch: Some(branch_for_approach(approach)),
        score: 0.0,
        error: None,
    }
}

/// Wire scripted capabilities into the services an agent needs.
pub fn services(
    generator: impl CodeGenerator + 'static,
    evaluator: impl Evaluator + 'static,
    vcs: impl VersionControlGateway + 'static,
) -> AgentServices {
    AgentServices {
        generator: Arc::new(generator),
        parser: Arc::new(FencedResponseParser::default()),
        evaluator: Arc::new(evaluator),
        vcs: Arc::new(vcs),
        prompts: Arc::new(PromptEngine::new()),
        limits: GenerationLimits {
            max_tokens: 8192,
            decision_max_tokens: 2048,
        },
        language: "python".to_string(),
    }
}

/// One scripted generator reply.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    Fail(String),
}

impl ScriptedReply {
    /// Reply holding `code` in a python fence.
    pub fn code(code: &str) -> Self {
        Self::Text(format!("Here is my solution.\n\n```python\n{code}\n```\n"))
    }

    fn resolve(&self) -> Result<String> {
        match self {
            Self::Text(text) => Ok(text.clone()),
            Self::Fail(message) => Err(anyhow!("{message}")),
        }
    }
}

#[derive(Debug)]
struct ScriptedGeneratorState {
    replies: VecDeque<ScriptedReply>,
    repeat: Option<ScriptedReply>,
    decisions: ScriptedReply,
    prompts: Vec<(RequestKind, String)>,
}

/// Generator answering plan/candidate requests from a queue and decision
/// requests with a fixed reply (`[]` by default). Clones share state.
#[derive(Debug, Clone)]
pub struct ScriptedGenerator {
    state: Arc<Mutex<ScriptedGeneratorState>>,
}

impl ScriptedGenerator {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self::with_state(replies.into(), None)
    }

    /// Answer every plan/candidate request with the same reply.
    pub fn repeating(reply: ScriptedReply) -> Self {
        Self::with_state(VecDeque::new(), Some(reply))
    }

    fn with_state(replies: VecDeque<ScriptedReply>, repeat: Option<ScriptedReply>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptedGeneratorState {
                replies,
                repeat,
                decisions: ScriptedReply::Text("[]".to_string()),
                prompts: Vec::new(),
            })),
        }
    }

    pub fn with_decisions(self, listing: &str) -> Self {
        lock(&self.state).decisions = ScriptedReply::Text(listing.to_string());
        self
    }

    pub fn with_failing_decisions(self) -> Self {
        lock(&self.state).decisions = ScriptedReply::Fail("decision service unavailable".into());
        self
    }

    /// Prompts sent for candidate generation, in order.
    pub fn candidate_prompts(&self) -> Vec<String> {
        lock(&self.state)
            .prompts
            .iter()
            .filter(|(kind, _)| *kind == RequestKind::Candidate)
            .map(|(_, prompt)| prompt.clone())
            .collect()
    }

    pub fn prompts_of(&self, kind: RequestKind) -> Vec<String> {
        lock(&self.state)
            .prompts
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, prompt)| prompt.clone())
            .collect()
    }
}

#[async_trait]
impl CodeGenerator for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let mut state = lock(&self.state);
        state.prompts.push((request.kind, request.prompt.clone()));
        if request.kind == RequestKind::Decisions {
            return state.decisions.resolve();
        }
        if let Some(reply) = state.replies.pop_front() {
            return reply.resolve();
        }
        match &state.repeat {
            Some(reply) => reply.resolve(),
            None => Err(anyhow!("scripted generator exhausted")),
        }
    }
}

#[derive(Debug, Clone)]
enum Route {
    Reply(String),
    Panic,
    Stall,
}

/// Generator answering by the approach named in the prompt. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct RoutedGenerator {
    routes: Arc<Mutex<HashMap<String, Route>>>,
    calls: Arc<Mutex<usize>>,
}

impl RoutedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer `approach` with `reply`.
    pub fn route(self, approach: &str, reply: &str) -> Self {
        lock(&self.routes).insert(approach.to_string(), Route::Reply(reply.to_string()));
        self
    }

    /// Panic whenever `approach` asks for code.
    pub fn panic_on(self, approach: &str) -> Self {
        lock(&self.routes).insert(approach.to_string(), Route::Panic);
        self
    }

    /// Never answer `approach`.
    pub fn stall_on(self, approach: &str) -> Self {
        lock(&self.routes).insert(approach.to_string(), Route::Stall);
        self
    }

    pub fn calls(&self) -> usize {
        *lock(&self.calls)
    }

    fn route_for(&self, prompt: &str) -> Option<Route> {
        lock(&self.routes)
            .iter()
            .find(|(approach, _)| prompt.contains(&format!("Approach: {approach}\n")))
            .map(|(_, route)| route.clone())
    }
}

#[async_trait]
impl CodeGenerator for RoutedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        *lock(&self.calls) += 1;
        if request.kind == RequestKind::Decisions {
            return Ok("[]".to_string());
        }
        match self.route_for(&request.prompt) {
            Some(Route::Reply(reply)) => Ok(reply),
            Some(Route::Panic) => panic!("scripted generator crash"),
            Some(Route::Stall) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(anyhow!("stalled generator woke up"))
            }
            None => Err(anyhow!("no route for prompt")),
        }
    }
}

#[derive(Debug, Default)]
struct ScriptedEvaluatorState {
    outcomes: VecDeque<EvalOutcome>,
    repeat: Option<EvalOutcome>,
    by_candidate: Vec<(String, EvalOutcome)>,
    installed: Vec<String>,
    evaluations: usize,
}

/// Evaluator returning queued outcomes without spawning processes. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct ScriptedEvaluator {
    state: Arc<Mutex<ScriptedEvaluatorState>>,
}

impl ScriptedEvaluator {
    pub fn new(outcomes: Vec<EvalOutcome>) -> Self {
        let evaluator = Self::default();
        lock(&evaluator.state).outcomes = outcomes.into();
        evaluator
    }

    pub fn repeating(outcome: EvalOutcome) -> Self {
        let evaluator = Self::default();
        lock(&evaluator.state).repeat = Some(outcome);
        evaluator
    }

    /// Answer according to the candidate's (trimmed) contents.
    pub fn by_candidate(table: Vec<(&str, EvalOutcome)>) -> Self {
        let evaluator = Self::default();
        lock(&evaluator.state).by_candidate = table
            .into_iter()
            .map(|(code, outcome)| (code.to_string(), outcome))
            .collect();
        evaluator
    }

    pub fn installed_scripts(&self) -> Vec<String> {
        lock(&self.state).installed.clone()
    }

    pub fn evaluations(&self) -> usize {
        lock(&self.state).evaluations
    }
}

#[async_trait]
impl Evaluator for ScriptedEvaluator {
    async fn install(&self, _workspace: &Path, script: &str) -> Result<()> {
        lock(&self.state).installed.push(script.to_string());
        Ok(())
    }

    fn candidate_path(&self, workspace: &Path) -> PathBuf {
        workspace.join("solution.py")
    }

    async fn evaluate(&self, _workspace: &Path, candidate: &Path) -> EvalOutcome {
        let code = tokio::fs::read_to_string(candidate).await.unwrap_or_default();
        let mut state = lock(&self.state);
        state.evaluations += 1;
        if let Some((_, outcome)) = state
            .by_candidate
            .iter()
            .find(|(expected, _)| expected.as_str() == code.trim())
        {
            return outcome.clone();
        }
        if let Some(outcome) = state.outcomes.pop_front() {
            return outcome;
        }
        state
            .repeat
            .clone()
            .unwrap_or_else(|| EvalOutcome::failure("scripted evaluator exhausted"))
    }
}

#[derive(Debug, Default)]
struct LocalWorkspacesState {
    fail_setup: bool,
    branches: Vec<String>,
    commits: Vec<(PathBuf, String)>,
    pushes: Vec<String>,
    pull_requests: Vec<PullRequest>,
    pull_request_url: Option<String>,
}

/// Gateway that makes plain directories and records every call. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct LocalWorkspaces {
    state: Arc<Mutex<LocalWorkspacesState>>,
}

impl LocalWorkspaces {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every worktree creation fails with a setup error.
    pub fn failing() -> Self {
        let workspaces = Self::default();
        lock(&workspaces.state).fail_setup = true;
        workspaces
    }

    /// Pull requests succeed with this URL instead of needing manual steps.
    pub fn with_pull_request_url(self, url: &str) -> Self {
        lock(&self.state).pull_request_url = Some(url.to_string());
        self
    }

    pub fn branches(&self) -> Vec<String> {
        lock(&self.state).branches.clone()
    }

    pub fn commits(&self) -> Vec<(PathBuf, String)> {
        lock(&self.state).commits.clone()
    }

    pub fn pushes(&self) -> Vec<String> {
        lock(&self.state).pushes.clone()
    }

    pub fn pull_requests(&self) -> Vec<PullRequest> {
        lock(&self.state).pull_requests.clone()
    }
}

#[async_trait]
impl VersionControlGateway for LocalWorkspaces {
    async fn create_worktree(&self, _source: &Path, branch: &str, path: &Path) -> Result<PathBuf> {
        if lock(&self.state).fail_setup {
            return Err(SetupError::Worktree {
                branch: branch.to_string(),
                detail: "scripted failure".to_string(),
            }
            .into());
        }
        tokio::fs::create_dir_all(path)
            .await
            .with_context(|| format!("create directory {}", path.display()))?;
        lock(&self.state).branches.push(branch.to_string());
        Ok(path.to_path_buf())
    }

    async fn commit_if_dirty(&self, worktree: &Path, message: &str) -> Result<bool> {
        lock(&self.state)
            .commits
            .push((worktree.to_path_buf(), message.to_string()));
        Ok(true)
    }

    async fn push(&self, _worktree: &Path, branch: &str) -> Result<()> {
        lock(&self.state).pushes.push(branch.to_string());
        Ok(())
    }

    async fn open_pull_request(
        &self,
        _worktree: &Path,
        request: &PullRequest,
    ) -> Result<PullRequestOutcome> {
        let mut state = lock(&self.state);
        state.pull_requests.push(request.clone());
        Ok(match &state.pull_request_url {
            Some(url) => PullRequestOutcome::Created { url: url.clone() },
            None => PullRequestOutcome::Manual {
                instructions: format!("open a pull request for {}", request.branch),
            },
        })
    }
}

/// Throwaway git repository with one commit on `main`.
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = tempfile::tempdir().context("create temp repo dir")?;
        let repo = Self { dir };
        repo.git(&["init", "-q", "-b", "main"])?;
        repo.git(&["config", "user.email", "fleet@example.com"])?;
        repo.git(&["config", "user.name", "Fleet Tests"])?;
        repo.git(&["config", "commit.gpgsign", "false"])?;
        std::fs::write(repo.path().join("README.md"), "# fixture\n").context("write README")?;
        repo.git(&["add", "-A"])?;
        repo.git(&["commit", "-q", "-m", "initial"])?;
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Run git in the repository, failing on non-zero exit.
    pub fn git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(self.path())
            .output()
            .with_context(|| format!("spawn git {}", args.join(" ")))?;
        if !output.status.success() {
            return Err(anyhow!(
                "git {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

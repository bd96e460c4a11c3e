//! End-to-end tournament over a real git repository and a shell evaluator.
//!
//! Approach A passes on its first iteration; approach B never passes and is
//! ranked on its last reported metrics.

use std::sync::Arc;

use fleet::core::plan::{EvaluationPlan, PlanDraft};
use fleet::core::types::RunMode;
use fleet::io::artifacts::{SUMMARY_FILE, save_winner, write_tournament_summary};
use fleet::io::config::EvaluatorConfig;
use fleet::io::evaluator::ProcessEvaluator;
use fleet::io::git::GitGateway;
use fleet::test_support::{RoutedGenerator, TestRepo, sample_plan, services};
use fleet::tournament::{Tournament, TournamentRequest};

const EVAL_SCRIPT: &str = r#"code=$(cat "$1")
if [ "$code" = "pass" ]; then
  echo '{"success": true, "tests": {"t1": {"pass": true}, "t2": {"pass": true}, "t3": {"pass": true}}, "metrics": {"correctness_score": 1.0, "simplicity_score": 0.8, "performance_score": 0.9}}'
  exit 0
fi
echo '{"success": false, "tests": {"t1": {"pass": true}, "t2": {"pass": false, "message": "wrong answer"}}, "metrics": {"simplicity_score": 0.6, "performance_score": 0.5}}'
exit 1
"#;

fn plan() -> EvaluationPlan {
    let mut draft = PlanDraft::from(sample_plan());
    draft.eval_script = EVAL_SCRIPT.to_string();
    EvaluationPlan::new(draft).expect("plan")
}

fn shell_evaluator() -> ProcessEvaluator {
    ProcessEvaluator::new(&EvaluatorConfig {
        command: vec!["sh".to_string()],
        language: "sh".to_string(),
        script_name: "eval.sh".to_string(),
        candidate_name: "solution.txt".to_string(),
        timeout_secs: 10,
        output_limit_bytes: 10_000,
    })
}

#[tokio::test]
async fn passing_approach_wins_and_failing_one_is_ranked_on_last_metrics() {
    let repo = TestRepo::new().expect("repo");
    let work = tempfile::tempdir().expect("tempdir");
    let generator = RoutedGenerator::new()
        .route("A", "```sh\npass\n```\n")
        .route("B", "```sh\nfail\n```\n");
    let tournament = Tournament::new(services(
        generator,
        shell_evaluator(),
        GitGateway::default(),
    ));
    let request = TournamentRequest {
        approaches: vec!["A".to_string(), "B".to_string()],
        max_iterations: 2,
        mode: RunMode::Speculative,
        work_base: work.path().join("agents"),
        source_repo: repo.path().to_path_buf(),
        deadline: None,
    };

    let result = tournament
        .run(Arc::new(plan()), request)
        .await
        .expect("tournament");

    let winner = result.winner().expect("winner");
    assert_eq!(winner.approach, "A");
    assert!(winner.success);
    assert_eq!(winner.iteration_count(), 1);
    assert!((winner.score - 95.0).abs() < 1e-9, "score {}", winner.score);

    let loser = result.result_for("B").expect("B result");
    assert!(!loser.success);
    assert_eq!(loser.iteration_count(), 2);
    assert!((loser.score - 8.5).abs() < 1e-9, "score {}", loser.score);
    assert_eq!(loser.diagnostics, vec!["t2: wrong answer".to_string()]);
    assert_eq!(
        loser.error.as_deref(),
        Some("max iterations (2) reached without passing all tests")
    );
    assert_eq!(result.approaches(), vec!["A", "B"]);

    let branches = repo.git(&["branch", "--list", "agent/*"]).expect("branches");
    assert!(branches.contains("agent/a"), "{branches}");
    assert!(branches.contains("agent/b"), "{branches}");
    let candidate =
        std::fs::read_to_string(winner.work_dir.join("solution.txt")).expect("candidate");
    assert_eq!(candidate, "pass");
    assert!(winner.work_dir.join("eval.sh").exists());

    let summary = write_tournament_summary(work.path(), &result).expect("summary");
    assert_eq!(summary, work.path().join(SUMMARY_FILE));
    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&summary).expect("read")).expect("json");
    assert_eq!(json["results"][0]["approach"], "A");
    assert_eq!(json["results"][1]["approach"], "B");

    let output = work.path().join("winner.txt");
    save_winner(&output, winner).expect("save winner");
    assert_eq!(std::fs::read_to_string(&output).expect("read"), "pass");
}

#[tokio::test]
async fn rerun_over_stale_worktrees_recovers() {
    let repo = TestRepo::new().expect("repo");
    let work = tempfile::tempdir().expect("tempdir");
    let request = TournamentRequest {
        approaches: vec!["A".to_string(), "B".to_string()],
        max_iterations: 1,
        mode: RunMode::Speculative,
        work_base: work.path().join("agents"),
        source_repo: repo.path().to_path_buf(),
        deadline: None,
    };
    let generator = RoutedGenerator::new()
        .route("A", "```sh\npass\n```\n")
        .route("B", "```sh\npass\n```\n");
    let tournament = Tournament::new(services(
        generator,
        shell_evaluator(),
        GitGateway::default(),
    ));

    tournament
        .run(Arc::new(plan()), request.clone())
        .await
        .expect("first run");
    let second = tournament
        .run(Arc::new(plan()), request)
        .await
        .expect("second run");

    for result in second.results() {
        assert!(result.success, "{}: {:?}", result.approach, result.error);
    }
}

//! CLI tests: spawn the binary and check exit codes and messages.

use std::io::Read;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use fleet::exit_codes;
use fleet::io::config::{DEFAULT_CONFIG_FILE, load_config};
use fleet::io::plan_store::save_plan;
use fleet::test_support::{TestRepo, sample_plan};

#[test]
fn init_writes_default_config_once() {
    let temp = tempfile::tempdir().expect("tempdir");
    let run = || {
        Command::new(env!("CARGO_BIN_EXE_fleet"))
            .current_dir(temp.path())
            .arg("init")
            .output()
            .expect("fleet init")
    };

    let first = run();
    assert_eq!(first.status.code(), Some(exit_codes::OK));
    let config = load_config(&temp.path().join(DEFAULT_CONFIG_FILE)).expect("config");
    assert_eq!(config.tournament.max_iterations, 10);

    let second = run();
    assert_eq!(second.status.code(), Some(exit_codes::ERROR));
    assert!(String::from_utf8_lossy(&second.stderr).contains("already exists"));
}

#[test]
fn single_approach_is_rejected_before_any_work() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = Command::new(env!("CARGO_BIN_EXE_fleet"))
        .current_dir(temp.path())
        .args(["plan", "rate limiter", "token bucket"])
        .output()
        .expect("fleet plan");

    assert_eq!(output.status.code(), Some(exit_codes::ERROR));
    assert!(String::from_utf8_lossy(&output.stderr).contains("at least 2 approaches"));
    assert!(!temp.path().join("plan.json").exists());
}

#[test]
fn missing_api_key_is_reported() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = Command::new(env!("CARGO_BIN_EXE_fleet"))
        .current_dir(temp.path())
        .env_remove("ANTHROPIC_API_KEY")
        .args(["plan", "rate limiter", "token bucket", "sliding window"])
        .output()
        .expect("fleet plan");

    assert_eq!(output.status.code(), Some(exit_codes::ERROR));
    assert!(String::from_utf8_lossy(&output.stderr).contains("ANTHROPIC_API_KEY"));
}

#[test]
fn interrupt_at_plan_confirmation_exits_promptly() {
    let temp = tempfile::tempdir().expect("tempdir");
    let repo = TestRepo::new().expect("repo");
    let plan_path = temp.path().join("plan.json");
    save_plan(&plan_path, &sample_plan()).expect("save plan");

    let mut child = Command::new(env!("CARGO_BIN_EXE_fleet"))
        .current_dir(temp.path())
        .env("ANTHROPIC_API_KEY", "test-key")
        .args(["run", "rate limiter", "token bucket", "sliding window"])
        .arg("--repo")
        .arg(repo.path())
        .arg("--plan")
        .arg(&plan_path)
        .arg("--work-dir")
        .arg(temp.path().join("work"))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn fleet run");
    // Held open so the confirmation read blocks instead of seeing EOF.
    let _stdin = child.stdin.take().expect("stdin");

    let mut stdout = child.stdout.take().expect("stdout");
    let mut seen = String::new();
    let mut chunk = [0u8; 1024];
    while !seen.contains("Proceed with this plan?") {
        let n = stdout.read(&mut chunk).expect("read stdout");
        assert!(n > 0, "fleet exited before prompting: {seen}");
        seen.push_str(&String::from_utf8_lossy(&chunk[..n]));
    }

    let status = Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .expect("send SIGINT");
    assert!(status.success());

    let deadline = Instant::now() + Duration::from_secs(10);
    let exit = loop {
        if let Some(exit) = child.try_wait().expect("poll fleet") {
            break exit;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            panic!("fleet still running after SIGINT");
        }
        std::thread::sleep(Duration::from_millis(50));
    };
    assert_eq!(exit.code(), Some(exit_codes::INTERRUPTED));
}

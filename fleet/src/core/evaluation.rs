//! Normalization of evaluator output into a uniform outcome.
//!
//! The evaluator contract: print one JSON object on stdout, exit 0 only when
//! every test passed. Anything else collapses into a failing outcome with a
//! descriptive message instead of an error.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::core::types::Metrics;

/// Message used when a failing test carries no message of its own.
pub const DEFAULT_FAILURE_MESSAGE: &str = "Failed";

/// Normalized result of one evaluation run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EvalOutcome {
    pub success: bool,
    pub tests_passed: u32,
    pub tests_failed: u32,
    /// One `"<test>: <message>"` entry per failing test, or a single synthetic message.
    pub error_messages: Vec<String>,
    pub metrics: Metrics,
}

impl EvalOutcome {
    /// Failing outcome for an evaluation that produced no usable report: one failed, one message.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            tests_failed: 1,
            error_messages: vec![message.into()],
            ..Self::default()
        }
    }

    pub fn timed_out(timeout: Duration) -> Self {
        Self::failure(format!(
            "evaluation timed out after {} seconds",
            timeout.as_secs()
        ))
    }

    pub fn launch_failed(err: &anyhow::Error) -> Self {
        Self::failure(format!("evaluation error: {err:#}"))
    }
}

#[derive(Debug, Deserialize)]
struct RawReport {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    tests: BTreeMap<String, RawTest>,
    #[serde(default)]
    metrics: BTreeMap<String, Value>,
}

#[derive(Debug, Deserialize)]
struct RawTest {
    #[serde(default)]
    pass: bool,
    #[serde(default)]
    message: Option<String>,
}

/// Interpret evaluator stdout plus its exit code.
///
/// Success requires both the report's `success` flag and a zero exit code.
/// Non-numeric metrics are dropped.
pub fn normalize_report(stdout: &str, exit_code: Option<i32>) -> EvalOutcome {
    let report: RawReport = match serde_json::from_str(stdout.trim()) {
        Ok(report) => report,
        Err(_) => {
            return EvalOutcome::failure(format!("evaluator output invalid JSON: {stdout}"));
        }
    };

    let mut outcome = EvalOutcome {
        success: report.success && exit_code == Some(0),
        ..EvalOutcome::default()
    };
    for (name, test) in report.tests {
        if test.pass {
            outcome.tests_passed += 1;
        } else {
            outcome.tests_failed += 1;
            let message = test
                .message
                .filter(|message| !message.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string());
            outcome.error_messages.push(format!("{name}: {message}"));
        }
    }
    outcome.metrics = report
        .metrics
        .into_iter()
        .filter_map(|(name, value)| value.as_f64().map(|number| (name, number)))
        .collect();
    outcome
}

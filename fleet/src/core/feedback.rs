//! Feedback carried from one failed iteration into the next prompt.

/// Status shown to the agent before any evaluation has run.
pub const INITIAL_STATUS: &str = "None";

/// One-line test status for the prompt, e.g. `3 passed / 5 total`.
pub fn format_status(tests_passed: u32, tests_failed: u32) -> String {
    format!(
        "{tests_passed} passed / {} total",
        tests_passed + tests_failed
    )
}

/// Failure block fed into the next prompt. Empty when there is nothing to report.
pub fn format_failure_summary(error_messages: &[String]) -> String {
    if error_messages.is_empty() {
        return String::new();
    }
    let mut summary = String::from("**Previous Iteration Failed:**\n\nFailed Tests:\n");
    for message in error_messages {
        summary.push_str("- ");
        summary.push_str(message);
        summary.push('\n');
    }
    summary.push_str("\nPlease analyze these failures and fix the issues in your solution.");
    summary
}

//! Terminal observer for interactive tournaments.

use std::io::{BufRead, Write};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::warn;

use crate::core::types::Decision;
use crate::ledger::{DecisionObserver, Verdict};

/// Asks the user on stdin/stdout whether to keep each decision.
///
/// Prompts from concurrent agents are serialized so questions never interleave.
#[derive(Debug, Default)]
pub struct ConsoleObserver {
    turn: Mutex<()>,
}

impl ConsoleObserver {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DecisionObserver for ConsoleObserver {
    async fn review(&self, approach: &str, decision: &Decision) -> Verdict {
        let _turn = self.turn.lock().await;
        let question = render_question(approach, decision);
        let answer = tokio::task::spawn_blocking(move || ask(&question)).await;
        match answer {
            Ok(Ok(line)) => interpret_answer(&line, decision),
            Ok(Err(err)) => {
                warn!(err = %err, "could not read answer, keeping agent choice");
                Verdict::Accept
            }
            Err(err) => {
                warn!(err = %err, "prompt task failed, keeping agent choice");
                Verdict::Accept
            }
        }
    }
}

fn ask(question: &str) -> std::io::Result<String> {
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(question.as_bytes())?;
    stdout.flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line)
}

/// Question text listing the options by number.
pub fn render_question(approach: &str, decision: &Decision) -> String {
    let mut text = format!("\n[{approach}] {}\n", decision.question);
    for (index, option) in decision.options.iter().enumerate() {
        let marker = if *option == decision.chosen { " (chosen)" } else { "" };
        text.push_str(&format!("  {}. {option}{marker}\n", index + 1));
    }
    if !decision.reasoning.is_empty() {
        text.push_str(&format!("Reasoning: {}\n", decision.reasoning));
    }
    text.push_str("Enter to accept, or an option number: ");
    text
}

/// Empty input accepts; a valid option number overrides; anything else accepts.
pub fn interpret_answer(answer: &str, decision: &Decision) -> Verdict {
    let answer = answer.trim();
    if answer.is_empty() || answer.eq_ignore_ascii_case("y") {
        return Verdict::Accept;
    }
    let picked = answer
        .parse::<usize>()
        .ok()
        .and_then(|n| n.checked_sub(1))
        .and_then(|index| decision.options.get(index));
    match picked {
        Some(option) if *option == decision.chosen => Verdict::Accept,
        Some(option) => Verdict::Override(option.clone()),
        None => {
            warn!(answer, "unrecognized answer, keeping agent choice");
            Verdict::Accept
        }
    }
}

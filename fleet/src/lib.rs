//! Multi-agent coding tournament.
//!
//! Several agents implement the same task with different approaches, each in
//! its own git worktree, and are judged by one evaluator written before any
//! code exists. The architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (plan validation, scoring, output
//!   normalization, naming). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting adapters (processes, git, the model API,
//!   prompts, files). Each capability sits behind a trait so tests can script it.
//!
//! Orchestration modules ([`planner`], [`agent`], [`tournament`], [`publish`])
//! coordinate core logic with I/O to implement the CLI commands.

pub mod agent;
pub mod console;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod ledger;
pub mod logging;
pub mod planner;
pub mod publish;
pub mod report;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tournament;

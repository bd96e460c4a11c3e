//! I/O adapters: processes, git, the model API, prompts, and files.

pub mod artifacts;
pub mod config;
pub mod evaluator;
pub mod generator;
pub mod git;
pub mod parser;
pub mod plan_store;
pub mod process;
pub mod prompt;

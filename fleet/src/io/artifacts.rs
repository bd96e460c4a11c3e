//! Tournament artifacts written under the work directory.
//!
//! These are product output for humans and follow-up tooling; they are
//! always written, independent of `RUST_LOG`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::core::naming::pull_request_file_name;
use crate::core::types::{AgentResult, TournamentResult};

pub const SUMMARY_FILE: &str = "tournament.json";
pub const PULL_REQUEST_DIR: &str = "pull_requests";

/// Persist the ranked tournament as `<work_base>/tournament.json`.
pub fn write_tournament_summary(work_base: &Path, result: &TournamentResult) -> Result<PathBuf> {
    let path = work_base.join(SUMMARY_FILE);
    write_json(&path, result)?;
    Ok(path)
}

/// Write the winner's final candidate to `path`.
pub fn save_winner(path: &Path, winner: &AgentResult) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(path, &winner.final_code).with_context(|| format!("write {}", path.display()))
}

/// Persist a pull request body as `<work_base>/pull_requests/<branch>.md`.
pub fn write_pull_request_body(work_base: &Path, branch: &str, body: &str) -> Result<PathBuf> {
    let dir = work_base.join(PULL_REQUEST_DIR);
    fs::create_dir_all(&dir).with_context(|| format!("create directory {}", dir.display()))?;
    let path = dir.join(pull_request_file_name(branch));
    fs::write(&path, body).with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let contents = serde_json::to_string_pretty(value).context("serialize json")?;
    fs::write(path, format!("{contents}\n")).with_context(|| format!("write {}", path.display()))
}

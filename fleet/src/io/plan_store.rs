//! Plan load/save helpers with schema + weight validation.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use jsonschema::Draft;
use serde_json::Value;

use crate::core::plan::{EvaluationPlan, PlanDraft, PlanError};

const PLAN_SCHEMA: &str = include_str!("../../schemas/plan.schema.json");

/// Validate a JSON value against the plan schema and build the plan.
pub fn plan_from_value(value: Value) -> Result<EvaluationPlan, PlanError> {
    let schema: Value =
        serde_json::from_str(PLAN_SCHEMA).map_err(|err| PlanError::Json(err.to_string()))?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .map_err(|err| PlanError::Json(format!("invalid plan schema: {err}")))?;
    let messages: Vec<String> = compiled
        .iter_errors(&value)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(PlanError::Schema(messages));
    }
    let draft: PlanDraft =
        serde_json::from_value(value).map_err(|err| PlanError::Json(err.to_string()))?;
    EvaluationPlan::new(draft)
}

/// Load and validate a plan from disk.
pub fn load_plan(path: &Path) -> Result<EvaluationPlan> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read plan {}", path.display()))?;
    let value: Value = serde_json::from_str(&contents)
        .with_context(|| format!("parse plan {}", path.display()))?;
    let plan = plan_from_value(value).with_context(|| format!("validate plan {}", path.display()))?;
    Ok(plan)
}

/// Write a plan as pretty JSON.
pub fn save_plan(path: &Path, plan: &EvaluationPlan) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut buf = serde_json::to_string_pretty(plan).context("serialize plan")?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write plan {}", path.display()))
}

//! Planning stage: asks the generator for an evaluation plan before any agent runs.

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::core::plan::{EvaluationPlan, PlanError};
use crate::io::generator::{CodeGenerator, GenerationLimits, GenerationRequest, RequestKind};
use crate::io::parser::preferred_fence;
use crate::io::plan_store::plan_from_value;
use crate::io::prompt::PromptEngine;

/// Source fragments a Python evaluator needs to honour the runner contract.
pub const EVAL_SCRIPT_ELEMENTS: [&str; 6] = [
    "import sys",
    "import json",
    "if __name__",
    "sys.argv[1]",
    "print(json.dumps(",
    "sys.exit(",
];

/// Generate and validate a plan for `task` across `approaches`.
#[instrument(skip_all, fields(approaches = approaches.len()))]
pub async fn generate_plan(
    generator: &dyn CodeGenerator,
    limits: GenerationLimits,
    prompts: &PromptEngine,
    task: &str,
    approaches: &[String],
) -> Result<EvaluationPlan> {
    let prompt = prompts
        .render_planner(task, approaches)
        .context("render planner prompt")?;
    let response = generator
        .generate(&GenerationRequest {
            kind: RequestKind::Plan,
            prompt,
            max_tokens: limits.max_tokens,
        })
        .await
        .context("generate plan")?;
    let plan = parse_plan_response(&response)?;
    let missing = validate_eval_script(plan.eval_script());
    if !missing.is_empty() {
        warn!(missing = ?missing, "evaluator script lacks expected elements");
    }
    info!(
        tests = plan.test_count(),
        metrics = plan.metrics().len(),
        "plan generated"
    );
    Ok(plan)
}

/// Extract the plan object from a planner response and validate it fully.
pub fn parse_plan_response(response: &str) -> Result<EvaluationPlan, PlanError> {
    let raw = extract_json_object(response).ok_or(PlanError::NoJson)?;
    let value: Value = serde_json::from_str(raw).map_err(|err| PlanError::Json(err.to_string()))?;
    let plan = plan_from_value(value)?;
    plan.validate_generated()?;
    Ok(plan)
}

/// JSON from a `json` fence, any fence, or the outermost braces.
fn extract_json_object(response: &str) -> Option<&str> {
    if let Some(body) = preferred_fence(response, "json") {
        return Some(body.trim());
    }
    match (response.find('{'), response.rfind('}')) {
        (Some(start), Some(end)) if start < end => Some(&response[start..=end]),
        _ => None,
    }
}

/// Entry-point elements absent from an evaluator source, in declaration order.
pub fn validate_eval_script(source: &str) -> Vec<&'static str> {
    EVAL_SCRIPT_ELEMENTS
        .into_iter()
        .filter(|element| !source.contains(element))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedGenerator, ScriptedReply};

    const EVAL: &str = "import sys\\nimport json\\n\\nif __name__ == '__main__':\\n    \
                        path = sys.argv[1]\\n    print(json.dumps({}))\\n    sys.exit(0)\\n";

    fn plan_json(weights: &str, tests: usize) -> String {
        let categories = ["correctness", "edge_cases", "performance"];
        let tests: Vec<String> = (0..tests)
            .map(|i| {
                format!(
                    r#"{{"name": "t{i}", "category": "{}", "description": "d"}}"#,
                    categories[i % 3]
                )
            })
            .collect();
        format!(
            r#"{{"resolved_task": "Rate limiter", "interface_contract": "class RateLimiter",
                "tests": [{}],
                "metrics": ["correctness_score", "simplicity_score", "performance_score"],
                "weights": {weights}, "eval_script": "{EVAL}"}}"#,
            tests.join(", ")
        )
    }

    fn standard() -> String {
        plan_json(
            r#"{"correctness": 60, "simplicity": 25, "performance": 15}"#,
            3,
        )
    }

    fn limits() -> GenerationLimits {
        GenerationLimits {
            max_tokens: 8192,
            decision_max_tokens: 2048,
        }
    }

    #[tokio::test]
    async fn fenced_plan_is_parsed_and_prompt_names_approaches() {
        let generator = ScriptedGenerator::new(vec![ScriptedReply::Text(format!(
            "Here is the plan.\n```json\n{}\n```\n",
            standard()
        ))]);
        let approaches = vec!["token bucket".to_string(), "sliding window".to_string()];

        let plan = generate_plan(
            &generator,
            limits(),
            &PromptEngine::new(),
            "rate limiter",
            &approaches,
        )
        .await
        .expect("plan");

        assert_eq!(plan.test_count(), 3);
        assert_eq!(plan.category_weight("correctness"), 60.0);
        let prompts = generator.prompts_of(RequestKind::Plan);
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("- token bucket\n- sliding window\n"));
    }

    #[test]
    fn bare_object_surrounded_by_prose_is_accepted() {
        let response = format!("Sure!\n{}\nGood luck.", standard());
        let plan = parse_plan_response(&response).expect("plan");
        assert_eq!(plan.resolved_task(), "Rate limiter");
    }

    #[test]
    fn response_without_json_is_rejected() {
        assert_eq!(
            parse_plan_response("I cannot help with that."),
            Err(PlanError::NoJson)
        );
    }

    #[test]
    fn weights_off_by_more_than_tolerance_are_rejected() {
        let response = plan_json(
            r#"{"correctness": 60, "simplicity": 25, "performance": 14}"#,
            3,
        );
        assert!(matches!(
            parse_plan_response(&response),
            Err(PlanError::WeightSum { .. })
        ));
    }

    #[test]
    fn two_tests_are_too_few() {
        let response = plan_json(
            r#"{"correctness": 60, "simplicity": 25, "performance": 15}"#,
            2,
        );
        assert_eq!(
            parse_plan_response(&response),
            Err(PlanError::TooFewTests { found: 2, min: 3 })
        );
    }

    #[test]
    fn missing_standard_weight_is_rejected() {
        let response = plan_json(r#"{"correctness": 70, "readability": 30}"#, 3);
        let err = parse_plan_response(&response).expect_err("must fail");
        assert!(
            matches!(
                err,
                PlanError::MissingWeight(_) | PlanError::Schema(_)
            ),
            "{err:?}"
        );
    }

    #[tokio::test]
    async fn generator_failure_aborts_planning() {
        let generator = ScriptedGenerator::new(vec![ScriptedReply::Fail("overloaded".into())]);
        let err = generate_plan(
            &generator,
            limits(),
            &PromptEngine::new(),
            "task",
            &["a".to_string(), "b".to_string()],
        )
        .await
        .expect_err("must fail");
        assert!(format!("{err:#}").contains("overloaded"));
    }

    #[test]
    fn eval_script_elements_are_reported_when_missing() {
        assert!(validate_eval_script(&EVAL.replace("\\n", "\n")).is_empty());
        assert_eq!(
            validate_eval_script("import json\nprint(json.dumps({}))\n"),
            vec!["import sys", "if __name__", "sys.argv[1]", "sys.exit("]
        );
    }
}

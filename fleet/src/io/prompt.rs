//! Prompt rendering for the planner, the agents, and decision extraction.

use anyhow::Result;
use minijinja::{Environment, context};

const AGENT_TEMPLATE: &str = include_str!("prompts/agent.md");
const DECISIONS_TEMPLATE: &str = include_str!("prompts/decisions.md");
const PLANNER_TEMPLATE: &str = include_str!("prompts/planner.md");

/// Everything an agent prompt shows for one iteration.
#[derive(Debug, Clone)]
pub struct AgentPromptInputs<'a> {
    pub approach: &'a str,
    pub resolved_task: &'a str,
    pub interface_contract: &'a str,
    pub eval_script: &'a str,
    pub iteration: u32,
    pub max_iterations: u32,
    pub previous_status: &'a str,
    /// Failure summary from the previous iteration; empty on the first.
    pub failure: &'a str,
    /// Fence tag the candidate must be returned in.
    pub language: &'a str,
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("agent", AGENT_TEMPLATE)
            .expect("agent template should be valid");
        env.add_template("decisions", DECISIONS_TEMPLATE)
            .expect("decisions template should be valid");
        env.add_template("planner", PLANNER_TEMPLATE)
            .expect("planner template should be valid");
        Self { env }
    }

    pub fn render_agent(&self, input: &AgentPromptInputs<'_>) -> Result<String> {
        let template = self.env.get_template("agent")?;
        let rendered = template.render(context! {
            approach => input.approach,
            resolved_task => input.resolved_task.trim(),
            interface_contract => input.interface_contract.trim(),
            eval_script => input.eval_script.trim_end(),
            iteration => input.iteration,
            max_iterations => input.max_iterations,
            previous_status => input.previous_status,
            failure => (!input.failure.trim().is_empty()).then(|| input.failure.trim()),
            language => input.language,
        })?;
        Ok(rendered)
    }

    pub fn render_decisions(&self, output: &str) -> Result<String> {
        let template = self.env.get_template("decisions")?;
        Ok(template.render(context! { output => output.trim() })?)
    }

    pub fn render_planner(&self, task: &str, approaches: &[String]) -> Result<String> {
        let template = self.env.get_template("planner")?;
        Ok(template.render(context! { task => task.trim(), approaches => approaches })?)
    }
}

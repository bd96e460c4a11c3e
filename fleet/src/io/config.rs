//! Fleet configuration, read from an optional `fleet.toml`.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_FILE: &str = "fleet.toml";

/// Tournament configuration (TOML).
///
/// Missing fields default to values that work against the hosted API with a
/// Python evaluator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct FleetConfig {
    pub generator: GeneratorConfig,
    pub evaluator: EvaluatorConfig,
    pub tournament: TournamentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeneratorConfig {
    pub api_url: String,
    pub model: String,
    /// Token budget for candidate and plan generation.
    pub max_tokens: u32,
    /// Token budget for the follow-up decision extraction call.
    pub decision_max_tokens: u32,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub request_timeout_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.anthropic.com/v1/messages".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 8192,
            decision_max_tokens: 2048,
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            request_timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// Interpreter invoked as `<command..> <script> <candidate>`.
    pub command: Vec<String>,
    /// Language tag agents must fence their candidate in.
    pub language: String,
    pub script_name: String,
    pub candidate_name: String,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            command: vec!["python3".to_string()],
            language: "python".to_string(),
            script_name: "eval.py".to_string(),
            candidate_name: "solution.py".to_string(),
            timeout_secs: 30,
            output_limit_bytes: 100_000,
        }
    }
}

impl EvaluatorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TournamentConfig {
    pub max_iterations: u32,
    pub min_approaches: usize,
    pub max_approaches: usize,
    pub work_dir: PathBuf,
    /// Wall-clock limit for the whole tournament; agents still running are cancelled.
    pub deadline_secs: Option<u64>,
}

impl Default for TournamentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            min_approaches: 2,
            max_approaches: 5,
            work_dir: PathBuf::from("work"),
            deadline_secs: None,
        }
    }
}

impl FleetConfig {
    pub fn validate(&self) -> Result<()> {
        if self.generator.max_tokens == 0 || self.generator.decision_max_tokens == 0 {
            return Err(anyhow!("generator token limits must be > 0"));
        }
        if self.generator.model.trim().is_empty() {
            return Err(anyhow!("generator.model must not be empty"));
        }
        if self.evaluator.command.is_empty() || self.evaluator.command[0].trim().is_empty() {
            return Err(anyhow!("evaluator.command must be a non-empty array"));
        }
        if self.evaluator.timeout_secs == 0 {
            return Err(anyhow!("evaluator.timeout_secs must be > 0"));
        }
        if self.evaluator.output_limit_bytes == 0 {
            return Err(anyhow!("evaluator.output_limit_bytes must be > 0"));
        }
        if self.evaluator.script_name == self.evaluator.candidate_name {
            return Err(anyhow!(
                "evaluator.script_name and evaluator.candidate_name must differ"
            ));
        }
        if self.tournament.max_iterations == 0 {
            return Err(anyhow!("tournament.max_iterations must be > 0"));
        }
        if self.tournament.min_approaches < 2
            || self.tournament.max_approaches < self.tournament.min_approaches
        {
            return Err(anyhow!(
                "tournament approach bounds must satisfy 2 <= min_approaches <= max_approaches"
            ));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `FleetConfig::default()`.
pub fn load_config(path: &Path) -> Result<FleetConfig> {
    if !path.exists() {
        let cfg = FleetConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: FleetConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &FleetConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, buf).with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

/// API key read from the environment. Never printed.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Environment overrides applied on top of the file config.
pub const MODEL_ENV: &str = "AGENTFLEET_MODEL";
pub const MAX_TOKENS_ENV: &str = "AGENTFLEET_MAX_TOKENS";

/// Config plus secrets, resolved once at startup and passed down explicitly.
#[derive(Debug, Clone)]
pub struct Settings {
    pub config: FleetConfig,
    pub credentials: Option<Credentials>,
}

impl Settings {
    /// Apply environment overrides using `lookup` (usually `std::env::var`).
    pub fn resolve(
        mut config: FleetConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        if let Some(model) = lookup(MODEL_ENV).filter(|value| !value.trim().is_empty()) {
            config.generator.model = model;
        }
        if let Some(raw) = lookup(MAX_TOKENS_ENV) {
            config.generator.max_tokens = raw
                .trim()
                .parse()
                .with_context(|| format!("parse {MAX_TOKENS_ENV}='{raw}'"))?;
        }
        config.validate()?;
        let credentials = lookup(&config.generator.api_key_env)
            .filter(|value| !value.trim().is_empty())
            .map(Credentials::new);
        Ok(Self {
            config,
            credentials,
        })
    }

    /// Credentials, or an error naming the variable to set.
    pub fn require_credentials(&self) -> Result<&Credentials> {
        self.credentials.as_ref().ok_or_else(|| {
            anyhow!(
                "{} environment variable not set",
                self.config.generator.api_key_env
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, FleetConfig::default());
        assert_eq!(cfg.evaluator.timeout(), Duration::from_secs(30));
        assert_eq!(cfg.tournament.max_iterations, 10);
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("fleet.toml");
        let mut cfg = FleetConfig::default();
        cfg.tournament.deadline_secs = Some(600);
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("fleet.toml");
        fs::write(&path, "[evaluator]\ncommand = [\"sh\"]\ntimeout_secs = 5\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.evaluator.command, vec!["sh".to_string()]);
        assert_eq!(cfg.evaluator.timeout_secs, 5);
        assert_eq!(cfg.evaluator.script_name, "eval.py");
        assert_eq!(cfg.generator.max_tokens, 8192);
    }

    #[test]
    fn rejects_empty_evaluator_command() {
        let mut cfg = FleetConfig::default();
        cfg.evaluator.command.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn environment_overrides_model_and_tokens() {
        let settings = Settings::resolve(
            FleetConfig::default(),
            env(&[
                ("AGENTFLEET_MODEL", "claude-test"),
                ("AGENTFLEET_MAX_TOKENS", "4096"),
                ("ANTHROPIC_API_KEY", "sk-test"),
            ]),
        )
        .expect("settings");
        assert_eq!(settings.config.generator.model, "claude-test");
        assert_eq!(settings.config.generator.max_tokens, 4096);
        assert_eq!(
            settings.require_credentials().expect("key").api_key(),
            "sk-test"
        );
        assert!(!format!("{settings:?}").contains("sk-test"));
    }

    #[test]
    fn missing_api_key_is_reported_on_demand() {
        let settings = Settings::resolve(FleetConfig::default(), env(&[])).expect("settings");
        let err = settings.require_credentials().expect_err("no key");
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }

    #[test]
    fn malformed_token_override_fails() {
        let err = Settings::resolve(FleetConfig::default(), env(&[("AGENTFLEET_MAX_TOKENS", "lots")]))
            .expect_err("bad override");
        assert!(format!("{err:#}").contains("AGENTFLEET_MAX_TOKENS"));
    }
}

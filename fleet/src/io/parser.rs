//! Extraction of candidate code and decisions from free-form model output.

use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::core::types::Decision;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("no code block found in response")]
    NoCodeFound,
}

/// Turns generator output into a candidate and a list of decisions.
pub trait ResponseParser: Send + Sync {
    /// Candidate source, or [`ParseError::NoCodeFound`].
    fn extract_code(&self, text: &str) -> Result<String, ParseError>;

    /// Best effort; malformed input yields an empty list.
    fn extract_decisions(&self, text: &str) -> Vec<Decision>;
}

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```([A-Za-z0-9_+.-]*)[^\n]*\n(.*?)(?:```|\z)").expect("fence regex")
});

static CODE_SHAPE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(class|def|fn|pub fn|function|struct|import|from)\b")
        .expect("code shape regex")
});

static DECISION_FIELD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(DECISION|OPTIONS|CHOSEN|REASONING|BLOCKING):[ \t]*(.*)$")
        .expect("decision field regex")
});

struct Fence<'a> {
    language: &'a str,
    body: &'a str,
}

fn fences(text: &str) -> impl Iterator<Item = Fence<'_>> {
    FENCE_RE.captures_iter(text).filter_map(|caps| {
        Some(Fence {
            language: caps.get(1)?.as_str(),
            body: caps.get(2)?.as_str(),
        })
    })
}

/// Body of the first fence tagged `language`, else of the first fence at all.
pub fn preferred_fence<'a>(text: &'a str, language: &str) -> Option<&'a str> {
    fences(text)
        .find(|fence| fence.language.eq_ignore_ascii_case(language))
        .or_else(|| fences(text).next())
        .map(|fence| fence.body)
}

/// Parser for fenced Markdown responses.
#[derive(Debug, Clone)]
pub struct FencedResponseParser {
    language: String,
}

impl Default for FencedResponseParser {
    fn default() -> Self {
        Self::new("python")
    }
}

impl FencedResponseParser {
    /// `language` is the fence tag preferred when a response holds several blocks.
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
        }
    }
}

impl ResponseParser for FencedResponseParser {
    fn extract_code(&self, text: &str) -> Result<String, ParseError> {
        if let Some(body) = preferred_fence(text, &self.language) {
            return Ok(body.trim().to_string());
        }
        if CODE_SHAPE_RE.is_match(text) {
            debug!("no fenced block, using whole response as code");
            return Ok(text.trim().to_string());
        }
        Err(ParseError::NoCodeFound)
    }

    fn extract_decisions(&self, text: &str) -> Vec<Decision> {
        let from_json = json_decisions(text);
        if !from_json.is_empty() {
            return from_json;
        }
        labeled_decisions(text)
    }
}

#[derive(Debug, Deserialize)]
struct RawDecision {
    question: String,
    #[serde(default)]
    options: Vec<String>,
    chosen: String,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    blocking: bool,
}

impl From<RawDecision> for Decision {
    fn from(raw: RawDecision) -> Self {
        Decision::new(
            raw.question,
            raw.options,
            raw.chosen,
            raw.reasoning,
            raw.blocking,
        )
    }
}

/// JSON array from a `json` fence, any fence, or the outermost brackets.
fn json_decisions(text: &str) -> Vec<Decision> {
    let fenced = preferred_fence(text, "json");
    let bracketed = match (text.find('['), text.rfind(']')) {
        (Some(start), Some(end)) if start < end => Some(&text[start..=end]),
        _ => None,
    };
    for candidate in [fenced, bracketed].into_iter().flatten() {
        let Ok(Value::Array(entries)) = serde_json::from_str::<Value>(candidate.trim()) else {
            continue;
        };
        return entries
            .into_iter()
            .filter_map(|entry| serde_json::from_value::<RawDecision>(entry).ok())
            .map(Decision::from)
            .collect();
    }
    Vec::new()
}

/// `DECISION:` / `OPTIONS:` / `CHOSEN:` / `REASONING:` / `BLOCKING:` blocks.
fn labeled_decisions(text: &str) -> Vec<Decision> {
    let mut decisions = Vec::new();
    let mut current: Option<RawDecision> = None;
    for caps in DECISION_FIELD_RE.captures_iter(text) {
        let (Some(label), Some(value)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let value = value.as_str().trim();
        match label.as_str() {
            "DECISION" => {
                if let Some(done) = current.take() {
                    decisions.push(done);
                }
                current = Some(RawDecision {
                    question: value.to_string(),
                    options: Vec::new(),
                    chosen: String::new(),
                    reasoning: String::new(),
                    blocking: false,
                });
            }
            "OPTIONS" => {
                if let Some(raw) = current.as_mut() {
                    raw.options = split_options(value);
                }
            }
            "CHOSEN" => {
                if let Some(raw) = current.as_mut() {
                    raw.chosen = value.to_string();
                }
            }
            "REASONING" => {
                if let Some(raw) = current.as_mut() {
                    raw.reasoning = value.to_string();
                }
            }
            "BLOCKING" => {
                if let Some(raw) = current.as_mut() {
                    raw.blocking = matches!(value.to_ascii_lowercase().as_str(), "yes" | "true");
                }
            }
            _ => {}
        }
    }
    if let Some(done) = current {
        decisions.push(done);
    }
    decisions
        .into_iter()
        .filter(|raw| !raw.question.is_empty() && !raw.chosen.is_empty())
        .map(Decision::from)
        .collect()
}

fn split_options(value: &str) -> Vec<String> {
    value
        .trim_start_matches('[')
        .trim_end_matches(']')
        .split(',')
        .map(|option| option.trim().trim_matches(['"', '\'']).trim().to_string())
        .filter(|option| !option.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> FencedResponseParser {
        FencedResponseParser::default()
    }

    #[test]
    fn prefers_python_block() {
        let text = "Plan:\n```text\nnotes\n```\n\n```python\nclass RateLimiter:\n    pass\n```\n";
        assert_eq!(
            parser().extract_code(text).expect("code"),
            "class RateLimiter:\n    pass"
        );
    }

    #[test]
    fn falls_back_to_first_fence() {
        let text = "```\ndef allow():\n    return True\n```";
        assert_eq!(
            parser().extract_code(text).expect("code"),
            "def allow():\n    return True"
        );
    }

    #[test]
    fn unterminated_fence_takes_rest() {
        let text = "```python\ndef f():\n    return 1\n";
        assert_eq!(
            parser().extract_code(text).expect("code"),
            "def f():\n    return 1"
        );
    }

    #[test]
    fn code_shaped_text_is_accepted_whole() {
        let text = "import time\n\nclass Bucket:\n    pass\n";
        assert_eq!(parser().extract_code(text).expect("code"), text.trim());
    }

    #[test]
    fn prose_is_rejected() {
        assert_eq!(
            parser().extract_code("I cannot help with that."),
            Err(ParseError::NoCodeFound)
        );
    }

    #[test]
    fn decisions_from_json_fence() {
        let text = r#"Here you go:
```json
[
  {"question": "Storage?", "options": ["dict", "deque"], "chosen": "deque",
   "reasoning": "O(1) eviction", "blocking": true},
  {"question": "Clock?", "chosen": "monotonic"}
]
```"#;
        let decisions = parser().extract_decisions(text);
        assert_eq!(decisions.len(), 2);
        assert_eq!(decisions[0].chosen, "deque");
        assert!(decisions[0].blocking);
        assert!(!decisions[1].blocking);
        assert!(decisions[1].options.is_empty());
    }

    #[test]
    fn decisions_from_bare_array_skip_malformed_entries() {
        let text = r#"Decisions: [{"question": "Q", "chosen": "A"}, {"nope": 1}]"#;
        let decisions = parser().extract_decisions(text);
        assert_eq!(decisions.len(), 1);
        assert_eq!(decisions[0].question, "Q");
    }

    #[test]
    fn decisions_from_labeled_blocks() {
        let text = "\
DECISION: Time source
OPTIONS: [time.time, time.monotonic]
CHOSEN: time.monotonic
REASONING: immune to clock changes
BLOCKING: yes

DECISION: Naming
OPTIONS: a, b
CHOSEN: a
REASONING: shorter
";
        let decisions = parser().extract_decisions(text);
        assert_eq!(decisions.len(), 2);
        assert_eq!(
            decisions[0].options,
            vec!["time.time".to_string(), "time.monotonic".to_string()]
        );
        assert!(decisions[0].blocking);
        assert_eq!(decisions[1].chosen, "a");
        assert!(!decisions[1].blocking);
    }

    #[test]
    fn garbage_yields_no_decisions() {
        assert!(parser().extract_decisions("nothing here [oops").is_empty());
        assert!(parser().extract_decisions("```json\n{not json}\n```").is_empty());
    }
}

//! Code generator abstraction and the hosted-model implementation.
//!
//! The [`CodeGenerator`] trait decouples planning and the convergence loop
//! from the model backend. Tests use scripted generators that return
//! predetermined text without network access.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::io::config::{Credentials, GeneratorConfig};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// What a generation request is for. Lets scripted generators answer by purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Plan,
    Candidate,
    Decisions,
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub kind: RequestKind,
    pub prompt: String,
    pub max_tokens: u32,
}

/// Produces text for a prompt.
#[async_trait]
pub trait CodeGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

/// Token budgets for the two kinds of calls an agent makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationLimits {
    pub max_tokens: u32,
    pub decision_max_tokens: u32,
}

impl From<&GeneratorConfig> for GenerationLimits {
    fn from(config: &GeneratorConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            decision_max_tokens: config.decision_max_tokens,
        }
    }
}

#[derive(Debug, Serialize)]
struct MessageRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [Message<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

/// Generator backed by the Anthropic Messages API.
pub struct AnthropicGenerator {
    client: Client,
    api_url: String,
    model: String,
    credentials: Credentials,
}

impl AnthropicGenerator {
    pub fn new(config: &GeneratorConfig, credentials: Credentials) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            model: config.model.clone(),
            credentials,
        })
    }
}

#[async_trait]
impl CodeGenerator for AnthropicGenerator {
    #[instrument(skip_all, fields(kind = ?request.kind, max_tokens = request.max_tokens))]
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let body = MessageRequest {
            model: &self.model,
            max_tokens: request.max_tokens,
            messages: [Message {
                role: "user",
                content: &request.prompt,
            }],
        };
        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", self.credentials.api_key())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .context("send generation request")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(anyhow!("generation request failed with {status}: {detail}"));
        }
        let parsed: MessageResponse = response
            .json()
            .await
            .context("decode generation response")?;
        let text = join_text_blocks(parsed);
        debug!(chars = text.len(), "generation complete");
        Ok(text)
    }
}

fn join_text_blocks(response: MessageResponse) -> String {
    response
        .content
        .into_iter()
        .filter(|block| block.kind == "text")
        .map(|block| block.text)
        .collect::<Vec<_>>()
        .join("")
}

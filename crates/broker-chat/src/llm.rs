//! Language-model access.
//!
//! [`LanguageModel`] is the raw completion seam. [`LlmClient`] wraps it with
//! the call timeout and the helpers the conversation uses: plain text with a
//! fallback, strict JSON replies, and yes/no questions.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use broker_core::config::LlmConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ChatError;

/// Single-prompt text completion.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, ChatError>;
}

// =============================================================================
// LlmClient
// =============================================================================

/// Timeout-bounded access to a [`LanguageModel`].
#[derive(Clone)]
pub struct LlmClient {
    model: Arc<dyn LanguageModel>,
    timeout: Duration,
}

impl LlmClient {
    pub fn new(model: Arc<dyn LanguageModel>, timeout: Duration) -> Self {
        Self { model, timeout }
    }

    /// Complete a prompt. Expiry of the timeout is an error like any other.
    pub async fn ask(&self, prompt: &str) -> Result<String, ChatError> {
        match tokio::time::timeout(self.timeout, self.model.complete(prompt)).await {
            Ok(reply) => reply.map(|text| text.trim().to_string()),
            Err(_) => Err(ChatError::LlmTimeout(self.timeout.as_secs())),
        }
    }

    /// Complete a prompt, substituting `fallback` on any failure or empty reply.
    pub async fn ask_or(&self, prompt: &str, fallback: &str) -> String {
        match self.ask(prompt).await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => {
                warn!("LLM returned an empty reply, using fallback");
                fallback.to_string()
            }
            Err(e) => {
                warn!(error = %e, "LLM call failed, using fallback");
                fallback.to_string()
            }
        }
    }

    /// Complete a prompt whose reply must be a JSON object of type `T`.
    pub async fn ask_json<T: DeserializeOwned>(&self, prompt: &str) -> Result<T, ChatError> {
        let text = self.ask(prompt).await?;
        parse_json_reply(&text)
    }

    /// Ask a yes/no question. Anything but a leading "yes" counts as no.
    pub async fn ask_yes_no(&self, prompt: &str) -> bool {
        match self.ask(prompt).await {
            Ok(text) => text.trim().to_lowercase().starts_with("yes"),
            Err(e) => {
                warn!(error = %e, "Yes/no LLM call failed, assuming no");
                false
            }
        }
    }
}

/// Parse a model reply that should contain one JSON object.
///
/// Markdown fences and any prose around the outermost braces are ignored.
pub fn parse_json_reply<T: DeserializeOwned>(text: &str) -> Result<T, ChatError> {
    let start = text
        .find('{')
        .ok_or_else(|| ChatError::Parse("reply contains no JSON object".to_string()))?;
    let end = text
        .rfind('}')
        .filter(|end| *end > start)
        .ok_or_else(|| ChatError::Parse("reply contains no JSON object".to_string()))?;
    Ok(serde_json::from_str(&text[start..=end])?)
}

// =============================================================================
// OpenAI chat completions
// =============================================================================

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: [CompletionMessage<'a>; 1],
}

#[derive(Serialize)]
struct CompletionMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionContent,
}

#[derive(Deserialize)]
struct CompletionContent {
    #[serde(default)]
    content: Option<String>,
}

/// Model backed by the OpenAI `/chat/completions` endpoint.
pub struct OpenAiChatModel {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    temperature: f32,
}

impl std::fmt::Debug for OpenAiChatModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiChatModel")
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl OpenAiChatModel {
    pub fn new(api_key: impl Into<String>, config: &LlmConfig) -> Result<Self, ChatError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ChatError::Llm(format!(
                "{} is required for chat completions",
                config.api_key_env
            )));
        }

        info!(model = %config.model, "Chat model ready");

        Ok(Self {
            client: reqwest::Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiChatModel {
    async fn complete(&self, prompt: &str) -> Result<String, ChatError> {
        let url = format!("{}/chat/completions", self.api_base);
        let request = CompletionRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: [CompletionMessage {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| ChatError::Llm(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Llm(format!(
                "completions API returned {}: {}",
                status, body
            )));
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .map_err(|e| ChatError::Llm(format!("invalid response: {}", e)))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ChatError::Llm("response contained no choices".to_string()))?;

        debug!(chars = text.len(), "Completion received");
        Ok(text)
    }
}

// =============================================================================
// ScriptedModel
// =============================================================================

#[derive(Debug, Clone)]
enum ScriptedReply {
    Text(String),
    Fail,
}

/// Model that answers from a fixed script.
///
/// Rules are checked in insertion order; the first whose needle occurs in
/// the prompt supplies the reply. Unmatched prompts get the default reply,
/// or an error when there is none. Every prompt is recorded.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    rules: Vec<(String, ScriptedReply)>,
    default: Option<String>,
    latency: Option<Duration>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rule(mut self, needle: &str, reply: &str) -> Self {
        self.rules
            .push((needle.to_string(), ScriptedReply::Text(reply.to_string())));
        self
    }

    /// Prompts containing `needle` fail with an LLM error.
    pub fn with_failure(mut self, needle: &str) -> Self {
        self.rules.push((needle.to_string(), ScriptedReply::Fail));
        self
    }

    pub fn with_default(mut self, reply: &str) -> Self {
        self.default = Some(reply.to_string());
        self
    }

    /// Delay every reply.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// All prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    /// Number of prompts containing `needle`.
    pub fn count_containing(&self, needle: &str) -> usize {
        self.prompts().iter().filter(|p| p.contains(needle)).count()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, prompt: &str) -> Result<String, ChatError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let rule = self
            .rules
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()));
        match rule {
            Some((_, ScriptedReply::Text(reply))) => Ok(reply.clone()),
            Some((needle, ScriptedReply::Fail)) => {
                Err(ChatError::Llm(format!("scripted failure for '{}'", needle)))
            }
            None => self
                .default
                .clone()
                .ok_or_else(|| ChatError::Llm("no scripted reply".to_string())),
        }
    }
}

pub mod extraction;
pub mod groq;
pub mod ollama;
pub mod patient;

use anyhow::Context;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::services::gateway::GatewayError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat(&self, system_prompt: &str, messages: &[Message]) -> anyhow::Result<String>;
}

/// The system prompt followed by the conversation, in the chat shape both providers accept.
pub(crate) fn chat_messages(system_prompt: &str, messages: &[Message]) -> Vec<Value> {
    std::iter::once(json!({ "role": "system", "content": system_prompt }))
        .chain(
            messages
                .iter()
                .map(|m| json!({ "role": m.role, "content": m.content })),
        )
        .collect()
}

/// Sends a chat request and returns the reply text found at `content_pointer`.
pub(crate) async fn send_chat(
    provider: &str,
    request: reqwest::RequestBuilder,
    body: &Value,
    content_pointer: &str,
) -> anyhow::Result<String> {
    let resp = request
        .json(body)
        .send()
        .await
        .with_context(|| format!("failed to call {provider} API"))?;

    let status = resp.status();
    let data: Value = resp
        .json()
        .await
        .with_context(|| format!("failed to parse {provider} response"))?;

    if !status.is_success() {
        anyhow::bail!("{provider} API error ({status}): {data}");
    }
    reply_content(provider, &data, content_pointer)
}

fn reply_content(provider: &str, data: &Value, content_pointer: &str) -> anyhow::Result<String> {
    data.pointer(content_pointer)
        .and_then(Value::as_str)
        .map(str::to_string)
        .with_context(|| format!("missing content in {provider} response"))
}

/// Pulls a JSON object of type `T` out of a model reply. Accepts bare JSON, fenced JSON, or an
/// object embedded in surrounding prose.
pub fn parse_json_reply<T: DeserializeOwned>(response: &str) -> Result<T, GatewayError> {
    if let Ok(value) = serde_json::from_str::<T>(response) {
        return Ok(value);
    }

    let trimmed = response.trim();
    let cleaned = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let cleaned = cleaned.strip_suffix("```").unwrap_or(cleaned).trim();

    if let Ok(value) = serde_json::from_str::<T>(cleaned) {
        return Ok(value);
    }

    if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str::<T>(&cleaned[start..=end]) {
                return Ok(value);
            }
        }
    }

    let preview: String = response.chars().take(120).collect();
    Err(GatewayError::Malformed(format!(
        "expected a JSON object, got: {preview}"
    )))
}

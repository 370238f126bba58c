use async_trait::async_trait;
use serde_json::json;

use super::{chat_messages, send_chat, LlmProvider, Message};

/// A local Ollama server's `/api/chat`, non-streaming with JSON output.
pub struct OllamaProvider {
    url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(url: String, model: String) -> Self {
        Self {
            url,
            model,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn chat(&self, system_prompt: &str, messages: &[Message]) -> anyhow::Result<String> {
        let body = json!({
            "model": self.model,
            "messages": chat_messages(system_prompt, messages),
            "format": "json",
            "stream": false,
        });
        let endpoint = format!("{}/api/chat", self.url.trim_end_matches('/'));

        send_chat("Ollama", self.client.post(endpoint), &body, "/message/content").await
    }
}

use async_trait::async_trait;
use serde_json::json;

use super::{chat_messages, send_chat, LlmProvider, Message};

const COMPLETIONS_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

/// OpenAI-compatible chat completions on Groq, forced into JSON object mode.
pub struct GroqProvider {
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl GroqProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl LlmProvider for GroqProvider {
    async fn chat(&self, system_prompt: &str, messages: &[Message]) -> anyhow::Result<String> {
        let body = json!({
            "model": self.model,
            "messages": chat_messages(system_prompt, messages),
            "temperature": 0.2,
            "response_format": { "type": "json_object" },
        });
        let request = self.client.post(COMPLETIONS_URL).bearer_auth(&self.api_key);

        send_chat("Groq", request, &body, "/choices/0/message/content").await
    }
}

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

use crate::models::availability::seed_slots;
use crate::services::gateway::RetryPolicy;
use crate::services::workflow::{ReviewMode, WorkflowSettings};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    pub llm_provider: String,
    pub ollama_url: String,
    pub ollama_model: String,
    pub groq_api_key: String,
    pub groq_model: String,
    pub slots_path: Option<String>,
    pub review_mode: ReviewMode,
    pub max_negotiation_rounds: u32,
    pub extraction_max_attempts: u32,
    pub extraction_backoff_ms: u64,
    pub patient_response_timeout_secs: u64,
    pub review_timeout_minutes: u64,
    pub default_email_domain: String,
    pub clinic_name: String,
    pub clinic_email: String,
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parsed_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            port: parsed_or("PORT", 3000),
            llm_provider: var_or("LLM_PROVIDER", "ollama").to_lowercase(),
            ollama_url: var_or("OLLAMA_URL", "http://localhost:11434"),
            ollama_model: var_or("OLLAMA_MODEL", "llama3.1"),
            groq_api_key: env::var("GROQ_API_KEY").unwrap_or_default(),
            groq_model: var_or("GROQ_MODEL", "llama-3.1-8b-instant"),
            slots_path: env::var("SLOTS_PATH").ok().filter(|p| !p.trim().is_empty()),
            review_mode: ReviewMode::parse(&var_or("REVIEW_MODE", "interactive")),
            max_negotiation_rounds: parsed_or("MAX_NEGOTIATION_ROUNDS", 3),
            extraction_max_attempts: parsed_or("EXTRACTION_MAX_ATTEMPTS", 3),
            extraction_backoff_ms: parsed_or("EXTRACTION_BACKOFF_MS", 500),
            patient_response_timeout_secs: parsed_or("PATIENT_RESPONSE_TIMEOUT_SECS", 120),
            review_timeout_minutes: parsed_or("REVIEW_TIMEOUT_MINUTES", 1440),
            default_email_domain: var_or("DEFAULT_EMAIL_DOMAIN", "gmail.com"),
            clinic_name: var_or("CLINIC_NAME", "Dr. Smith's Office"),
            clinic_email: var_or("CLINIC_EMAIL", "doctor@gmail.com"),
        }
    }

    pub fn workflow_settings(&self) -> WorkflowSettings {
        WorkflowSettings {
            review_mode: self.review_mode,
            max_negotiation_rounds: self.max_negotiation_rounds,
            retry: RetryPolicy {
                max_attempts: self.extraction_max_attempts.max(1),
                base_delay: Duration::from_millis(self.extraction_backoff_ms),
            },
            patient_response_timeout: Duration::from_secs(self.patient_response_timeout_secs),
            clinic_name: self.clinic_name.clone(),
        }
    }

    pub fn review_timeout(&self) -> Duration {
        Duration::from_secs(self.review_timeout_minutes * 60)
    }

    /// Initial availability: the JSON array at `SLOTS_PATH`, or the built-in seed list.
    pub fn load_slots(&self) -> anyhow::Result<Vec<String>> {
        let Some(path) = &self.slots_path else {
            return Ok(seed_slots());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read slots file {path}"))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("slots file {path} is not a JSON array of strings"))
    }
}

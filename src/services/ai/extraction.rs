use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use serde::Deserialize;

use crate::models::{AlternativesContext, ConfirmationContext, ExtractedFields, ExtractionMode};
use crate::services::ai::{parse_json_reply, LlmProvider, Message};
use crate::services::gateway::{ExtractionGateway, GatewayError};

pub const DEFAULT_TIME: &str = "09:00 AM";
pub const DEFAULT_AGE: u32 = 25;
/// Stands in for the name when building a fallback address.
pub const DEFAULT_NAME: &str = "Patient";

const REQUEST_PROMPT: &str = r#"You are an email parser for a medical scheduling system.
Extract the following fields from the patient's email.

Return ONLY valid JSON (no markdown, no explanation) with this exact structure:
{
  "patient_name": "name or null",
  "patient_age": 42,
  "patient_email": "address or null",
  "requested_date": "YYYY-MM-DD or null",
  "requested_time": "HH:MM AM/PM or null"
}

Rules:
- requested_date: format as YYYY-MM-DD. Use null if not mentioned.
- requested_time: format as HH:MM AM/PM, e.g. "02:30 PM". Use null if not mentioned.
- patient_age: a positive integer, or null if not mentioned.
- patient_email: taken from the body or headers, or null if not present.
"#;

const RESPONSE_PROMPT: &str = r#"You are an email parser for a medical scheduling system.
The patient is replying to a list of proposed appointment slots. Extract the slot they chose.

Return ONLY valid JSON (no markdown, no explanation) with this exact structure:
{
  "requested_date": "YYYY-MM-DD or null",
  "requested_time": "HH:MM AM/PM or null"
}

Rules:
- requested_date: format as YYYY-MM-DD. Use null if not mentioned.
- requested_time: format as HH:MM AM/PM, e.g. "02:30 PM". Use null if not mentioned.
"#;

const ALTERNATIVES_PROMPT: &str = r#"You are a medical scheduling assistant.
The patient's requested slot was not available. Write a polite email proposing the alternative
slots you are given.

The email should:
- Apologize that the requested slot is unavailable
- Clearly list every proposed alternative slot, exactly as written
- Ask the patient to reply with their preferred slot
- Keep a professional and friendly tone

Return ONLY valid JSON: {"subject": "...", "body": "..."}
"#;

const CONFIRMATION_PROMPT: &str = r#"You are a medical scheduling assistant.
Write a professional appointment confirmation email from the clinic to the patient.

The email should:
- Confirm the appointment date and time clearly
- Ask the patient to arrive 10 minutes early
- Mention to bring any previous medical records
- Provide a cancellation/rescheduling note

Return ONLY valid JSON: {"subject": "...", "body": "..."}
"#;

#[derive(Debug, Deserialize)]
struct RawFields {
    #[serde(default)]
    patient_name: Option<String>,
    #[serde(default)]
    patient_age: Option<serde_json::Value>,
    #[serde(default)]
    patient_email: Option<String>,
    #[serde(default)]
    requested_date: Option<String>,
    #[serde(default)]
    requested_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ComposedEmail {
    #[allow(dead_code)]
    #[serde(default)]
    subject: Option<String>,
    body: String,
}

/// Extraction gateway backed by a chat model. Fills in defaults for anything the model could
/// not find.
pub struct LlmGateway {
    llm: Arc<dyn LlmProvider>,
    email_domain: String,
    clinic_name: String,
}

impl LlmGateway {
    pub fn new(llm: Arc<dyn LlmProvider>, email_domain: String, clinic_name: String) -> Self {
        Self {
            llm,
            email_domain,
            clinic_name,
        }
    }

    async fn compose(&self, system: &str, prompt: String) -> Result<String, GatewayError> {
        let response = self.llm.chat(system, &[Message::user(prompt)]).await?;
        let email: ComposedEmail = parse_json_reply(&response)?;
        if email.body.trim().is_empty() {
            return Err(GatewayError::Malformed("composed email has an empty body".into()));
        }
        Ok(email.body)
    }
}

#[async_trait]
impl ExtractionGateway for LlmGateway {
    async fn extract(
        &self,
        text: &str,
        mode: ExtractionMode,
    ) -> Result<ExtractedFields, GatewayError> {
        let system = match mode {
            ExtractionMode::Initial => REQUEST_PROMPT,
            ExtractionMode::Response => RESPONSE_PROMPT,
        };
        let prompt = format!("Email:\n---\n{text}\n---");
        let response = self.llm.chat(system, &[Message::user(prompt)]).await?;
        let raw: RawFields = parse_json_reply(&response)?;

        Ok(apply_defaults(
            raw,
            mode,
            Local::now().date_naive(),
            &self.email_domain,
        ))
    }

    async fn compose_alternatives(
        &self,
        ctx: &AlternativesContext,
    ) -> Result<String, GatewayError> {
        let slots = ctx
            .proposed_slots
            .iter()
            .map(|s| format!("  - {s}"))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Clinic: {}\n\nPatient Details:\n- Name          : {}\n- Email         : {}\n- Requested Date: {}\n- Requested Time: {}\n\nAlternative Slots Available:\n{slots}",
            self.clinic_name,
            ctx.patient.name,
            ctx.patient.email,
            ctx.requested_date,
            ctx.requested_time,
        );
        self.compose(ALTERNATIVES_PROMPT, prompt).await
    }

    async fn compose_confirmation(
        &self,
        ctx: &ConfirmationContext,
    ) -> Result<String, GatewayError> {
        let age = ctx
            .patient
            .age
            .map(|a| a.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let prompt = format!(
            "Clinic: {}\n\nPatient Details:\n- Name  : {}\n- Age   : {age}\n- Email : {}\n\nConfirmed Appointment Slot: {}",
            self.clinic_name, ctx.patient.name, ctx.patient.email, ctx.slot,
        );
        self.compose(CONFIRMATION_PROMPT, prompt).await
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("null"))
}

fn parse_age(value: Option<serde_json::Value>) -> Option<u32> {
    let age = match value? {
        serde_json::Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    age.filter(|age: &u32| *age > 0)
}

fn apply_defaults(
    raw: RawFields,
    mode: ExtractionMode,
    today: NaiveDate,
    email_domain: &str,
) -> ExtractedFields {
    let date = non_blank(raw.requested_date).unwrap_or_else(|| today.format("%Y-%m-%d").to_string());
    let time = non_blank(raw.requested_time).unwrap_or_else(|| DEFAULT_TIME.to_string());

    if mode == ExtractionMode::Response {
        return ExtractedFields {
            name: None,
            age: None,
            email: None,
            date,
            time,
        };
    }

    let name = non_blank(raw.patient_name);
    let email = non_blank(raw.patient_email).unwrap_or_else(|| {
        let local: String = name
            .as_deref()
            .unwrap_or(DEFAULT_NAME)
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        let local = if local.is_empty() {
            DEFAULT_NAME.to_lowercase()
        } else {
            local
        };
        format!("{local}@{email_domain}")
    });

    ExtractedFields {
        age: Some(parse_age(raw.patient_age).unwrap_or(DEFAULT_AGE)),
        name,
        email: Some(email),
        date,
        time,
    }
}

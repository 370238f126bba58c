use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Local};
use serde::Deserialize;

use crate::models::{PatientInfo, PatientReply};
use crate::services::ai::{parse_json_reply, LlmProvider, Message};
use crate::services::gateway::{GatewayError, PatientResponder};

const WRITE_REQUEST_PROMPT: &str = r#"You are Patient X. Write a professional appointment request email to a doctor.

Patient details:
- Name: pick one of PatientX, PatientY or PatientZ
- From: patient@gmail.com
- To: doctor@gmail.com
- Age: pick an age between 20 and 60

Return ONLY valid JSON: {"to": "...", "subject": "...", "body": "..."}
"#;

const RESPOND_PROMPT: &str = r#"You are Patient X. A doctor's office has proposed new appointment slots because your
original request did not match their availability.

Review the slots. If any work for you, accept the best one and write a short confirmation reply
naming that slot, for example: "I confirm the appointment for 2025-01-21 at 2:00 PM. Thank you!".
Strictly choose from the proposed slots in the email; never make up new slots.
If none work, decline politely.

Return ONLY valid JSON: {"accepted": true|false, "body": "..."}
"#;

#[derive(Debug, Deserialize)]
struct RequestEmail {
    #[serde(default)]
    subject: Option<String>,
    body: String,
}

/// Chat-model stand-in for a real patient, used to exercise the negotiation loop.
pub struct SimulatedPatient {
    llm: Arc<dyn LlmProvider>,
}

impl SimulatedPatient {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl PatientResponder for SimulatedPatient {
    async fn write_request(&self) -> Result<String, GatewayError> {
        let today = Local::now().date_naive();
        let tomorrow = today + Duration::days(1);
        let prompt = format!(
            "Request an appointment on either today ({}) or tomorrow ({}); give one particular date.\nPick one particular preferred time between 9:00 AM and 4:00 PM.",
            today.format("%Y-%m-%d"),
            tomorrow.format("%Y-%m-%d"),
        );

        let response = self
            .llm
            .chat(WRITE_REQUEST_PROMPT, &[Message::user(prompt)])
            .await?;
        let email: RequestEmail = parse_json_reply(&response)?;

        Ok(match email.subject.filter(|s| !s.trim().is_empty()) {
            Some(subject) => format!("Subject: {subject}\n\n{}", email.body),
            None => email.body,
        })
    }

    async fn respond_to_slots(
        &self,
        patient: &PatientInfo,
        draft: &str,
    ) -> Result<PatientReply, GatewayError> {
        let age = patient
            .age
            .map(|a| a.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let prompt = format!(
            "Patient details:\n- Name: {}\n- Age: {age}\n\nEmail from the clinic:\n---\n{draft}\n---",
            patient.name,
        );

        let response = self.llm.chat(RESPOND_PROMPT, &[Message::user(prompt)]).await?;
        parse_json_reply(&response)
    }
}

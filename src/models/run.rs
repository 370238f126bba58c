use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::availability::AvailabilityPool;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Started,
    EmailParsed,
    ResponseEmailParsed,
    SlotFound,
    SlotNotFound,
    DraftReady,
    WaitingPatientResponse,
    PatientAccepted,
    PatientDeclined,
    ConfirmationSent,
    DraftRejected,
    ExtractionFailed,
    DeliveryFailed,
    NegotiationExhausted,
    ReviewExpired,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Started => "started",
            RunStatus::EmailParsed => "email_parsed",
            RunStatus::ResponseEmailParsed => "response_email_parsed",
            RunStatus::SlotFound => "slot_found",
            RunStatus::SlotNotFound => "slot_not_found",
            RunStatus::DraftReady => "draft_ready",
            RunStatus::WaitingPatientResponse => "waiting_patient_response",
            RunStatus::PatientAccepted => "patient_accepted",
            RunStatus::PatientDeclined => "patient_declined",
            RunStatus::ConfirmationSent => "confirmation_sent",
            RunStatus::DraftRejected => "draft_rejected",
            RunStatus::ExtractionFailed => "extraction_failed",
            RunStatus::DeliveryFailed => "delivery_failed",
            RunStatus::NegotiationExhausted => "negotiation_exhausted",
            RunStatus::ReviewExpired => "review_expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::ConfirmationSent
                | RunStatus::PatientDeclined
                | RunStatus::DraftRejected
                | RunStatus::ExtractionFailed
                | RunStatus::DeliveryFailed
                | RunStatus::NegotiationExhausted
                | RunStatus::ReviewExpired
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the current draft stands with the human reviewer.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReviewState {
    #[default]
    NotRequested,
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

/// Everything one scheduling run knows, from the raw request to the final email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: Uuid,
    pub raw_email: String,
    pub patient_name: Option<String>,
    pub patient_age: Option<u32>,
    pub patient_email: Option<String>,
    pub requested_date: Option<String>,
    pub requested_time: Option<String>,
    pub available_slots: AvailabilityPool,
    pub selected_slot: Option<String>,
    pub proposed_slots: Vec<String>,
    pub draft_email: Option<String>,
    pub confirmation_email: Option<String>,
    pub patient_response: Option<String>,
    pub review: ReviewState,
    pub human_feedback: Option<String>,
    pub status: RunStatus,
    pub iteration: u32,
    pub logs: Vec<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl RunRecord {
    pub fn new(raw_email: impl Into<String>, available_slots: AvailabilityPool) -> Self {
        let now = Utc::now().naive_utc();
        Self {
            id: Uuid::new_v4(),
            raw_email: raw_email.into(),
            patient_name: None,
            patient_age: None,
            patient_email: None,
            requested_date: None,
            requested_time: None,
            available_slots,
            selected_slot: None,
            proposed_slots: Vec::new(),
            draft_email: None,
            confirmation_email: None,
            patient_response: None,
            review: ReviewState::NotRequested,
            human_feedback: None,
            status: RunStatus::Started,
            iteration: 0,
            logs: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn awaiting_review(&self) -> bool {
        self.status == RunStatus::DraftReady && self.review == ReviewState::Pending
    }

    /// Consumes the record and returns a new one with `delta` folded in. Unset delta fields
    /// leave the record untouched; log lines are appended.
    pub fn apply(self, delta: RunDelta) -> RunRecord {
        let RunDelta {
            status,
            patient_name,
            patient_age,
            patient_email,
            requested_date,
            requested_time,
            available_slots,
            selected_slot,
            proposed_slots,
            draft_email,
            confirmation_email,
            patient_response,
            review,
            human_feedback,
            iteration,
            logs,
        } = delta;

        let mut all_logs = self.logs;
        all_logs.extend(logs);

        RunRecord {
            patient_name: patient_name.or(self.patient_name),
            patient_age: patient_age.or(self.patient_age),
            patient_email: patient_email.or(self.patient_email),
            requested_date: requested_date.or(self.requested_date),
            requested_time: requested_time.or(self.requested_time),
            available_slots: available_slots.unwrap_or(self.available_slots),
            selected_slot: selected_slot.or(self.selected_slot),
            proposed_slots: proposed_slots.unwrap_or(self.proposed_slots),
            draft_email: draft_email.or(self.draft_email),
            confirmation_email: confirmation_email.or(self.confirmation_email),
            patient_response: patient_response.or(self.patient_response),
            review: review.unwrap_or(self.review),
            human_feedback: human_feedback.or(self.human_feedback),
            status: status.unwrap_or(self.status),
            iteration: iteration.unwrap_or(self.iteration),
            logs: all_logs,
            updated_at: Utc::now().naive_utc(),
            id: self.id,
            raw_email: self.raw_email,
            created_at: self.created_at,
        }
    }
}

/// The change a single workflow step wants to make to a run.
#[derive(Debug, Clone, Default)]
pub struct RunDelta {
    pub status: Option<RunStatus>,
    pub patient_name: Option<String>,
    pub patient_age: Option<u32>,
    pub patient_email: Option<String>,
    pub requested_date: Option<String>,
    pub requested_time: Option<String>,
    pub available_slots: Option<AvailabilityPool>,
    pub selected_slot: Option<String>,
    pub proposed_slots: Option<Vec<String>>,
    pub draft_email: Option<String>,
    pub confirmation_email: Option<String>,
    pub patient_response: Option<String>,
    pub review: Option<ReviewState>,
    pub human_feedback: Option<String>,
    pub iteration: Option<u32>,
    pub logs: Vec<String>,
}

impl RunDelta {
    pub fn status(status: RunStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    pub fn log(mut self, entry: impl Into<String>) -> Self {
        self.logs.push(entry.into());
        self
    }
}

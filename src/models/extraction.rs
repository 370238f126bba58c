use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    /// First contact: identity and requested date/time.
    Initial,
    /// A patient's reply to proposed slots: date/time only.
    Response,
}

/// Structured fields pulled out of free text. `date` and `time` are always filled; the gateway
/// applies its defaults when the text does not mention them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractedFields {
    pub name: Option<String>,
    pub age: Option<u32>,
    pub email: Option<String>,
    pub date: String,
    pub time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PatientInfo {
    pub name: String,
    pub age: Option<u32>,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PatientReply {
    pub accepted: bool,
    pub body: String,
}

/// Input for composing the "your slot is taken, here are others" email.
#[derive(Debug, Clone)]
pub struct AlternativesContext {
    pub patient: PatientInfo,
    pub requested_date: String,
    pub requested_time: String,
    pub proposed_slots: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ConfirmationContext {
    pub patient: PatientInfo,
    pub slot: String,
}

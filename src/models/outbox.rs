use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmailKind {
    ProposedSlots,
    Confirmation,
}

impl EmailKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailKind::ProposedSlots => "proposed_slots",
            EmailKind::Confirmation => "confirmation",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutgoingEmail {
    pub run_id: Uuid,
    pub kind: EmailKind,
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: i64,
    pub run_id: Uuid,
    pub kind: EmailKind,
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub created_at: String,
}

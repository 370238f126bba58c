pub mod availability;
pub mod extraction;
pub mod outbox;
pub mod run;

pub use availability::{AvailabilityPool, SlotWindow};
pub use extraction::{
    AlternativesContext, ConfirmationContext, ExtractedFields, ExtractionMode, PatientInfo,
    PatientReply,
};
pub use outbox::{EmailKind, OutboxEntry, OutgoingEmail};
pub use run::{ReviewDecision, ReviewState, RunDelta, RunRecord, RunStatus};

use crate::models::{ReviewState, RunRecord, RunStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    ParseRequest,
    ParseResponse,
    CheckAvailability,
    DraftNewSlotsEmail,
    HumanReview,
    DiscardDraft,
    SendProposedSlotsEmail,
    ReceivePatientResponse,
    CloseNegotiation,
    BookAppointment,
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::ParseRequest => "parse_request",
            Step::ParseResponse => "parse_response",
            Step::CheckAvailability => "check_availability",
            Step::DraftNewSlotsEmail => "draft_new_slots_email",
            Step::HumanReview => "human_review",
            Step::DiscardDraft => "discard_draft",
            Step::SendProposedSlotsEmail => "send_proposed_slots_email",
            Step::ReceivePatientResponse => "receive_patient_response",
            Step::CloseNegotiation => "close_negotiation",
            Step::BookAppointment => "book_appointment",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    Run(Step),
    /// Waiting on a human decision.
    Suspend,
    Finished,
}

/// Picks what happens after the current status. Pure: it only reads the record.
pub fn next(run: &RunRecord, max_rounds: u32) -> Next {
    match run.status {
        RunStatus::Started => Next::Run(Step::ParseRequest),
        RunStatus::EmailParsed | RunStatus::ResponseEmailParsed => {
            Next::Run(Step::CheckAvailability)
        }
        RunStatus::SlotFound | RunStatus::SlotNotFound => {
            Next::Run(route_after_availability(run))
        }
        RunStatus::DraftReady => match run.review {
            ReviewState::NotRequested => Next::Run(Step::HumanReview),
            ReviewState::Pending => Next::Suspend,
            ReviewState::Approved => Next::Run(Step::SendProposedSlotsEmail),
            ReviewState::Rejected => Next::Run(Step::DiscardDraft),
        },
        RunStatus::WaitingPatientResponse => Next::Run(Step::ReceivePatientResponse),
        RunStatus::PatientAccepted | RunStatus::PatientDeclined => {
            route_after_patient_response(run, max_rounds)
        }
        RunStatus::ConfirmationSent
        | RunStatus::DraftRejected
        | RunStatus::ExtractionFailed
        | RunStatus::DeliveryFailed
        | RunStatus::NegotiationExhausted
        | RunStatus::ReviewExpired => Next::Finished,
    }
}

pub fn route_after_availability(run: &RunRecord) -> Step {
    if run.status == RunStatus::SlotFound {
        Step::BookAppointment
    } else {
        Step::DraftNewSlotsEmail
    }
}

/// The only edge that loops back. `max_rounds` caps how many patient replies get re-parsed.
pub fn route_after_patient_response(run: &RunRecord, max_rounds: u32) -> Next {
    match run.status {
        RunStatus::PatientAccepted if run.iteration >= max_rounds => {
            Next::Run(Step::CloseNegotiation)
        }
        RunStatus::PatientAccepted => Next::Run(Step::ParseResponse),
        _ => Next::Finished,
    }
}

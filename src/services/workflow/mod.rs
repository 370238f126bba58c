//! The scheduling state machine.
//!
//! A run moves through named steps, each of which reads the current [`RunRecord`] and returns a
//! [`RunDelta`] that is folded into a fresh record. [`routing::next`] decides which step comes
//! after each status. The run stops when it reaches a terminal status or when a draft is waiting
//! on a human reviewer; [`Workflow::resume`] picks it up again from there.

pub mod routing;
mod steps;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::models::{ReviewDecision, ReviewState, RunDelta, RunRecord, RunStatus};
use crate::services::gateway::{ExtractionGateway, PatientResponder, RetryPolicy};
use crate::services::messaging::Mailer;
use crate::services::scheduling::SlotInventory;

pub use routing::{Next, Step};
pub use steps::{apology_email, CONFIRMATION_SUBJECT, PROPOSAL_SUBJECT};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewMode {
    /// Suspend at the review gate until `resume` is called.
    Interactive,
    /// Treat every draft as approved.
    AutoApprove,
}

impl ReviewMode {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "auto" | "auto_approve" | "auto-approve" => ReviewMode::AutoApprove,
            _ => ReviewMode::Interactive,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub review_mode: ReviewMode,
    pub max_negotiation_rounds: u32,
    pub retry: RetryPolicy,
    pub patient_response_timeout: Duration,
    pub clinic_name: String,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            review_mode: ReviewMode::Interactive,
            max_negotiation_rounds: 3,
            retry: RetryPolicy::default(),
            patient_response_timeout: Duration::from_secs(120),
            clinic_name: "Dr. Smith's Office".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("run {run_id} is not waiting for review (status: {status})")]
    NotAwaitingReview { run_id: Uuid, status: RunStatus },
}

pub struct Workflow {
    gateway: Arc<dyn ExtractionGateway>,
    patient: Arc<dyn PatientResponder>,
    mailer: Arc<dyn Mailer>,
    settings: WorkflowSettings,
}

impl Workflow {
    pub fn new(
        gateway: Arc<dyn ExtractionGateway>,
        patient: Arc<dyn PatientResponder>,
        mailer: Arc<dyn Mailer>,
        settings: WorkflowSettings,
    ) -> Self {
        Self {
            gateway,
            patient,
            mailer,
            settings,
        }
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    /// Runs a request against a private copy of `available_slots`. The returned record's
    /// `available_slots` holds whatever was left.
    pub async fn run(&self, raw_email: &str, available_slots: Vec<String>) -> RunRecord {
        let inventory = SlotInventory::from(available_slots);
        self.start(raw_email, &inventory).await
    }

    /// Runs a request against a shared inventory.
    pub async fn start(&self, raw_email: &str, inventory: &SlotInventory) -> RunRecord {
        let run = RunRecord::new(raw_email, inventory.snapshot());
        tracing::info!(run_id = %run.id, "run started");
        self.advance(run, inventory).await
    }

    /// Records the reviewer's decision on a suspended run and continues it.
    pub async fn resume(
        &self,
        run: RunRecord,
        decision: ReviewDecision,
        feedback: Option<String>,
        inventory: &SlotInventory,
    ) -> Result<RunRecord, WorkflowError> {
        if !run.awaiting_review() {
            return Err(WorkflowError::NotAwaitingReview {
                run_id: run.id,
                status: run.status,
            });
        }

        let (review, entry) = match decision {
            ReviewDecision::Approve => (ReviewState::Approved, "[human_review] Draft approved"),
            ReviewDecision::Reject => (ReviewState::Rejected, "[human_review] Draft rejected"),
        };
        tracing::info!(run_id = %run.id, ?decision, "review decision recorded");

        let run = run.apply(
            RunDelta {
                review: Some(review),
                human_feedback: feedback,
                ..Default::default()
            }
            .log(entry),
        );
        Ok(self.advance(run, inventory).await)
    }

    /// Closes a run whose draft has waited on a reviewer for too long.
    pub fn expire(&self, run: RunRecord, waited: Duration) -> Result<RunRecord, WorkflowError> {
        if !run.awaiting_review() {
            return Err(WorkflowError::NotAwaitingReview {
                run_id: run.id,
                status: run.status,
            });
        }
        tracing::warn!(run_id = %run.id, "review timed out");
        Ok(run.apply(self.expire_review(waited)))
    }

    /// Executes steps until the run finishes or needs a human.
    pub async fn advance(&self, mut run: RunRecord, inventory: &SlotInventory) -> RunRecord {
        loop {
            let step = match routing::next(&run, self.settings.max_negotiation_rounds) {
                Next::Run(step) => step,
                Next::Suspend => {
                    tracing::info!(run_id = %run.id, "run suspended awaiting review");
                    return run;
                }
                Next::Finished => {
                    tracing::info!(run_id = %run.id, status = run.status.as_str(), "run finished");
                    return run;
                }
            };

            let delta = self.execute(step, &run, inventory).await;
            let from = run.status;
            run = run.apply(delta);
            tracing::debug!(
                run_id = %run.id,
                step = step.name(),
                from = from.as_str(),
                to = run.status.as_str(),
                "step complete"
            );
        }
    }

    async fn execute(&self, step: Step, run: &RunRecord, inventory: &SlotInventory) -> RunDelta {
        match step {
            Step::ParseRequest => self.parse_request(run).await,
            Step::ParseResponse => self.parse_response(run).await,
            Step::CheckAvailability => self.check_availability(run, inventory),
            Step::DraftNewSlotsEmail => self.draft_new_slots_email(run).await,
            Step::HumanReview => self.human_review(),
            Step::DiscardDraft => self.discard_draft(),
            Step::SendProposedSlotsEmail => self.send_proposed_slots_email(run).await,
            Step::ReceivePatientResponse => self.receive_patient_response(run).await,
            Step::CloseNegotiation => self.close_negotiation(run),
            Step::BookAppointment => self.book_appointment(run, inventory).await,
        }
    }
}

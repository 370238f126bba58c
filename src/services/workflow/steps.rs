use std::time::Duration;

use crate::models::{
    AlternativesContext, ConfirmationContext, EmailKind, ExtractionMode, OutgoingEmail,
    PatientInfo, ReviewState, RunDelta, RunRecord, RunStatus, SlotWindow,
};
use crate::services::gateway::with_retry;
use crate::services::scheduling::{MatchOutcome, SlotInventory};

use super::{ReviewMode, Workflow};

pub const PROPOSAL_SUBJECT: &str = "Re: Appointment Request - Alternative Slots";
pub const CONFIRMATION_SUBJECT: &str = "Appointment Confirmed";

fn patient_info(run: &RunRecord) -> PatientInfo {
    PatientInfo {
        name: run
            .patient_name
            .clone()
            .unwrap_or_else(|| "Patient".to_string()),
        age: run.patient_age,
        email: run.patient_email.clone().unwrap_or_default(),
    }
}

fn extraction_failed(step: &str, err: impl std::fmt::Display) -> RunDelta {
    RunDelta::status(RunStatus::ExtractionFailed).log(format!("[{step}] Gateway failed: {err}"))
}

/// Body used when there is nothing left to offer.
pub fn apology_email(name: &str, date: &str, time: &str, clinic: &str) -> String {
    format!(
        "Dear {name},\n\n\
         We're sorry, but your requested slot ({date} at {time}) is unavailable, and we have no \
         other openings to offer at the moment.\n\n\
         We will reach out as soon as new appointments become available.\n\n\
         Regards,\n{clinic}"
    )
}

impl Workflow {
    pub(super) async fn parse_request(&self, run: &RunRecord) -> RunDelta {
        let result = with_retry(&self.settings.retry, "parse_request", || {
            self.gateway.extract(&run.raw_email, ExtractionMode::Initial)
        })
        .await;

        match result {
            Ok(fields) => {
                let who = fields.name.clone().unwrap_or_else(|| "unknown patient".to_string());
                RunDelta {
                    patient_name: fields.name,
                    patient_age: fields.age,
                    patient_email: fields.email,
                    requested_date: Some(fields.date),
                    requested_time: Some(fields.time),
                    ..RunDelta::status(RunStatus::EmailParsed)
                }
                .log(format!("[parse_request] Parsed email for {who}"))
            }
            Err(e) => extraction_failed("parse_request", e),
        }
    }

    pub(super) async fn parse_response(&self, run: &RunRecord) -> RunDelta {
        let reply = run.patient_response.clone().unwrap_or_default();
        let result = with_retry(&self.settings.retry, "parse_response", || {
            self.gateway.extract(&reply, ExtractionMode::Response)
        })
        .await;

        match result {
            Ok(fields) => {
                let entry = format!(
                    "[parse_response] Patient asked for {} at {}",
                    fields.date, fields.time
                );
                RunDelta {
                    requested_date: Some(fields.date),
                    requested_time: Some(fields.time),
                    iteration: Some(run.iteration + 1),
                    ..RunDelta::status(RunStatus::ResponseEmailParsed)
                }
                .log(entry)
            }
            Err(e) => extraction_failed("parse_response", e),
        }
    }

    pub(super) fn check_availability(&self, run: &RunRecord, inventory: &SlotInventory) -> RunDelta {
        let (Some(date), Some(time)) = (run.requested_date.as_deref(), run.requested_time.as_deref())
        else {
            return RunDelta {
                proposed_slots: Some(Vec::new()),
                ..RunDelta::status(RunStatus::SlotNotFound)
            }
            .log("[check_availability] No requested date/time to match");
        };

        let (outcome, remaining) = inventory.claim(date, time);
        match outcome {
            MatchOutcome::Matched(window) => {
                let entry = format!("[check_availability] matched={}", window.label);
                RunDelta {
                    selected_slot: Some(window.label),
                    proposed_slots: Some(Vec::new()),
                    available_slots: Some(remaining),
                    ..RunDelta::status(RunStatus::SlotFound)
                }
                .log(entry)
            }
            MatchOutcome::Unmatched { proposed } => {
                let proposed: Vec<String> = proposed.into_iter().map(|w| w.label).collect();
                let entry = format!(
                    "[check_availability] matched=None, proposing {} slot(s)",
                    proposed.len()
                );
                RunDelta {
                    proposed_slots: Some(proposed),
                    available_slots: Some(remaining),
                    ..RunDelta::status(RunStatus::SlotNotFound)
                }
                .log(entry)
            }
            MatchOutcome::InvalidRequest { reason } => RunDelta {
                proposed_slots: Some(Vec::new()),
                ..RunDelta::status(RunStatus::SlotNotFound)
            }
            .log(format!("[check_availability] {reason}")),
        }
    }

    pub(super) async fn draft_new_slots_email(&self, run: &RunRecord) -> RunDelta {
        let patient = patient_info(run);
        let date = run.requested_date.clone().unwrap_or_default();
        let time = run.requested_time.clone().unwrap_or_default();

        let body = if run.proposed_slots.is_empty() {
            apology_email(&patient.name, &date, &time, &self.settings.clinic_name)
        } else {
            let ctx = AlternativesContext {
                patient: patient.clone(),
                requested_date: date,
                requested_time: time,
                proposed_slots: run.proposed_slots.clone(),
            };
            let result = with_retry(&self.settings.retry, "draft_new_slots_email", || {
                self.gateway.compose_alternatives(&ctx)
            })
            .await;
            match result {
                Ok(body) => body,
                Err(e) => return extraction_failed("draft_new_slots_email", e),
            }
        };

        RunDelta {
            draft_email: Some(body),
            review: Some(ReviewState::NotRequested),
            ..RunDelta::status(RunStatus::DraftReady)
        }
        .log(format!(
            "[draft_new_slots_email] Draft created for {} with {} proposed slots",
            patient.name,
            run.proposed_slots.len()
        ))
    }

    pub(super) fn human_review(&self) -> RunDelta {
        match self.settings.review_mode {
            ReviewMode::Interactive => RunDelta {
                review: Some(ReviewState::Pending),
                ..RunDelta::status(RunStatus::DraftReady)
            }
            .log("[human_review] Draft handed to reviewer for approval"),
            ReviewMode::AutoApprove => RunDelta {
                review: Some(ReviewState::Approved),
                ..RunDelta::status(RunStatus::DraftReady)
            }
            .log("[human_review] Auto-approved"),
        }
    }

    pub(super) fn discard_draft(&self) -> RunDelta {
        RunDelta::status(RunStatus::DraftRejected).log("[human_review] Draft rejected, nothing sent")
    }

    pub(super) async fn send_proposed_slots_email(&self, run: &RunRecord) -> RunDelta {
        let email = OutgoingEmail {
            run_id: run.id,
            kind: EmailKind::ProposedSlots,
            to: patient_info(run).email,
            subject: PROPOSAL_SUBJECT.to_string(),
            body: run.draft_email.clone().unwrap_or_default(),
        };

        match self.mailer.deliver(&email).await {
            Ok(()) => RunDelta::status(RunStatus::WaitingPatientResponse).log(format!(
                "[send_proposed_slots_email] Email sent to {}. Waiting for patient response",
                email.to
            )),
            Err(e) => RunDelta::status(RunStatus::DeliveryFailed)
                .log(format!("[send_proposed_slots_email] Delivery failed: {e:#}")),
        }
    }

    pub(super) async fn receive_patient_response(&self, run: &RunRecord) -> RunDelta {
        let patient = patient_info(run);
        let draft = run.draft_email.clone().unwrap_or_default();
        let timeout = self.settings.patient_response_timeout;

        let result = tokio::time::timeout(
            timeout,
            with_retry(&self.settings.retry, "receive_patient_response", || {
                self.patient.respond_to_slots(&patient, &draft)
            }),
        )
        .await;

        match result {
            Ok(Ok(reply)) => {
                let status = if reply.accepted {
                    RunStatus::PatientAccepted
                } else {
                    RunStatus::PatientDeclined
                };
                let verdict = if reply.accepted {
                    "Patient accepted a proposed slot"
                } else {
                    "Patient declined the proposed slots"
                };
                let received = format!("[receive_patient_response] Received: {}", reply.body);
                RunDelta {
                    patient_response: Some(reply.body),
                    ..RunDelta::status(status)
                }
                .log(received)
                .log(format!("[receive_patient_response] {verdict}"))
            }
            Ok(Err(e)) => RunDelta::status(RunStatus::PatientDeclined).log(format!(
                "[receive_patient_response] No usable reply ({e}), treating as declined"
            )),
            Err(_) => RunDelta::status(RunStatus::PatientDeclined).log(format!(
                "[receive_patient_response] No reply within {}, treating as declined",
                human_duration(timeout)
            )),
        }
    }

    pub(super) fn close_negotiation(&self, run: &RunRecord) -> RunDelta {
        RunDelta::status(RunStatus::NegotiationExhausted).log(format!(
            "[close_negotiation] Stopped after {} negotiation round(s)",
            run.iteration
        ))
    }

    pub(super) async fn book_appointment(
        &self,
        run: &RunRecord,
        inventory: &SlotInventory,
    ) -> RunDelta {
        let patient = patient_info(run);
        let slot = run.selected_slot.clone().unwrap_or_default();
        let ctx = ConfirmationContext {
            patient: patient.clone(),
            slot: slot.clone(),
        };

        // Nothing was booked, so the claimed window goes back to the pool
        let release = |delta: RunDelta| match SlotWindow::parse(&slot) {
            Some(window) => RunDelta {
                available_slots: Some(inventory.restore(&window)),
                ..delta
            }
            .log(format!("[book_appointment] Released {slot} back to the inventory")),
            None => delta,
        };

        let body = match with_retry(&self.settings.retry, "book_appointment", || {
            self.gateway.compose_confirmation(&ctx)
        })
        .await
        {
            Ok(body) => body,
            Err(e) => return release(extraction_failed("book_appointment", e)),
        };

        let email = OutgoingEmail {
            run_id: run.id,
            kind: EmailKind::Confirmation,
            to: patient.email.clone(),
            subject: CONFIRMATION_SUBJECT.to_string(),
            body: body.clone(),
        };
        let generated = format!(
            "[book_appointment] Confirmation email generated for {} at {slot}",
            patient.name
        );

        match self.mailer.deliver(&email).await {
            Ok(()) => RunDelta {
                confirmation_email: Some(body),
                ..RunDelta::status(RunStatus::ConfirmationSent)
            }
            .log(generated),
            Err(e) => release(
                RunDelta {
                    confirmation_email: Some(body),
                    ..RunDelta::status(RunStatus::DeliveryFailed)
                }
                .log(generated)
                .log(format!("[book_appointment] Delivery failed: {e:#}")),
            ),
        }
    }

    pub(super) fn expire_review(&self, timeout: Duration) -> RunDelta {
        RunDelta::status(RunStatus::ReviewExpired).log(format!(
            "[human_review] No decision within {}, run expired",
            human_duration(timeout)
        ))
    }
}

fn human_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs == 0 {
        format!("{}ms", d.as_millis())
    } else if secs >= 3600 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs >= 60 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::*;
use crate::models::{
    AlternativesContext, ConfirmationContext, EmailKind, ExtractedFields, ExtractionMode,
    OutgoingEmail, PatientInfo, PatientReply,
};
use crate::services::gateway::GatewayError;
use crate::services::messaging::outbox::Outbox;
use crate::services::messaging::Mailer;

const MORNING: [&str; 2] = [
    "2026-02-21 from 9:00AM to 10:00AM",
    "2026-02-21 from 10:00AM to 11:00AM",
];

fn slots(labels: &[&str]) -> Vec<String> {
    labels.iter().map(|s| s.to_string()).collect()
}

fn fields(date: &str, time: &str) -> ExtractedFields {
    ExtractedFields {
        name: Some("PatientX".into()),
        age: Some(34),
        email: Some("patientx@gmail.com".into()),
        date: date.into(),
        time: time.into(),
    }
}

struct FakeGateway {
    initial: ExtractedFields,
    replies: Mutex<VecDeque<ExtractedFields>>,
    failures_left: AtomicU32,
    extract_calls: AtomicU32,
    confirmation_fails: bool,
}

impl FakeGateway {
    fn new(initial: ExtractedFields) -> Self {
        Self {
            initial,
            replies: Mutex::new(VecDeque::new()),
            failures_left: AtomicU32::new(0),
            extract_calls: AtomicU32::new(0),
            confirmation_fails: false,
        }
    }

    fn without_confirmations(mut self) -> Self {
        self.confirmation_fails = true;
        self
    }

    fn with_replies(self, replies: Vec<ExtractedFields>) -> Self {
        *self.replies.lock().unwrap() = replies.into();
        self
    }

    fn failing(self, times: u32) -> Self {
        self.failures_left.store(times, Ordering::SeqCst);
        self
    }
}

#[async_trait]
impl ExtractionGateway for FakeGateway {
    async fn extract(
        &self,
        _text: &str,
        mode: ExtractionMode,
    ) -> Result<ExtractedFields, GatewayError> {
        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(GatewayError::Unavailable("connection refused".into()));
        }
        match mode {
            ExtractionMode::Initial => Ok(self.initial.clone()),
            ExtractionMode::Response => {
                let mut reply = self
                    .replies
                    .lock()
                    .unwrap()
                    .pop_front()
                    .ok_or_else(|| GatewayError::Malformed("no scripted reply".into()))?;
                reply.name = None;
                reply.age = None;
                reply.email = None;
                Ok(reply)
            }
        }
    }

    async fn compose_alternatives(
        &self,
        ctx: &AlternativesContext,
    ) -> Result<String, GatewayError> {
        Ok(format!(
            "Dear {}, please choose: {}",
            ctx.patient.name,
            ctx.proposed_slots.join("; ")
        ))
    }

    async fn compose_confirmation(
        &self,
        ctx: &ConfirmationContext,
    ) -> Result<String, GatewayError> {
        if self.confirmation_fails {
            return Err(GatewayError::Malformed("missing body".into()));
        }
        Ok(format!("Dear {}, you are booked for {}", ctx.patient.name, ctx.slot))
    }
}

struct FakePatient {
    replies: Mutex<VecDeque<PatientReply>>,
    delay: Option<Duration>,
}

impl FakePatient {
    fn replying(replies: Vec<PatientReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            delay: None,
        }
    }

    fn silent(delay: Duration) -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            delay: Some(delay),
        }
    }
}

#[async_trait]
impl PatientResponder for FakePatient {
    async fn write_request(&self) -> Result<String, GatewayError> {
        Ok("Hello, I'd like an appointment".into())
    }

    async fn respond_to_slots(
        &self,
        _patient: &PatientInfo,
        _draft: &str,
    ) -> Result<PatientReply, GatewayError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.replies.lock().unwrap().pop_front().unwrap_or(PatientReply {
            accepted: false,
            body: "None of these work for me.".into(),
        }))
    }
}

/// Refuses one kind of email and hands the rest to an outbox.
struct RefusingMailer {
    refuse: EmailKind,
    outbox: Outbox,
}

impl RefusingMailer {
    fn new(refuse: EmailKind) -> Self {
        Self {
            refuse,
            outbox: Outbox::new("doctor@gmail.com".into()),
        }
    }
}

#[async_trait]
impl Mailer for RefusingMailer {
    async fn deliver(&self, email: &OutgoingEmail) -> anyhow::Result<()> {
        if email.kind == self.refuse {
            anyhow::bail!("mail relay rejected {}", email.to);
        }
        self.outbox.deliver(email).await
    }
}

fn accept(body: &str) -> PatientReply {
    PatientReply {
        accepted: true,
        body: body.into(),
    }
}

fn settings(review_mode: ReviewMode) -> WorkflowSettings {
    WorkflowSettings {
        review_mode,
        max_negotiation_rounds: 3,
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::ZERO,
        },
        patient_response_timeout: Duration::from_secs(5),
        clinic_name: "Test Clinic".into(),
    }
}

fn build(
    gateway: FakeGateway,
    patient: FakePatient,
    settings: WorkflowSettings,
) -> (Workflow, Arc<Outbox>) {
    let outbox = Arc::new(Outbox::new("doctor@gmail.com".into()));
    let workflow = Workflow::new(Arc::new(gateway), Arc::new(patient), outbox.clone(), settings);
    (workflow, outbox)
}

#[tokio::test]
async fn test_direct_match_books_and_confirms() {
    let (wf, outbox) = build(
        FakeGateway::new(fields("2026-02-21", "9:30 AM")),
        FakePatient::replying(vec![]),
        settings(ReviewMode::Interactive),
    );

    let run = wf.run("I need a 9:30 appointment", slots(&MORNING)).await;

    assert_eq!(run.status, RunStatus::ConfirmationSent);
    assert_eq!(run.selected_slot.as_deref(), Some(MORNING[0]));
    assert_eq!(run.available_slots.labels(), [MORNING[1].to_string()]);
    assert!(run.proposed_slots.is_empty());
    assert_eq!(
        run.confirmation_email.as_deref(),
        Some("Dear PatientX, you are booked for 2026-02-21 from 9:00AM to 10:00AM")
    );

    let sent = outbox.entries();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, EmailKind::Confirmation);
    assert_eq!(sent[0].to, "patientx@gmail.com");
}

#[tokio::test]
async fn test_window_start_is_inclusive() {
    let (wf, _) = build(
        FakeGateway::new(fields("2026-02-21", "10:00 AM")),
        FakePatient::replying(vec![]),
        settings(ReviewMode::Interactive),
    );

    let run = wf.run("10am please", slots(&MORNING)).await;
    assert_eq!(run.selected_slot.as_deref(), Some(MORNING[1]));
    assert_eq!(run.available_slots.labels(), [MORNING[0].to_string()]);
}

#[tokio::test]
async fn test_other_date_proposes_everything_and_waits_for_review() {
    let (wf, outbox) = build(
        FakeGateway::new(fields("2026-03-01", "9:30 AM")),
        FakePatient::replying(vec![]),
        settings(ReviewMode::Interactive),
    );

    let run = wf.run("March 1st please", slots(&MORNING)).await;

    assert_eq!(run.status, RunStatus::DraftReady);
    assert!(run.awaiting_review());
    assert_eq!(run.selected_slot, None);
    assert_eq!(run.proposed_slots, slots(&MORNING));
    assert_eq!(run.available_slots.len(), 2);
    assert!(run.draft_email.as_deref().unwrap().contains(MORNING[1]));
    assert!(outbox.entries().is_empty());
}

#[tokio::test]
async fn test_full_negotiation_loop_ends_in_confirmation() {
    let gateway = FakeGateway::new(fields("2026-02-21", "8:00 AM"))
        .with_replies(vec![fields("2026-02-21", "10:00 AM")]);
    let patient = FakePatient::replying(vec![accept(
        "I confirm the appointment for 2026-02-21 at 10:00 AM. Thank you!",
    )]);
    let (wf, outbox) = build(gateway, patient, settings(ReviewMode::Interactive));
    let inventory = SlotInventory::from(slots(&MORNING));

    let run = wf.start("8am on the 21st", &inventory).await;
    assert_eq!(run.status, RunStatus::DraftReady);
    assert_eq!(run.proposed_slots.len(), 2);

    let run = wf
        .resume(run, ReviewDecision::Approve, Some("looks good".into()), &inventory)
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::ConfirmationSent);
    assert_eq!(run.iteration, 1);
    assert_eq!(run.selected_slot.as_deref(), Some(MORNING[1]));
    assert_eq!(run.requested_time.as_deref(), Some("10:00 AM"));
    assert_eq!(run.patient_name.as_deref(), Some("PatientX"));
    assert_eq!(run.human_feedback.as_deref(), Some("looks good"));
    assert_eq!(inventory.snapshot().labels(), [MORNING[0].to_string()]);

    let kinds: Vec<EmailKind> = outbox.entries().into_iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![EmailKind::ProposedSlots, EmailKind::Confirmation]);

    let trail = run.logs.join("\n");
    for marker in [
        "[parse_request]",
        "[check_availability] matched=None",
        "[draft_new_slots_email]",
        "[human_review] Draft approved",
        "[send_proposed_slots_email]",
        "[receive_patient_response] Patient accepted",
        "[parse_response]",
        "[book_appointment]",
    ] {
        assert!(trail.contains(marker), "missing {marker} in:\n{trail}");
    }
}

#[tokio::test]
async fn test_rejected_draft_is_never_sent() {
    let (wf, outbox) = build(
        FakeGateway::new(fields("2026-02-21", "8:00 AM")),
        FakePatient::replying(vec![]),
        settings(ReviewMode::Interactive),
    );
    let inventory = SlotInventory::from(slots(&MORNING));

    let run = wf.start("8am", &inventory).await;
    let run = wf
        .resume(run, ReviewDecision::Reject, None, &inventory)
        .await
        .unwrap();

    assert_eq!(run.status, RunStatus::DraftRejected);
    assert!(outbox.entries().is_empty());
    assert_eq!(inventory.snapshot().len(), 2);
}

#[tokio::test]
async fn test_resume_requires_pending_review() {
    let (wf, _) = build(
        FakeGateway::new(fields("2026-02-21", "9:30 AM")),
        FakePatient::replying(vec![]),
        settings(ReviewMode::Interactive),
    );
    let inventory = SlotInventory::from(slots(&MORNING));

    let run = wf.start("9:30", &inventory).await;
    assert_eq!(run.status, RunStatus::ConfirmationSent);

    let err = wf
        .resume(run, ReviewDecision::Approve, None, &inventory)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WorkflowError::NotAwaitingReview {
            status: RunStatus::ConfirmationSent,
            ..
        }
    ));
}

#[tokio::test]
async fn test_patient_decline_is_terminal() {
    let (wf, outbox) = build(
        FakeGateway::new(fields("2026-02-21", "8:00 AM")),
        FakePatient::replying(vec![]),
        settings(ReviewMode::AutoApprove),
    );

    let run = wf.run("8am", slots(&MORNING)).await;

    assert_eq!(run.status, RunStatus::PatientDeclined);
    assert_eq!(run.patient_response.as_deref(), Some("None of these work for me."));
    assert_eq!(outbox.entries().len(), 1);
    assert_eq!(run.available_slots.len(), 2);
}

#[tokio::test]
async fn test_negotiation_stops_at_round_cap() {
    // the patient keeps picking a time that never matches
    let gateway = FakeGateway::new(fields("2026-02-21", "8:00 AM"))
        .with_replies(vec![fields("2026-02-21", "7:00 AM"); 5]);
    let patient = FakePatient::replying(vec![accept("7am works"); 5]);
    let mut cfg = settings(ReviewMode::AutoApprove);
    cfg.max_negotiation_rounds = 2;
    let (wf, outbox) = build(gateway, patient, cfg);

    let run = wf.run("8am", slots(&MORNING)).await;

    assert_eq!(run.status, RunStatus::NegotiationExhausted);
    assert_eq!(run.iteration, 2);
    assert_eq!(outbox.entries().len(), 3);
}

#[tokio::test]
async fn test_transient_gateway_failure_is_retried() {
    let gateway = FakeGateway::new(fields("2026-02-21", "9:30 AM")).failing(2);
    let (wf, _) = build(gateway, FakePatient::replying(vec![]), settings(ReviewMode::Interactive));

    let run = wf.run("9:30", slots(&MORNING)).await;
    assert_eq!(run.status, RunStatus::ConfirmationSent);
}

#[tokio::test]
async fn test_exhausted_gateway_fails_the_run() {
    let gateway = Arc::new(FakeGateway::new(fields("2026-02-21", "9:30 AM")).failing(10));
    let outbox = Arc::new(Outbox::new("doctor@gmail.com".into()));
    let wf = Workflow::new(
        gateway.clone(),
        Arc::new(FakePatient::replying(vec![])),
        outbox,
        settings(ReviewMode::Interactive),
    );

    let run = wf.run("9:30", slots(&MORNING)).await;

    assert_eq!(run.status, RunStatus::ExtractionFailed);
    assert_eq!(gateway.extract_calls.load(Ordering::SeqCst), 3);
    assert_eq!(run.available_slots.len(), 2);
    assert!(run.logs.last().unwrap().starts_with("[parse_request] Gateway failed"));
}

#[tokio::test]
async fn test_unreadable_request_time_routes_to_not_found() {
    let (wf, _) = build(
        FakeGateway::new(fields("2026-02-21", "14:00")),
        FakePatient::replying(vec![]),
        settings(ReviewMode::Interactive),
    );

    let run = wf.run("2pm", slots(&MORNING)).await;

    assert_eq!(run.status, RunStatus::DraftReady);
    assert!(run.proposed_slots.is_empty());
    assert_eq!(run.available_slots.len(), 2);
    assert!(run
        .logs
        .iter()
        .any(|l| l.starts_with("[check_availability] could not parse requested date/time")));
    assert!(run.draft_email.unwrap().contains("no other openings"));
}

#[tokio::test]
async fn test_empty_pool_gets_apology_draft() {
    let (wf, _) = build(
        FakeGateway::new(fields("2026-02-21", "9:30 AM")),
        FakePatient::replying(vec![]),
        settings(ReviewMode::Interactive),
    );

    let run = wf.run("9:30", Vec::new()).await;

    assert_eq!(run.status, RunStatus::DraftReady);
    assert!(run.proposed_slots.is_empty());
    let draft = run.draft_email.unwrap();
    assert!(draft.starts_with("Dear PatientX,"));
    assert!(draft.contains("2026-02-21 at 9:30 AM"));
    assert!(draft.ends_with("Test Clinic"));
}

#[tokio::test]
async fn test_silent_patient_times_out_as_declined() {
    let mut cfg = settings(ReviewMode::AutoApprove);
    cfg.patient_response_timeout = Duration::from_millis(50);
    let (wf, _) = build(
        FakeGateway::new(fields("2026-02-21", "8:00 AM")),
        FakePatient::silent(Duration::from_secs(10)),
        cfg,
    );

    let run = wf.run("8am", slots(&MORNING)).await;

    assert_eq!(run.status, RunStatus::PatientDeclined);
    assert_eq!(run.patient_response, None);
    assert!(run.logs.last().unwrap().contains("No reply within"));
}

#[tokio::test]
async fn test_expire_closes_pending_review() {
    let (wf, _) = build(
        FakeGateway::new(fields("2026-02-21", "8:00 AM")),
        FakePatient::replying(vec![]),
        settings(ReviewMode::Interactive),
    );

    let run = wf.run("8am", slots(&MORNING)).await;
    let run = wf.expire(run, Duration::from_secs(3600)).unwrap();

    assert_eq!(run.status, RunStatus::ReviewExpired);
    assert!(run.logs.last().unwrap().contains("within 1h"));
    assert!(wf.expire(run, Duration::from_secs(1)).is_err());
}

#[tokio::test]
async fn test_failed_confirmation_returns_slot_to_inventory() {
    let (wf, outbox) = build(
        FakeGateway::new(fields("2026-02-21", "9:30 AM")).without_confirmations(),
        FakePatient::replying(vec![]),
        settings(ReviewMode::Interactive),
    );
    let inventory = SlotInventory::from(slots(&MORNING));

    let run = wf.start("9:30", &inventory).await;

    assert_eq!(run.status, RunStatus::ExtractionFailed);
    assert_eq!(inventory.snapshot().labels(), slots(&MORNING).as_slice());
    assert_eq!(run.available_slots.labels(), slots(&MORNING).as_slice());
    assert!(outbox.entries().is_empty());
    assert_eq!(
        run.logs.last().map(String::as_str),
        Some("[book_appointment] Released 2026-02-21 from 9:00AM to 10:00AM back to the inventory")
    );

    // the released window can be booked by the next request
    let (wf, _) = build(
        FakeGateway::new(fields("2026-02-21", "9:30 AM")),
        FakePatient::replying(vec![]),
        settings(ReviewMode::Interactive),
    );
    let run = wf.start("9:30", &inventory).await;
    assert_eq!(run.status, RunStatus::ConfirmationSent);
    assert_eq!(run.selected_slot.as_deref(), Some(MORNING[0]));
}

#[tokio::test]
async fn test_refused_confirmation_is_delivery_failed_and_releases_slot() {
    let wf = Workflow::new(
        Arc::new(FakeGateway::new(fields("2026-02-21", "10:15 AM"))),
        Arc::new(FakePatient::replying(vec![])),
        Arc::new(RefusingMailer::new(EmailKind::Confirmation)),
        settings(ReviewMode::Interactive),
    );
    let inventory = SlotInventory::from(slots(&MORNING));

    let run = wf.start("10:15", &inventory).await;

    assert_eq!(run.status, RunStatus::DeliveryFailed);
    assert!(run.confirmation_email.is_some());
    assert_eq!(inventory.snapshot().labels(), slots(&MORNING).as_slice());
    assert!(run
        .logs
        .iter()
        .any(|l| l.starts_with("[book_appointment] Delivery failed: mail relay rejected")));
}

#[tokio::test]
async fn test_refused_proposal_is_delivery_failed() {
    let wf = Workflow::new(
        Arc::new(FakeGateway::new(fields("2026-02-21", "8:00 AM"))),
        Arc::new(FakePatient::replying(vec![accept("9am works")])),
        Arc::new(RefusingMailer::new(EmailKind::ProposedSlots)),
        settings(ReviewMode::AutoApprove),
    );

    let run = wf.run("8am", slots(&MORNING)).await;

    assert_eq!(run.status, RunStatus::DeliveryFailed);
    assert_eq!(run.patient_response, None);
    assert_eq!(run.available_slots.len(), 2);
    assert!(run
        .logs
        .last()
        .unwrap()
        .starts_with("[send_proposed_slots_email] Delivery failed"));
}

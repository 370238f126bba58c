pub mod calendar;
pub mod dev;
pub mod health;
pub mod outbox;
pub mod runs;
pub mod slots;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/api/slots", get(slots::get_slots).put(slots::replace_slots))
        .route("/api/runs", get(runs::list_runs).post(runs::create_run))
        .route("/api/runs/:id", get(runs::get_run))
        .route("/api/runs/:id/resume", post(runs::resume_run))
        .route("/api/outbox", get(outbox::list_outbox))
        .route("/api/outbox/events", get(outbox::events_stream))
        .route("/calendar/:run_id", get(calendar::download_ics))
        .route("/api/dev/patient-email", post(dev::simulate_patient_email))
        .with_state(state)
}

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::errors::AppError;
use crate::models::RunRecord;
use crate::state::AppState;

#[derive(Serialize)]
pub struct PatientEmailResponse {
    pub raw_email: String,
    pub run: RunRecord,
}

// POST /api/dev/patient-email
pub async fn simulate_patient_email(
    State(state): State<Arc<AppState>>,
) -> Result<Json<PatientEmailResponse>, AppError> {
    let raw_email = state.patient.write_request().await?;
    tracing::info!(chars = raw_email.len(), "simulated patient wrote a request");

    let run = state.scheduler.start(&raw_email).await;
    Ok(Json(PatientEmailResponse { raw_email, run }))
}

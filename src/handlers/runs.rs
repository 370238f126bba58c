use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{ReviewDecision, RunRecord, RunStatus};
use crate::state::AppState;

// POST /api/runs
#[derive(Deserialize)]
pub struct CreateRunRequest {
    pub raw_email: String,
}

pub async fn create_run(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateRunRequest>,
) -> Result<(StatusCode, Json<RunRecord>), AppError> {
    if payload.raw_email.trim().is_empty() {
        return Err(AppError::BadRequest("raw_email must not be empty".into()));
    }
    let run = state.scheduler.start(&payload.raw_email).await;
    Ok((StatusCode::CREATED, Json(run)))
}

// GET /api/runs
#[derive(Serialize)]
pub struct RunSummary {
    id: Uuid,
    status: RunStatus,
    patient_name: Option<String>,
    requested_date: Option<String>,
    requested_time: Option<String>,
    selected_slot: Option<String>,
    awaiting_review: bool,
    iteration: u32,
    created_at: String,
}

impl From<&RunRecord> for RunSummary {
    fn from(run: &RunRecord) -> Self {
        Self {
            id: run.id,
            status: run.status,
            patient_name: run.patient_name.clone(),
            requested_date: run.requested_date.clone(),
            requested_time: run.requested_time.clone(),
            selected_slot: run.selected_slot.clone(),
            awaiting_review: run.awaiting_review(),
            iteration: run.iteration,
            created_at: run.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

pub async fn list_runs(State(state): State<Arc<AppState>>) -> Json<Vec<RunSummary>> {
    let runs = state.scheduler.list();
    Json(runs.iter().map(RunSummary::from).collect())
}

// GET /api/runs/:id
pub async fn get_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<RunRecord>, AppError> {
    state
        .scheduler
        .get(id)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("run {id}")))
}

// POST /api/runs/:id/resume
#[derive(Deserialize)]
pub struct ResumeRequest {
    pub decision: ReviewDecision,
    #[serde(default)]
    pub feedback: Option<String>,
}

pub async fn resume_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ResumeRequest>,
) -> Result<Json<RunRecord>, AppError> {
    let feedback = payload.feedback.filter(|f| !f.trim().is_empty());
    let run = state
        .scheduler
        .resume(id, payload.decision, feedback)
        .await?;
    Ok(Json(run))
}

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{RunStatus, SlotWindow};
use crate::services::calendar::generate_ics;
use crate::state::AppState;

// GET /calendar/:run_id
pub async fn download_ics(
    State(state): State<Arc<AppState>>,
    Path(raw_id): Path<String>,
) -> Result<Response, AppError> {
    // Strip .ics suffix if present
    let raw_id = raw_id.strip_suffix(".ics").unwrap_or(&raw_id);
    let run_id = Uuid::parse_str(raw_id)
        .map_err(|_| AppError::BadRequest(format!("invalid run id {raw_id:?}")))?;

    let run = state
        .scheduler
        .get(run_id)
        .ok_or_else(|| AppError::NotFound(format!("run {run_id}")))?;

    if run.status != RunStatus::ConfirmationSent {
        return Err(AppError::NotFound(format!("run {run_id} has no confirmed booking")));
    }
    let window = run
        .selected_slot
        .as_deref()
        .and_then(SlotWindow::parse)
        .ok_or_else(|| AppError::NotFound(format!("run {run_id} has no confirmed booking")))?;

    let ics = generate_ics(&run, &window, &state.config.clinic_name);
    let filename = format!("appointment-{run_id}.ics");

    Ok((
        [
            (header::CONTENT_TYPE, "text/calendar; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        ics,
    )
        .into_response())
}

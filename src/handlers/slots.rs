use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::models::AvailabilityPool;
use crate::state::AppState;

#[derive(Serialize)]
pub struct SlotsResponse {
    slots: Vec<String>,
    /// Labels kept in the inventory that no request can ever match.
    unparseable: Vec<String>,
}

impl From<AvailabilityPool> for SlotsResponse {
    fn from(pool: AvailabilityPool) -> Self {
        Self {
            unparseable: pool.unparseable(),
            slots: pool.into_labels(),
        }
    }
}

// GET /api/slots
pub async fn get_slots(State(state): State<Arc<AppState>>) -> Json<SlotsResponse> {
    Json(state.scheduler.inventory().snapshot().into())
}

// PUT /api/slots
#[derive(Deserialize)]
pub struct ReplaceSlotsRequest {
    pub slots: Vec<String>,
}

pub async fn replace_slots(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ReplaceSlotsRequest>,
) -> Json<SlotsResponse> {
    let pool = AvailabilityPool::new(payload.slots);
    let unparseable = pool.unparseable();
    if !unparseable.is_empty() {
        tracing::warn!(count = unparseable.len(), "inventory contains unparseable slot labels");
    }
    tracing::info!(slots = pool.len(), "inventory replaced");

    state.scheduler.inventory().replace(pool.clone());
    Json(pool.into())
}

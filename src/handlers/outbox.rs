use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::sse::{Event, Sse};
use axum::Json;
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::models::OutboxEntry;
use crate::state::AppState;

// GET /api/outbox
pub async fn list_outbox(State(state): State<Arc<AppState>>) -> Json<Vec<OutboxEntry>> {
    Json(state.outbox.entries())
}

// GET /api/outbox/events (SSE)
#[derive(Deserialize)]
pub struct SseQuery {
    pub last_id: Option<i64>,
}

fn outbox_event(entry: &OutboxEntry) -> Event {
    let data = serde_json::to_string(entry).unwrap_or_default();
    Event::default()
        .data(data)
        .id(entry.id.to_string())
        .event("outbox_email")
}

pub async fn events_stream(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SseQuery>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let last_id = query.last_id.unwrap_or(0);

    // Subscribe before reading the backlog so nothing sent in between is lost
    let rx = state.outbox.subscribe();
    let catchup = state.outbox.entries_since(last_id);
    let caught_up_to = catchup.last().map(|e| e.id).unwrap_or(last_id);

    let catchup_stream =
        tokio_stream::iter(catchup.into_iter().map(|entry| Ok::<_, Infallible>(outbox_event(&entry))));

    let live_stream = BroadcastStream::new(rx).filter_map(move |result| match result {
        Ok(entry) if entry.id > caught_up_to => Some(Ok(outbox_event(&entry))),
        Ok(_) => None,
        Err(tokio_stream::wrappers::errors::BroadcastStreamRecvError::Lagged(n)) => {
            tracing::warn!(skipped = n, "outbox subscriber lagged");
            None
        }
    });

    let keepalive_stream = tokio_stream::StreamExt::map(
        tokio_stream::wrappers::IntervalStream::new(tokio::time::interval(Duration::from_secs(30))),
        |_| Ok(Event::default().comment("keepalive")),
    );

    let combined = catchup_stream.chain(live_stream);
    Sse::new(StreamExt::merge(combined, keepalive_stream))
}

//! Analysis handlers - blocking run and Server-Sent Events progress stream

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures_util::stream::{self, Stream};
use spendlens_core::{AnalysisRun, ProgressEvent};
use tokio::sync::mpsc;
use tracing::{info, warn};

use super::session_error;
use crate::{AppError, AppState};

/// POST /api/sessions/:id/analyze - Run the analysis to completion
pub async fn analyze_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<AnalysisRun>, AppError> {
    let session = state.sessions.get(&session_id).await.map_err(session_error)?;

    let run = state
        .engine
        .run_analysis(session.ledger, session.profile)
        .await
        .map_err(|e| AppError::bad_request(&e.to_string()))?;

    info!(
        session_id = %session_id,
        tools_run = run.tools_run.len(),
        insights = run.all_insights.len(),
        "Session analyzed"
    );

    state
        .sessions
        .store_run(&session_id, Arc::new(run.clone()))
        .await
        .map_err(session_error)?;

    Ok(Json(run))
}

struct StreamState {
    rx: mpsc::Receiver<ProgressEvent>,
    state: Arc<AppState>,
    session_id: String,
    finished: bool,
}

fn to_sse(event: &ProgressEvent) -> Event {
    Event::default().json_data(event).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to encode progress event");
        Event::default().data(r#"{"error":"failed to encode progress event"}"#)
    })
}

/// GET /api/sessions/:id/analyze/stream - Progress as Server-Sent Events
///
/// Each event's data is one progress JSON object. The stream ends after the
/// `done` or `error` event; the finished run is stored on the session so a
/// client that lost the stream can fall back to the blocking endpoint.
pub async fn stream_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let session = state.sessions.get(&session_id).await.map_err(session_error)?;
    let rx = state
        .engine
        .stream_analysis(session.ledger, session.profile);

    let events = stream::unfold(
        StreamState {
            rx,
            state,
            session_id,
            finished: false,
        },
        |mut s| async move {
            if s.finished {
                return None;
            }
            let event = s.rx.recv().await?;
            if let ProgressEvent::Done { data, .. } = &event {
                let run = Arc::new(data.as_ref().clone());
                if let Err(e) = s.state.sessions.store_run(&s.session_id, run).await {
                    warn!(session_id = %s.session_id, error = ?e, "Could not store streamed run");
                }
            }
            s.finished = event.is_terminal();
            Some((Ok::<_, Infallible>(to_sse(&event)), s))
        },
    );

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

//! Question handler

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use spendlens_core::{narrate_or_template, AskResponse, NarrationRequest, TemplateNarrator};
use tracing::debug;

use super::session_error;
use crate::{AppError, AppState};

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: String,
    /// Narrate with the configured model instead of the template
    #[serde(default)]
    pub narrate: bool,
}

#[derive(Debug, Serialize)]
pub struct AskResult {
    #[serde(flatten)]
    pub response: AskResponse,
    /// Plain-language answer
    pub answer: String,
}

/// POST /api/sessions/:id/ask - Answer a question from the session's analysis
pub async fn ask_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(payload): Json<AskRequest>,
) -> Result<Json<AskResult>, AppError> {
    let question = payload.question.trim();
    if question.is_empty() {
        return Err(AppError::bad_request("Question must not be empty"));
    }

    let session = state.sessions.get(&session_id).await.map_err(session_error)?;
    let run = session
        .run
        .ok_or_else(|| AppError::bad_request("Run an analysis before asking questions"))?;

    let response = state.ask_router.route(question, &run);
    debug!(
        session_id = %session_id,
        tool_used = %response.tool_used,
        fallback = response.fallback,
        "Question routed"
    );

    let request = NarrationRequest::for_answer(question, &response);
    let answer = match (&state.narrator, payload.narrate) {
        (Some(narrator), true) => narrate_or_template(narrator.as_ref(), &request).await,
        _ => narrate_or_template(&TemplateNarrator, &request).await,
    };

    Ok(Json(AskResult { response, answer }))
}

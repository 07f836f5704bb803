//! Session handlers - upload a ledger, inspect or delete it

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use spendlens_core::{parse_csv, JsonLedger, Ledger, LedgerProvider, Profile, Transaction};
use tracing::{debug, info};

use super::session_error;
use crate::sessions::SessionInfo;
use crate::{AppError, AppState};

/// Request body for a JSON ledger upload
#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub profile: Profile,
}

async fn open_session(
    state: &AppState,
    ledger: Ledger,
) -> Result<Json<CreateSessionResponse>, AppError> {
    if ledger.is_empty() {
        return Err(AppError::bad_request("Ledger has no transactions"));
    }
    let profile = state
        .engine
        .profile(&ledger)
        .map_err(|e| AppError::bad_request(&e.to_string()))?;

    let transactions = ledger.len();
    let session_id = state.sessions.create(Arc::new(ledger), profile.clone()).await;
    info!(session_id = %session_id, transactions, months = profile.months_count, "Created session");

    Ok(Json(CreateSessionResponse {
        session_id,
        profile,
    }))
}

/// POST /api/sessions - Create a session from JSON transactions
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<Json<CreateSessionResponse>, AppError> {
    let ledger = JsonLedger::new(payload.transactions)
        .load()
        .map_err(|e| AppError::bad_request(&e.to_string()))?;
    open_session(&state, ledger).await
}

/// POST /api/sessions/csv - Create a session from a raw CSV body
pub async fn create_session_csv(
    State(state): State<Arc<AppState>>,
    body: String,
) -> Result<Json<CreateSessionResponse>, AppError> {
    let transactions =
        parse_csv(body.as_bytes()).map_err(|e| AppError::bad_request(&e.to_string()))?;
    open_session(&state, Ledger::new(transactions)).await
}

/// GET /api/sessions/:id - Get session info
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionInfo>, AppError> {
    let info = state
        .sessions
        .info(&session_id)
        .await
        .map_err(session_error)?;
    Ok(Json(info))
}

/// DELETE /api/sessions/:id - Delete a session
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let deleted = state.sessions.remove(&session_id).await;

    debug!(session_id = %session_id, deleted = deleted, "Deleted session");

    Ok(Json(serde_json::json!({ "deleted": deleted })))
}

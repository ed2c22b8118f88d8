//! # Document Approval API
//!
//! Routes:
//! - POST /v1/documents — Register a document snapshot (in-memory gateway)
//! - POST /v1/documents/{type}/{id}/{action} — submit, approve, reject, return, cancel
//! - GET  /v1/documents/{type}/{id}/actions — Actions available to the caller
//! - GET  /v1/documents/{type}/{id}/history — Audit log, oldest first
//! - GET  /v1/documents/{type}/{id}/status — Status and current stage
//!
//! `{type}` is `invoice` or `payment`. Transition bodies are optional:
//! `{"stage_id", "comment", "expected_version"}`.
//!
//! Registration is demo tooling for the in-memory gateway. It trusts the
//! caller's headers like every other route, and a host application that owns
//! its document records would not expose it. A document that is routing
//! cannot be re-registered, so its creator and type stay fixed in flight.

use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use signoff_core::{DocumentRef, DocumentTypeId, EntityType, SignoffError, UserId};
use signoff_engine::{ActionRequest, DocumentSnapshot, DocumentStatus, TransitionOutcome, WorkflowAction};
use signoff_state::{ActionKind, AvailableActions};

use crate::error::AppError;
use crate::extractors::{extract_validated_json, CallerActor, Validate};
use crate::state::AppState;

/// Request to register or replace a document snapshot.
#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterDocumentRequest {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub document_type: DocumentTypeId,
    /// Defaults to the caller.
    #[serde(default)]
    pub created_by: Option<UserId>,
    #[serde(default)]
    pub externally_finalized: bool,
}

impl Validate for RegisterDocumentRequest {
    fn validate(&self) -> Result<(), String> {
        if self.entity_id.trim().is_empty() {
            return Err("entity_id must not be empty".to_string());
        }
        if self.entity_id.len() > 255 {
            return Err("entity_id must not exceed 255 characters".to_string());
        }
        Ok(())
    }
}

/// Build the document approval router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/documents", post(register_document))
        .route("/v1/documents/{entity_type}/{entity_id}/actions", get(available_actions))
        .route("/v1/documents/{entity_type}/{entity_id}/history", get(history))
        .route("/v1/documents/{entity_type}/{entity_id}/status", get(status))
        .route("/v1/documents/{entity_type}/{entity_id}/{action}", post(transition))
}

fn document_ref(entity_type: EntityType, entity_id: &str) -> Result<DocumentRef, AppError> {
    Ok(DocumentRef::new(entity_type, entity_id)?)
}

/// POST /v1/documents
async fn register_document(
    State(state): State<AppState>,
    CallerActor(actor): CallerActor,
    body: Result<Json<RegisterDocumentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<DocumentSnapshot>), AppError> {
    let request = extract_validated_json(body)?;
    let reference = document_ref(request.entity_type, &request.entity_id)?;
    match state.engine.status(&reference) {
        Ok(current) if current.instance_id.is_some() => {
            return Err(AppError::Conflict(format!(
                "document {reference} is pending approval and cannot be re-registered"
            )));
        }
        Ok(_) | Err(SignoffError::NotFound(_)) => {}
        Err(e) => return Err(e.into()),
    }
    let snapshot = DocumentSnapshot {
        reference,
        document_type: request.document_type,
        created_by: request.created_by.unwrap_or(actor.user_id),
        externally_finalized: request.externally_finalized,
    };
    state.documents.upsert(snapshot.clone());
    tracing::debug!(document = %snapshot.reference, "document registered");
    Ok((StatusCode::CREATED, Json(snapshot)))
}

/// POST /v1/documents/{type}/{id}/{action}
async fn transition(
    State(state): State<AppState>,
    CallerActor(actor): CallerActor,
    Path((entity_type, entity_id, action)): Path<(EntityType, String, String)>,
    body: Bytes,
) -> Result<Json<TransitionOutcome>, AppError> {
    let document = document_ref(entity_type, &entity_id)?;
    let action: ActionKind = action.parse()?;
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        ActionRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| AppError::BadRequest(e.to_string()))?
    };
    Ok(Json(state.engine.perform(action, &document, &actor, request)?))
}

/// GET /v1/documents/{type}/{id}/actions
async fn available_actions(
    State(state): State<AppState>,
    CallerActor(actor): CallerActor,
    Path((entity_type, entity_id)): Path<(EntityType, String)>,
) -> Result<Json<AvailableActions>, AppError> {
    let document = document_ref(entity_type, &entity_id)?;
    Ok(Json(state.engine.get_available_actions(&document, &actor)?))
}

/// GET /v1/documents/{type}/{id}/history
async fn history(
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(EntityType, String)>,
) -> Result<Json<Vec<WorkflowAction>>, AppError> {
    let document = document_ref(entity_type, &entity_id)?;
    Ok(Json(state.engine.get_history(&document)?))
}

/// GET /v1/documents/{type}/{id}/status
async fn status(
    State(state): State<AppState>,
    Path((entity_type, entity_id)): Path<(EntityType, String)>,
) -> Result<Json<DocumentStatus>, AppError> {
    let document = document_ref(entity_type, &entity_id)?;
    Ok(Json(state.engine.status(&document)?))
}

//! # Workflow Definition API
//!
//! Routes:
//! - GET    /v1/workflows — List workflows, sorted by name
//! - POST   /v1/workflows — Create an inactive workflow
//! - GET    /v1/workflows/{id} — Get a workflow with its stages
//! - PATCH  /v1/workflows/{id} — Update name, description, applicability, activation
//! - DELETE /v1/workflows/{id} — Delete (409 while documents are routing)
//! - POST   /v1/workflows/{id}/clone — Deep-copy under a new name
//! - POST   /v1/workflows/{id}/active — Toggle activation
//! - POST   /v1/workflows/{id}/stages — Add a stage
//! - PUT    /v1/workflows/{id}/stages/order — Reorder all stages
//! - PATCH  /v1/stages/{id} — Update a stage
//! - DELETE /v1/stages/{id} — Delete a stage
//!
//! Reads are open; writes require an actor.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use signoff_core::{StageId, WorkflowId};
use signoff_definition::{NewStage, NewWorkflow, StagePatch, WorkflowDefinition, WorkflowPatch, WorkflowStage};

use crate::error::AppError;
use crate::extractors::{extract_json, extract_validated_json, CallerActor, Validate};
use crate::state::AppState;

/// Request to clone a workflow.
#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CloneRequest {
    pub name: String,
}

impl Validate for CloneRequest {
    fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name must not be empty".to_string());
        }
        Ok(())
    }
}

/// Request to reorder a workflow's stages.
#[derive(Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReorderRequest {
    /// Every stage id of the workflow, in the new order.
    pub stage_ids: Vec<StageId>,
}

impl Validate for ReorderRequest {
    fn validate(&self) -> Result<(), String> {
        if self.stage_ids.is_empty() {
            return Err("stage_ids must not be empty".to_string());
        }
        Ok(())
    }
}

/// Build the workflow definition router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/workflows", get(list_workflows).post(create_workflow))
        .route(
            "/v1/workflows/{id}",
            get(get_workflow).patch(update_workflow).delete(delete_workflow),
        )
        .route("/v1/workflows/{id}/clone", post(clone_workflow))
        .route("/v1/workflows/{id}/active", post(toggle_active))
        .route("/v1/workflows/{id}/stages", post(add_stage))
        .route("/v1/workflows/{id}/stages/order", put(reorder_stages))
        .route("/v1/stages/{id}", patch(update_stage).delete(delete_stage))
}

/// GET /v1/workflows
async fn list_workflows(State(state): State<AppState>) -> Json<Vec<WorkflowDefinition>> {
    Json(state.engine.list_workflows())
}

/// POST /v1/workflows
async fn create_workflow(
    State(state): State<AppState>,
    CallerActor(actor): CallerActor,
    body: Result<Json<NewWorkflow>, JsonRejection>,
) -> Result<(StatusCode, Json<WorkflowDefinition>), AppError> {
    let mut request = extract_json(body)?;
    request.created_by.get_or_insert(actor.user_id);
    let workflow = state.engine.create_workflow(request)?;
    Ok((StatusCode::CREATED, Json(workflow)))
}

/// GET /v1/workflows/{id}
async fn get_workflow(
    State(state): State<AppState>,
    Path(id): Path<WorkflowId>,
) -> Result<Json<WorkflowDefinition>, AppError> {
    Ok(Json(state.engine.get_workflow(id)?))
}

/// PATCH /v1/workflows/{id}
async fn update_workflow(
    State(state): State<AppState>,
    CallerActor(_actor): CallerActor,
    Path(id): Path<WorkflowId>,
    body: Result<Json<WorkflowPatch>, JsonRejection>,
) -> Result<Json<WorkflowDefinition>, AppError> {
    let patch = extract_json(body)?;
    Ok(Json(state.engine.update_workflow(id, patch)?))
}

/// DELETE /v1/workflows/{id}
async fn delete_workflow(
    State(state): State<AppState>,
    CallerActor(_actor): CallerActor,
    Path(id): Path<WorkflowId>,
) -> Result<StatusCode, AppError> {
    state.engine.delete_workflow(id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/workflows/{id}/clone
async fn clone_workflow(
    State(state): State<AppState>,
    CallerActor(actor): CallerActor,
    Path(id): Path<WorkflowId>,
    body: Result<Json<CloneRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<WorkflowDefinition>), AppError> {
    let request = extract_validated_json(body)?;
    let workflow = state.engine.clone_workflow(id, &request.name, &actor)?;
    Ok((StatusCode::CREATED, Json(workflow)))
}

/// POST /v1/workflows/{id}/active
async fn toggle_active(
    State(state): State<AppState>,
    CallerActor(_actor): CallerActor,
    Path(id): Path<WorkflowId>,
) -> Result<Json<WorkflowDefinition>, AppError> {
    Ok(Json(state.engine.toggle_active(id)?))
}

/// POST /v1/workflows/{id}/stages
async fn add_stage(
    State(state): State<AppState>,
    CallerActor(_actor): CallerActor,
    Path(id): Path<WorkflowId>,
    body: Result<Json<NewStage>, JsonRejection>,
) -> Result<(StatusCode, Json<WorkflowStage>), AppError> {
    let request = extract_json(body)?;
    let stage = state.engine.add_stage(id, request)?;
    Ok((StatusCode::CREATED, Json(stage)))
}

/// PUT /v1/workflows/{id}/stages/order
async fn reorder_stages(
    State(state): State<AppState>,
    CallerActor(_actor): CallerActor,
    Path(id): Path<WorkflowId>,
    body: Result<Json<ReorderRequest>, JsonRejection>,
) -> Result<Json<Vec<WorkflowStage>>, AppError> {
    let request = extract_validated_json(body)?;
    Ok(Json(state.engine.reorder_stages(id, &request.stage_ids)?))
}

/// PATCH /v1/stages/{id}
async fn update_stage(
    State(state): State<AppState>,
    CallerActor(_actor): CallerActor,
    Path(id): Path<StageId>,
    body: Result<Json<StagePatch>, JsonRejection>,
) -> Result<Json<WorkflowStage>, AppError> {
    let patch = extract_json(body)?;
    Ok(Json(state.engine.update_stage(id, patch)?))
}

/// DELETE /v1/stages/{id}
async fn delete_stage(
    State(state): State<AppState>,
    CallerActor(_actor): CallerActor,
    Path(id): Path<StageId>,
) -> Result<StatusCode, AppError> {
    state.engine.delete_stage(id)?;
    Ok(StatusCode::NO_CONTENT)
}

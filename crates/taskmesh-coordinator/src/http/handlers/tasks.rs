//! Task queue handlers.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    Json,
};
use tracing::{debug, info};

use taskmesh_core::api::{ClaimRequest, ClaimResponse};
use taskmesh_core::{
    CoreError, CreateTaskRequest, Event, EventType, Task, TaskId, TaskStatus, UpdateTaskRequest,
};

use crate::http::responses::{ok, parse_label_filter, query_param, ApiResult};
use crate::state::AppState;

/// `GET /api/v1/tasks?status=...`
pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> ApiResult<Vec<Task>> {
    let Query(params) = query?;
    let status = match query_param(&params, "status") {
        None | Some("") => None,
        Some(s) => Some(s.parse::<TaskStatus>()?),
    };
    ok(state.tasks.list(status).await)
}

pub async fn create_task(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> ApiResult<Task> {
    let Json(req) = payload?;
    let task = state.tasks.create(req).await?;

    state.emit(Event::for_task(EventType::TaskCreated, &task));
    ok(task)
}

/// `GET /api/v1/tasks/pending?label=k:v&label=...`
pub async fn list_pending(
    State(state): State<Arc<AppState>>,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> ApiResult<Vec<Task>> {
    let Query(params) = query?;
    let labels = parse_label_filter(&params)?;
    ok(state.tasks.pending(&labels).await)
}

pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> ApiResult<Task> {
    ok(state.tasks.get(&TaskId::new(task_id)).await?)
}

pub async fn update_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
    payload: Result<Json<UpdateTaskRequest>, JsonRejection>,
) -> ApiResult<Task> {
    let Json(req) = payload?;
    let task = state.tasks.update(&TaskId::new(task_id), req).await?;

    state.emit(Event::for_task(EventType::for_task_status(task.status), &task));
    ok(task)
}

pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> ApiResult<Task> {
    let task = state.tasks.delete(&TaskId::new(task_id)).await?;

    state.emit(Event::for_task(EventType::TaskDeleted, &task));
    ok(task)
}

/// `POST /api/v1/tasks/{id}/claim`
///
/// The caller must hold a live registration. Losing a race is reported as
/// `200 {claimed: false}` rather than an error status.
pub async fn claim_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
    payload: Result<Json<ClaimRequest>, JsonRejection>,
) -> ApiResult<ClaimResponse> {
    let Json(req) = payload?;
    if req.registration_id.is_empty() {
        return Err(CoreError::MissingField("registration_id").into());
    }
    if req.worker_name.trim().is_empty() {
        return Err(CoreError::MissingField("worker_name").into());
    }

    let node = state
        .registry
        .get_node_by_registration(&req.registration_id)
        .await?;
    let task_id = TaskId::new(task_id);

    match state.tasks.claim(&task_id, &node.id, &req.worker_name).await {
        Ok(task) => {
            state.emit(
                Event::for_task(EventType::TaskClaimed, &task)
                    .with_node(node.id)
                    .with_agent(req.worker_name),
            );
            ok(ClaimResponse::claimed(task))
        }
        Err(err) if err.is_claim_conflict() => {
            info!(task_id = %task_id, node_id = %node.id, error = %err, "Claim lost");
            ok(ClaimResponse::rejected(err.to_string()))
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn release_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> ApiResult<Task> {
    let task = state.tasks.release(&TaskId::new(task_id)).await?;
    debug!(task_id = %task.id, "Release acknowledged");

    state.emit(Event::for_task(EventType::TaskReleased, &task));
    ok(task)
}

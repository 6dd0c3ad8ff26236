//! Node registration, heartbeat and listing handlers.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    Json,
};
use tracing::debug;

use taskmesh_core::api::UnregisterResponse;
use taskmesh_core::{
    CoreError, Event, EventType, HeartbeatRequest, Node, NodeId, NodeStatus, RegisterRequest,
    RegisterResponse, RegistrationId,
};

use crate::http::responses::{ok, parse_label_filter, query_param, ApiResult};
use crate::state::AppState;

pub async fn register_node(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<RegisterResponse> {
    let Json(req) = payload?;
    let node_id = req.node_id.clone();
    let response = state.registry.register(req).await?;

    let node = state.registry.get_node(&node_id).await?;
    state.emit(Event::for_node(EventType::NodeRegistered, &node));
    ok(response)
}

pub async fn unregister_node(
    State(state): State<Arc<AppState>>,
    Path(registration_id): Path<String>,
) -> ApiResult<UnregisterResponse> {
    let registration_id = RegistrationId::new(registration_id);
    let node = state.registry.unregister(&registration_id).await?;

    state.emit(Event::for_node(EventType::NodeUnregistered, &node));
    ok(UnregisterResponse {
        node_id: node.id,
        registration_id,
    })
}

pub async fn heartbeat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<HeartbeatRequest>, JsonRejection>,
) -> ApiResult<Node> {
    let Json(req) = payload?;
    if req.registration_id.is_empty() {
        return Err(CoreError::MissingField("registration_id").into());
    }
    let node = state.registry.heartbeat(req).await?;

    state.emit(Event::for_node(EventType::NodeHeartbeat, &node));
    ok(node)
}

/// `GET /api/v1/nodes?status=online|available&label=k:v`
pub async fn list_nodes(
    State(state): State<Arc<AppState>>,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> ApiResult<Vec<Node>> {
    let Query(params) = query?;
    let labels = parse_label_filter(&params)?;
    let status = query_param(&params, "status");
    debug!(?status, labels = labels.len(), "Listing nodes");

    let mut nodes = match status {
        None | Some("") => state.registry.list_nodes().await,
        Some("available") => state.registry.list_available_nodes().await,
        Some(other) => {
            let wanted: NodeStatus = other.parse()?;
            let mut nodes = state.registry.list_nodes().await;
            nodes.retain(|n| n.status == wanted);
            nodes
        }
    };
    if !labels.is_empty() {
        nodes.retain(|n| n.matches_labels(&labels));
    }
    ok(nodes)
}

pub async fn get_node(
    State(state): State<Arc<AppState>>,
    Path(node_id): Path<String>,
) -> ApiResult<Node> {
    ok(state.registry.get_node(&NodeId::new(node_id)).await?)
}

//! Aggregate state and statistics handlers.

use std::sync::Arc;

use axum::extract::{Path, State};

use taskmesh_core::api::{RepoStateResponse, StatsResponse};

use crate::http::responses::{ok, ApiResult};
use crate::state::AppState;

/// `GET /api/v1/state/{repo}`: agents, nodes working on the repo, and
/// the pending task count.
pub async fn repo_state(
    State(state): State<Arc<AppState>>,
    Path(repo): Path<String>,
) -> ApiResult<RepoStateResponse> {
    let agents = state.agents.list(Some(&repo)).await;
    let nodes = state
        .registry
        .list_nodes()
        .await
        .into_iter()
        .filter(|n| n.runs_repo(&repo) || agents.iter().any(|a| a.node_id.as_ref() == Some(&n.id)))
        .collect();
    let pending_tasks = state.tasks.pending_count_for_repo(&repo).await;

    ok(RepoStateResponse {
        repo,
        agents,
        nodes,
        pending_tasks,
    })
}

pub async fn stats(State(state): State<Arc<AppState>>) -> ApiResult<StatsResponse> {
    ok(StatsResponse {
        nodes: state.registry.stats().await,
        tasks: state.tasks.stats().await,
        event_subscribers: state.events.subscriber_count(),
    })
}

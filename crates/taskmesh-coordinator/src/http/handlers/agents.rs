//! Agent directory handlers.

use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    Json,
};

use taskmesh_core::api::AgentStatusUpdate;
use taskmesh_core::{AgentRecord, Event, EventType};

use crate::http::responses::{ok, query_param, ApiResult};
use crate::state::AppState;

fn agent_event(event_type: EventType, agent: &AgentRecord) -> Event {
    let mut event = Event::new(event_type)
        .with_repo(agent.repo.clone())
        .with_agent(agent.name.clone())
        .with_data(serde_json::json!({
            "agent_type": agent.agent_type,
            "status": agent.status,
        }));
    if let Some(node_id) = &agent.node_id {
        event = event.with_node(node_id.clone());
    }
    if let Some(task_id) = &agent.task_id {
        event = event.with_task(task_id.clone());
    }
    event
}

/// `GET /api/v1/agents?repo=...`
pub async fn list_agents(
    State(state): State<Arc<AppState>>,
    query: Result<Query<Vec<(String, String)>>, QueryRejection>,
) -> ApiResult<Vec<AgentRecord>> {
    let Query(params) = query?;
    let repo = query_param(&params, "repo").filter(|r| !r.is_empty());
    ok(state.agents.list(repo).await)
}

pub async fn register_agent(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AgentRecord>, JsonRejection>,
) -> ApiResult<AgentRecord> {
    let Json(agent) = payload?;
    let agent = state.agents.register(agent).await?;

    state.emit(agent_event(EventType::AgentRegistered, &agent));
    ok(agent)
}

pub async fn get_agent(
    State(state): State<Arc<AppState>>,
    Path((repo, name)): Path<(String, String)>,
) -> ApiResult<AgentRecord> {
    ok(state.agents.get(&repo, &name).await?)
}

pub async fn unregister_agent(
    State(state): State<Arc<AppState>>,
    Path((repo, name)): Path<(String, String)>,
) -> ApiResult<AgentRecord> {
    let agent = state.agents.unregister(&repo, &name).await?;

    state.emit(agent_event(EventType::AgentUnregistered, &agent));
    ok(agent)
}

pub async fn update_agent_status(
    State(state): State<Arc<AppState>>,
    Path((repo, name)): Path<(String, String)>,
    payload: Result<Json<AgentStatusUpdate>, JsonRejection>,
) -> ApiResult<AgentRecord> {
    let Json(update) = payload?;
    let agent = state
        .agents
        .update_status(&repo, &name, update.status)
        .await?;

    state.emit(agent_event(EventType::AgentUpdated, &agent));
    ok(agent)
}

pub async fn agent_heartbeat(
    State(state): State<Arc<AppState>>,
    Path((repo, name)): Path<(String, String)>,
) -> ApiResult<AgentRecord> {
    ok(state.agents.heartbeat(&repo, &name).await?)
}

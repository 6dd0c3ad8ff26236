//! HTTP server for the coordinator.
//!
//! Provides endpoints for:
//! - Node registration and heartbeats (`/api/v1/register`, `/api/v1/heartbeat`, `/api/v1/nodes`)
//! - The task queue and claims (`/api/v1/tasks`)
//! - The agent directory (`/api/v1/agents`)
//! - Message routing and repo state (`/api/v1/messages`, `/api/v1/state`)
//! - Live events over SSE (`/api/v1/events/stream`)
//! - Health check (`/api/v1/health`) and Prometheus metrics (`/metrics`)

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub mod auth;
mod handlers;
pub mod responses;

/// Create the HTTP router.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        // Nodes
        .route("/api/v1/register", post(handlers::register_node))
        .route(
            "/api/v1/register/:registration_id",
            delete(handlers::unregister_node),
        )
        .route("/api/v1/heartbeat", post(handlers::heartbeat))
        .route("/api/v1/nodes", get(handlers::list_nodes))
        .route("/api/v1/nodes/:id", get(handlers::get_node))
        // Tasks
        .route(
            "/api/v1/tasks",
            get(handlers::list_tasks).post(handlers::create_task),
        )
        .route("/api/v1/tasks/pending", get(handlers::list_pending))
        .route(
            "/api/v1/tasks/:id",
            get(handlers::get_task)
                .put(handlers::update_task)
                .delete(handlers::delete_task),
        )
        .route("/api/v1/tasks/:id/claim", post(handlers::claim_task))
        .route("/api/v1/tasks/:id/release", post(handlers::release_task))
        // Agents
        .route(
            "/api/v1/agents",
            get(handlers::list_agents).post(handlers::register_agent),
        )
        .route(
            "/api/v1/agents/:repo/:name",
            get(handlers::get_agent).delete(handlers::unregister_agent),
        )
        .route(
            "/api/v1/agents/:repo/:name/status",
            put(handlers::update_agent_status),
        )
        .route(
            "/api/v1/agents/:repo/:name/heartbeat",
            post(handlers::agent_heartbeat),
        )
        // Messages and aggregates
        .route(
            "/api/v1/messages",
            get(handlers::list_messages).post(handlers::route_message),
        )
        .route("/api/v1/state/:repo", get(handlers::repo_state))
        .route("/api/v1/stats", get(handlers::stats))
        .route("/api/v1/events/stream", get(handlers::event_stream))
        // Observability
        .route("/metrics", get(handlers::metrics_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    Router::new()
        .route("/api/v1/health", get(handlers::health_check))
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

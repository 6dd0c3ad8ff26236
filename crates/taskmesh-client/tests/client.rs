//! Client integration tests.
//!
//! Mock coordinators are small axum routers; the end-to-end tests run the
//! real coordinator on a random port.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use tokio_util::sync::CancellationToken;

use taskmesh_client::{
    AgentStore, ClientConfig, ClientError, CoordinatorClient, HybridConfig, HybridRegistry,
    LocalAgentStore,
};
use taskmesh_coordinator::{Config, Server};
use taskmesh_core::api::{ApiResponse, MessageRequest};
use taskmesh_core::{
    AgentRecord, AgentStatus, AgentType, CreateTaskRequest, HeartbeatRequest, Priority,
    RegisterRequest, TaskResult, TaskStatus, UpdateTaskRequest,
};

const TOKEN: &str = "client-test-token";

/// Serve `router` on a random port until the returned token is cancelled.
async fn serve_mock(router: Router) -> (String, CancellationToken) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await
            .unwrap();
    });
    (format!("http://{addr}"), cancel)
}

struct Coordinator {
    base: String,
    cancel: CancellationToken,
}

impl Coordinator {
    async fn start() -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let server = Arc::new(Server::new(Config {
            auth_tokens: vec![TOKEN.to_string()],
            ..Config::default()
        }));
        let token = cancel.clone();
        tokio::spawn(async move {
            server.serve(listener, token).await.unwrap();
        });
        Self {
            base: format!("http://{addr}"),
            cancel,
        }
    }

    fn client(&self) -> CoordinatorClient {
        CoordinatorClient::new(ClientConfig::new(&self.base).with_token(TOKEN)).unwrap()
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ============================================================================
// Cache
// ============================================================================

async fn counted_get_agent(
    State(hits): State<Arc<AtomicUsize>>,
    Path((repo, name)): Path<(String, String)>,
) -> Json<ApiResponse<AgentRecord>> {
    hits.fetch_add(1, Ordering::SeqCst);
    Json(ApiResponse::ok(AgentRecord::new(repo, name, AgentType::Worker)))
}

#[tokio::test]
async fn test_agent_reads_are_cached_until_ttl() {
    let hits = Arc::new(AtomicUsize::new(0));
    let router = Router::new()
        .route("/api/v1/agents/:repo/:name", get(counted_get_agent))
        .with_state(hits.clone());
    let (base, cancel) = serve_mock(router).await;

    let client =
        CoordinatorClient::new(ClientConfig::new(&base).with_cache_ttl(Duration::from_millis(200)))
            .unwrap();

    let first = client.get_agent("acme/api", "w1").await.unwrap();
    assert_eq!(first.repo, "acme/api");
    client.get_agent("acme/api", "w1").await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(client.cache_stats().hits, 1);

    tokio::time::sleep(Duration::from_millis(300)).await;
    client.get_agent("acme/api", "w1").await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    client.clear_cache();
    client.get_agent("acme/api", "w1").await.unwrap();
    assert_eq!(hits.load(Ordering::SeqCst), 3);

    cancel.cancel();
}

// ============================================================================
// Error mapping
// ============================================================================

#[tokio::test]
async fn test_non_envelope_error_body_maps_to_http_code() {
    let router = Router::new().route(
        "/api/v1/stats",
        get(|| async { (StatusCode::BAD_GATEWAY, "upstream gone") }),
    );
    let (base, cancel) = serve_mock(router).await;
    let client = CoordinatorClient::new(ClientConfig::new(&base)).unwrap();

    let err = client.stats().await.unwrap_err();
    match err {
        ClientError::Api {
            status,
            code,
            message,
            ..
        } => {
            assert_eq!(status, 502);
            assert_eq!(code, "HTTP_502");
            assert_eq!(message, "upstream gone");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    cancel.cancel();
}

#[tokio::test]
async fn test_success_without_data_is_decode_error() {
    let router = Router::new().route(
        "/api/v1/health",
        get(|| async { Json(serde_json::json!({ "success": true })) }),
    );
    let (base, cancel) = serve_mock(router).await;
    let client = CoordinatorClient::new(ClientConfig::new(&base)).unwrap();

    let err = client.health().await.unwrap_err();
    assert!(matches!(err, ClientError::Decode { .. }), "{err:?}");
    cancel.cancel();
}

#[tokio::test]
async fn test_unreachable_coordinator_is_transport_error() {
    let client = CoordinatorClient::new(
        ClientConfig::new("http://127.0.0.1:1").with_timeout(Duration::from_millis(500)),
    )
    .unwrap();
    let err = client.health().await.unwrap_err();
    assert!(matches!(err, ClientError::Transport { .. }), "{err:?}");
    assert!(!err.is_not_found());
}

#[tokio::test]
async fn test_coordinator_errors_carry_codes() {
    let coord = Coordinator::start().await;

    let anonymous = CoordinatorClient::new(ClientConfig::new(&coord.base)).unwrap();
    let err = anonymous.stats().await.unwrap_err();
    assert_eq!(err.code(), Some("UNAUTHORIZED"));
    // Health stays open.
    assert_eq!(anonymous.health().await.unwrap().status, "ok");

    let client = coord.client();
    let err = client.get_task(&"missing".into()).await.unwrap_err();
    assert!(err.is_not_found());

    let err = client
        .create_task(&CreateTaskRequest::new("", "no repo"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some("MISSING_FIELD"));
}

// ============================================================================
// Hybrid registry
// ============================================================================

fn unreachable_remote() -> Arc<CoordinatorClient> {
    Arc::new(
        CoordinatorClient::new(
            ClientConfig::new("http://127.0.0.1:1").with_timeout(Duration::from_millis(500)),
        )
        .unwrap(),
    )
}

#[tokio::test]
async fn test_hybrid_falls_back_when_remote_unreachable() {
    let local = Arc::new(LocalAgentStore::new());
    let registry = HybridRegistry::new(local.clone(), Some(unreachable_remote()), HybridConfig::default());

    registry
        .register(AgentRecord::new("acme/api", "w1", AgentType::Worker))
        .await
        .unwrap();
    let agent = registry.get("acme/api", "w1").await.unwrap();
    assert_eq!(agent.name, "w1");

    let agents = registry.list(Some("acme/api")).await.unwrap();
    assert_eq!(agents.len(), 1);

    let working = registry
        .update_status("acme/api", "w1", AgentStatus::Working)
        .await
        .unwrap();
    assert_eq!(working.status, AgentStatus::Working);
    registry.unregister("acme/api", "w1").await.unwrap();
    assert!(local.get("acme/api", "w1").await.is_err());
}

#[tokio::test]
async fn test_hybrid_without_fallback_surfaces_remote_error() {
    let local = Arc::new(LocalAgentStore::new());
    let registry = HybridRegistry::new(
        local.clone(),
        Some(unreachable_remote()),
        HybridConfig {
            enabled: true,
            fallback_to_local: false,
        },
    );

    let err = registry
        .register(AgentRecord::new("acme/api", "w1", AgentType::Worker))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Transport { .. }), "{err:?}");
    assert!(local.get("acme/api", "w1").await.is_ok());
}

#[tokio::test]
async fn test_hybrid_merges_with_live_coordinator() {
    let coord = Coordinator::start().await;
    let remote = Arc::new(coord.client());
    remote
        .register_agent(AgentRecord::new("acme/api", "supervisor", AgentType::Supervisor))
        .await
        .unwrap();

    let local = Arc::new(LocalAgentStore::new());
    local
        .register(AgentRecord::new("acme/api", "scratch", AgentType::Workspace))
        .await
        .unwrap();

    let registry = HybridRegistry::new(local, Some(remote), HybridConfig::default());
    registry
        .register(AgentRecord::new("acme/api", "w1", AgentType::Worker))
        .await
        .unwrap();

    let names: Vec<String> = registry
        .list(Some("acme/api"))
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.name)
        .collect();
    assert_eq!(names, vec!["scratch", "supervisor", "w1"]);
}

// ============================================================================
// End to end
// ============================================================================

#[tokio::test]
async fn test_end_to_end_task_lifecycle() {
    let coord = Coordinator::start().await;
    let client = coord.client();

    let reg = client
        .register_node(&RegisterRequest::new("n1", "n1.local", 5))
        .await
        .unwrap();
    assert_eq!(reg.heartbeat_interval_secs, 30);

    let node = client
        .heartbeat(&HeartbeatRequest::new(reg.registration_id.clone()))
        .await
        .unwrap();
    assert_eq!(node.id.as_str(), "n1");
    assert_eq!(client.list_nodes(Some("online"), &HashMap::new()).await.unwrap().len(), 1);

    let task = client
        .create_task(&CreateTaskRequest::new("acme/api", "fix bug").with_priority(Priority::High))
        .await
        .unwrap();
    assert_eq!(task.status, TaskStatus::Pending);

    let pending = client.pending_tasks(&HashMap::new()).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, task.id);

    let claim = client
        .claim_task(&task.id, &reg.registration_id, "w1")
        .await
        .unwrap();
    assert!(claim.claimed);

    let second = client
        .claim_task(&task.id, &reg.registration_id, "w2")
        .await
        .unwrap();
    assert!(!second.claimed);
    assert!(second.error.unwrap().contains("already claimed"));

    client
        .update_task(&task.id, &UpdateTaskRequest::status(TaskStatus::Running))
        .await
        .unwrap();
    let done = client
        .update_task(
            &task.id,
            &UpdateTaskRequest::status(TaskStatus::Completed).with_result(TaskResult {
                success: true,
                pr_number: Some(42),
                ..TaskResult::default()
            }),
        )
        .await
        .unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(done.result.unwrap().pr_number, Some(42));

    let stats = client.stats().await.unwrap();
    assert_eq!(stats.tasks.completed, 1);
    assert_eq!(stats.tasks.pending, 0);

    let state = client.repo_state("acme/api").await.unwrap();
    assert_eq!(state.pending_tasks, 0);

    let gone = client.unregister_node(&reg.registration_id).await.unwrap();
    assert_eq!(gone.node_id.as_str(), "n1");
}

#[tokio::test]
async fn test_agent_operations_against_coordinator() {
    let coord = Coordinator::start().await;
    let client = coord.client();

    let agent = client
        .register_agent(AgentRecord::new("acme/api", "w1", AgentType::Worker))
        .await
        .unwrap();
    assert!(agent.registered_at.is_some());

    // Served from the cache populated by register.
    client.get_agent("acme/api", "w1").await.unwrap();
    assert_eq!(client.cache_stats().hits, 1);

    let working = client
        .update_agent_status("acme/api", "w1", AgentStatus::Working)
        .await
        .unwrap();
    assert_eq!(working.status, AgentStatus::Working);
    assert_eq!(
        client.get_agent("acme/api", "w1").await.unwrap().status,
        AgentStatus::Working
    );

    client.agent_heartbeat("acme/api", "w1").await.unwrap();
    assert_eq!(client.list_agents(Some("acme/api")).await.unwrap().len(), 1);

    client.unregister_agent("acme/api", "w1").await.unwrap();
    let err = client.get_agent("acme/api", "w1").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_messages_and_release() {
    let coord = Coordinator::start().await;
    let client = coord.client();

    let routed = client
        .send_message(&MessageRequest {
            from: "supervisor".to_string(),
            to: "w1".to_string(),
            repo: Some("acme/api".to_string()),
            body: "rebase please".to_string(),
        })
        .await
        .unwrap();
    assert!(routed.routed);
    assert!(client.list_messages().await.unwrap().is_empty());

    let reg = client
        .register_node(&RegisterRequest::new("n1", "n1.local", 2))
        .await
        .unwrap();
    let task = client
        .create_task(&CreateTaskRequest::new("acme/api", "flaky test"))
        .await
        .unwrap();
    client
        .claim_task(&task.id, &reg.registration_id, "w1")
        .await
        .unwrap();
    let released = client.release_task(&task.id).await.unwrap();
    assert_eq!(released.status, TaskStatus::Pending);
    assert!(released.claimed_by.is_none());

    let deleted = client.delete_task(&task.id).await.unwrap();
    assert_eq!(deleted.id, task.id);
    assert!(client.list_tasks(None).await.unwrap().is_empty());
}

//! HTTP client for the coordinator API.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Method, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use taskmesh_core::api::{
    AgentStatusUpdate, ApiResponse, ClaimRequest, ClaimResponse, HealthResponse, Message, MessageRequest,
    MessageResponse, RepoStateResponse, StatsResponse, UnregisterResponse,
};
use taskmesh_core::{
    AgentRecord, AgentStatus, CreateTaskRequest, HeartbeatRequest, Node, NodeId, RegisterRequest,
    RegisterResponse, RegistrationId, Task, TaskId, TaskStatus, UpdateTaskRequest,
};

use crate::cache::{AgentCache, CacheStats};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::store::AgentStore;

/// Client for one coordinator.
///
/// Agent reads go through a TTL cache; agent writes refresh it.
pub struct CoordinatorClient {
    http: reqwest::Client,
    base: Url,
    token: Option<String>,
    cache: AgentCache,
}

impl CoordinatorClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| ClientError::InvalidUrl(format!("{}: {e}", config.base_url)))?;
        if base.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(config.base_url));
        }
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|source| ClientError::Transport {
                operation: "build client",
                source,
            })?;

        Ok(Self {
            http,
            base,
            token: config.token,
            cache: AgentCache::new(config.cache_ttl),
        })
    }

    /// Build `base/<segments...>`, percent-encoding each segment so repo
    /// names containing `/` stay a single segment.
    fn url(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, ClientError> {
        let url = self.url(segments)?;
        debug!(%method, %url, "Coordinator request");
        let req = self.http.request(method, url);
        Ok(match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        })
    }

    /// Send a request and unwrap the response envelope.
    async fn send<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        req: RequestBuilder,
    ) -> Result<T, ClientError> {
        let resp = req
            .send()
            .await
            .map_err(|source| ClientError::Transport { operation, source })?;
        let status = resp.status();
        let bytes = resp
            .bytes()
            .await
            .map_err(|source| ClientError::Transport { operation, source })?;

        let envelope: ApiResponse<T> = match serde_json::from_slice(&bytes) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(ClientError::Api {
                    operation,
                    status: status.as_u16(),
                    code: format!("HTTP_{}", status.as_u16()),
                    message: String::from_utf8_lossy(&bytes).trim().to_string(),
                });
            }
            Err(e) => {
                return Err(ClientError::Decode {
                    operation,
                    message: e.to_string(),
                });
            }
        };

        if !status.is_success() || !envelope.success {
            return Err(ClientError::Api {
                operation,
                status: status.as_u16(),
                code: envelope.code.unwrap_or_else(|| "UNKNOWN".to_string()),
                message: envelope
                    .error
                    .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string()),
            });
        }
        envelope.data.ok_or_else(|| ClientError::Decode {
            operation,
            message: "success envelope without data".to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        segments: &[&str],
    ) -> Result<T, ClientError> {
        self.send(operation, self.request(Method::GET, segments)?).await
    }

    async fn send_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        operation: &'static str,
        method: Method,
        segments: &[&str],
        body: &B,
    ) -> Result<T, ClientError> {
        self.send(operation, self.request(method, segments)?.json(body))
            .await
    }

    // ========================================================================
    // Health and aggregates
    // ========================================================================

    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        self.get_json("health", &["api", "v1", "health"]).await
    }

    pub async fn stats(&self) -> Result<StatsResponse, ClientError> {
        self.get_json("stats", &["api", "v1", "stats"]).await
    }

    pub async fn repo_state(&self, repo: &str) -> Result<RepoStateResponse, ClientError> {
        self.get_json("repo state", &["api", "v1", "state", repo]).await
    }

    // ========================================================================
    // Nodes
    // ========================================================================

    pub async fn register_node(&self, req: &RegisterRequest) -> Result<RegisterResponse, ClientError> {
        self.send_json("register node", Method::POST, &["api", "v1", "register"], req)
            .await
    }

    pub async fn unregister_node(
        &self,
        registration_id: &RegistrationId,
    ) -> Result<UnregisterResponse, ClientError> {
        let req = self.request(
            Method::DELETE,
            &["api", "v1", "register", registration_id.as_str()],
        )?;
        self.send("unregister node", req).await
    }

    pub async fn heartbeat(&self, req: &HeartbeatRequest) -> Result<Node, ClientError> {
        self.send_json("heartbeat", Method::POST, &["api", "v1", "heartbeat"], req)
            .await
    }

    /// List nodes, optionally by `status` (`online`, `available`, ...) and
    /// required labels.
    pub async fn list_nodes(
        &self,
        status: Option<&str>,
        labels: &HashMap<String, String>,
    ) -> Result<Vec<Node>, ClientError> {
        let mut query = label_query(labels);
        if let Some(status) = status {
            query.push(("status", status.to_string()));
        }
        let req = self
            .request(Method::GET, &["api", "v1", "nodes"])?
            .query(&query);
        self.send("list nodes", req).await
    }

    pub async fn get_node(&self, node_id: &NodeId) -> Result<Node, ClientError> {
        self.get_json("get node", &["api", "v1", "nodes", node_id.as_str()])
            .await
    }

    // ========================================================================
    // Tasks
    // ========================================================================

    pub async fn create_task(&self, req: &CreateTaskRequest) -> Result<Task, ClientError> {
        self.send_json("create task", Method::POST, &["api", "v1", "tasks"], req)
            .await
    }

    pub async fn list_tasks(&self, status: Option<TaskStatus>) -> Result<Vec<Task>, ClientError> {
        let mut req = self.request(Method::GET, &["api", "v1", "tasks"])?;
        if let Some(status) = status {
            req = req.query(&[("status", status.as_str())]);
        }
        self.send("list tasks", req).await
    }

    pub async fn pending_tasks(
        &self,
        labels: &HashMap<String, String>,
    ) -> Result<Vec<Task>, ClientError> {
        let req = self
            .request(Method::GET, &["api", "v1", "tasks", "pending"])?
            .query(&label_query(labels));
        self.send("pending tasks", req).await
    }

    pub async fn get_task(&self, id: &TaskId) -> Result<Task, ClientError> {
        self.get_json("get task", &["api", "v1", "tasks", id.as_str()])
            .await
    }

    pub async fn update_task(
        &self,
        id: &TaskId,
        req: &UpdateTaskRequest,
    ) -> Result<Task, ClientError> {
        self.send_json(
            "update task",
            Method::PUT,
            &["api", "v1", "tasks", id.as_str()],
            req,
        )
        .await
    }

    pub async fn delete_task(&self, id: &TaskId) -> Result<Task, ClientError> {
        let req = self.request(Method::DELETE, &["api", "v1", "tasks", id.as_str()])?;
        self.send("delete task", req).await
    }

    /// Try to claim a task. Losing the race is `Ok` with `claimed == false`.
    pub async fn claim_task(
        &self,
        id: &TaskId,
        registration_id: &RegistrationId,
        worker_name: &str,
    ) -> Result<ClaimResponse, ClientError> {
        let body = ClaimRequest {
            registration_id: registration_id.clone(),
            worker_name: worker_name.to_string(),
        };
        self.send_json(
            "claim task",
            Method::POST,
            &["api", "v1", "tasks", id.as_str(), "claim"],
            &body,
        )
        .await
    }

    pub async fn release_task(&self, id: &TaskId) -> Result<Task, ClientError> {
        let req = self.request(
            Method::POST,
            &["api", "v1", "tasks", id.as_str(), "release"],
        )?;
        self.send("release task", req).await
    }

    // ========================================================================
    // Messages
    // ========================================================================

    pub async fn send_message(&self, msg: &MessageRequest) -> Result<MessageResponse, ClientError> {
        self.send_json("send message", Method::POST, &["api", "v1", "messages"], msg)
            .await
    }

    pub async fn list_messages(&self) -> Result<Vec<Message>, ClientError> {
        self.get_json("list messages", &["api", "v1", "messages"]).await
    }

    // ========================================================================
    // Agents
    // ========================================================================

    pub async fn register_agent(&self, mut agent: AgentRecord) -> Result<AgentRecord, ClientError> {
        agent.fill_defaults(Utc::now());
        let stored: AgentRecord = self
            .send_json("register agent", Method::POST, &["api", "v1", "agents"], &agent)
            .await?;
        self.cache.put(stored.clone());
        Ok(stored)
    }

    pub async fn unregister_agent(&self, repo: &str, name: &str) -> Result<(), ClientError> {
        let req = self.request(Method::DELETE, &["api", "v1", "agents", repo, name])?;
        let result = self.send::<AgentRecord>("unregister agent", req).await;
        // Drop the entry either way; a 404 means it is gone remotely too.
        self.cache.remove(repo, name);
        result.map(|_| ())
    }

    /// Cached copy if fresh, otherwise fetched and cached.
    pub async fn get_agent(&self, repo: &str, name: &str) -> Result<AgentRecord, ClientError> {
        if let Some(agent) = self.cache.get(repo, name) {
            return Ok(agent);
        }
        let agent: AgentRecord = self
            .get_json("get agent", &["api", "v1", "agents", repo, name])
            .await?;
        self.cache.put(agent.clone());
        Ok(agent)
    }

    /// Always fetched; refreshes the cache with every returned record.
    pub async fn list_agents(&self, repo: Option<&str>) -> Result<Vec<AgentRecord>, ClientError> {
        let mut req = self.request(Method::GET, &["api", "v1", "agents"])?;
        if let Some(repo) = repo {
            req = req.query(&[("repo", repo)]);
        }
        let agents: Vec<AgentRecord> = self.send("list agents", req).await?;
        self.cache.put_all(&agents);
        Ok(agents)
    }

    pub async fn update_agent_status(
        &self,
        repo: &str,
        name: &str,
        status: AgentStatus,
    ) -> Result<AgentRecord, ClientError> {
        let agent: AgentRecord = self
            .send_json(
                "update agent status",
                Method::PUT,
                &["api", "v1", "agents", repo, name, "status"],
                &AgentStatusUpdate { status },
            )
            .await?;
        self.cache.put(agent.clone());
        Ok(agent)
    }

    pub async fn agent_heartbeat(&self, repo: &str, name: &str) -> Result<AgentRecord, ClientError> {
        let req = self.request(
            Method::POST,
            &["api", "v1", "agents", repo, name, "heartbeat"],
        )?;
        let agent: AgentRecord = self.send("agent heartbeat", req).await?;
        self.cache.put(agent.clone());
        Ok(agent)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}

fn label_query(labels: &HashMap<String, String>) -> Vec<(&'static str, String)> {
    let mut pairs: Vec<(&'static str, String)> = labels
        .iter()
        .map(|(k, v)| ("label", format!("{k}:{v}")))
        .collect();
    pairs.sort();
    pairs
}

#[async_trait]
impl AgentStore for CoordinatorClient {
    async fn register(&self, agent: AgentRecord) -> Result<AgentRecord, ClientError> {
        self.register_agent(agent).await
    }

    async fn unregister(&self, repo: &str, name: &str) -> Result<(), ClientError> {
        self.unregister_agent(repo, name).await
    }

    async fn get(&self, repo: &str, name: &str) -> Result<AgentRecord, ClientError> {
        self.get_agent(repo, name).await
    }

    async fn list(&self, repo: Option<&str>) -> Result<Vec<AgentRecord>, ClientError> {
        self.list_agents(repo).await
    }

    async fn update_status(
        &self,
        repo: &str,
        name: &str,
        status: AgentStatus,
    ) -> Result<AgentRecord, ClientError> {
        self.update_agent_status(repo, name, status).await
    }

    async fn heartbeat(&self, repo: &str, name: &str) -> Result<AgentRecord, ClientError> {
        self.agent_heartbeat(repo, name).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> CoordinatorClient {
        CoordinatorClient::new(ClientConfig::new(base)).unwrap()
    }

    #[test]
    fn test_url_encodes_slashed_repo() {
        let c = client("http://127.0.0.1:7331");
        let url = c.url(&["api", "v1", "agents", "acme/api", "sup"]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:7331/api/v1/agents/acme%2Fapi/sup");
    }

    #[test]
    fn test_url_keeps_base_path() {
        let c = client("http://coord.local/mesh/");
        let url = c.url(&["api", "v1", "health"]).unwrap();
        assert_eq!(url.as_str(), "http://coord.local/mesh/api/v1/health");
    }

    #[test]
    fn test_rejects_bad_base_url() {
        let err = CoordinatorClient::new(ClientConfig::new("not a url")).err().unwrap();
        assert!(matches!(err, ClientError::InvalidUrl(_)));
        let err = CoordinatorClient::new(ClientConfig::new("mailto:x@y")).err().unwrap();
        assert!(matches!(err, ClientError::InvalidUrl(_)));
    }

    #[test]
    fn test_label_query_is_sorted() {
        let labels: HashMap<String, String> = [("zone", "eu"), ("os", "linux")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(
            label_query(&labels),
            vec![
                ("label", "os:linux".to_string()),
                ("label", "zone:eu".to_string())
            ]
        );
    }
}

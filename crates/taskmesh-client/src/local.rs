//! In-process agent store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use taskmesh_core::{AgentRecord, AgentStatus};

use crate::error::ClientError;
use crate::store::AgentStore;

/// Agents kept in this process only.
#[derive(Default)]
pub struct LocalAgentStore {
    agents: RwLock<HashMap<(String, String), AgentRecord>>,
}

impl LocalAgentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn not_found(repo: &str, name: &str) -> ClientError {
    ClientError::NotFound(format!("agent {repo}/{name}"))
}

fn key(repo: &str, name: &str) -> (String, String) {
    (repo.to_string(), name.to_string())
}

#[async_trait]
impl AgentStore for LocalAgentStore {
    async fn register(&self, mut agent: AgentRecord) -> Result<AgentRecord, ClientError> {
        agent.fill_defaults(Utc::now());
        debug!(repo = %agent.repo, agent = %agent.name, "Registering agent locally");
        self.agents.write().await.insert(agent.key(), agent.clone());
        Ok(agent)
    }

    async fn unregister(&self, repo: &str, name: &str) -> Result<(), ClientError> {
        self.agents
            .write()
            .await
            .remove(&key(repo, name))
            .map(|_| ())
            .ok_or_else(|| not_found(repo, name))
    }

    async fn get(&self, repo: &str, name: &str) -> Result<AgentRecord, ClientError> {
        self.agents
            .read()
            .await
            .get(&key(repo, name))
            .cloned()
            .ok_or_else(|| not_found(repo, name))
    }

    async fn list(&self, repo: Option<&str>) -> Result<Vec<AgentRecord>, ClientError> {
        let agents = self.agents.read().await;
        let mut found: Vec<AgentRecord> = agents
            .values()
            .filter(|a| repo.map_or(true, |r| a.repo == r))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.key().cmp(&b.key()));
        Ok(found)
    }

    async fn update_status(
        &self,
        repo: &str,
        name: &str,
        status: AgentStatus,
    ) -> Result<AgentRecord, ClientError> {
        let mut agents = self.agents.write().await;
        let agent = agents
            .get_mut(&key(repo, name))
            .ok_or_else(|| not_found(repo, name))?;
        agent.status = status;
        agent.last_heartbeat = Some(Utc::now());
        Ok(agent.clone())
    }

    async fn heartbeat(&self, repo: &str, name: &str) -> Result<AgentRecord, ClientError> {
        let mut agents = self.agents.write().await;
        let agent = agents
            .get_mut(&key(repo, name))
            .ok_or_else(|| not_found(repo, name))?;
        agent.last_heartbeat = Some(Utc::now());
        Ok(agent.clone())
    }
}

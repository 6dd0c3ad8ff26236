//! Server-side agent directory keyed by `(repo, name)`.

use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use taskmesh_core::{AgentRecord, AgentStatus, CoreError};

type AgentKey = (String, String);

/// Registered agents across all repositories.
#[derive(Default)]
pub struct AgentDirectory {
    agents: RwLock<HashMap<AgentKey, AgentRecord>>,
}

impl AgentDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an agent.
    ///
    /// Missing timestamps and ownership are filled in. Replacing an existing
    /// record keeps its original `registered_at`.
    pub async fn register(&self, mut agent: AgentRecord) -> Result<AgentRecord, CoreError> {
        if agent.repo.trim().is_empty() {
            return Err(CoreError::MissingField("repo"));
        }
        if agent.name.trim().is_empty() {
            return Err(CoreError::MissingField("name"));
        }

        let mut agents = self.agents.write().await;
        if let Some(existing) = agents.get(&agent.key()) {
            agent.registered_at = existing.registered_at;
        }
        agent.fill_defaults(Utc::now());

        info!(
            repo = %agent.repo,
            agent = %agent.name,
            agent_type = %agent.agent_type,
            "Agent registered"
        );
        agents.insert(agent.key(), agent.clone());
        Ok(agent)
    }

    pub async fn unregister(&self, repo: &str, name: &str) -> Result<AgentRecord, CoreError> {
        let removed = self
            .agents
            .write()
            .await
            .remove(&key(repo, name))
            .ok_or_else(|| not_found(repo, name))?;
        info!(repo, agent = name, "Agent unregistered");
        Ok(removed)
    }

    pub async fn get(&self, repo: &str, name: &str) -> Result<AgentRecord, CoreError> {
        self.agents
            .read()
            .await
            .get(&key(repo, name))
            .cloned()
            .ok_or_else(|| not_found(repo, name))
    }

    /// Agents sorted by `(repo, name)`, optionally restricted to one repo.
    pub async fn list(&self, repo: Option<&str>) -> Vec<AgentRecord> {
        let agents = self.agents.read().await;
        let mut found: Vec<AgentRecord> = agents
            .values()
            .filter(|a| repo.map_or(true, |r| a.repo == r))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.repo.cmp(&b.repo).then_with(|| a.name.cmp(&b.name)));
        found
    }

    pub async fn update_status(
        &self,
        repo: &str,
        name: &str,
        status: AgentStatus,
    ) -> Result<AgentRecord, CoreError> {
        let mut agents = self.agents.write().await;
        let agent = agents
            .get_mut(&key(repo, name))
            .ok_or_else(|| not_found(repo, name))?;
        agent.status = status;
        agent.last_heartbeat = Some(Utc::now());
        debug!(repo, agent = name, ?status, "Agent status updated");
        Ok(agent.clone())
    }

    pub async fn heartbeat(&self, repo: &str, name: &str) -> Result<AgentRecord, CoreError> {
        let mut agents = self.agents.write().await;
        let agent = agents
            .get_mut(&key(repo, name))
            .ok_or_else(|| not_found(repo, name))?;
        agent.last_heartbeat = Some(Utc::now());
        Ok(agent.clone())
    }

    pub async fn len(&self) -> usize {
        self.agents.read().await.len()
    }
}

fn key(repo: &str, name: &str) -> AgentKey {
    (repo.to_string(), name.to_string())
}

fn not_found(repo: &str, name: &str) -> CoreError {
    CoreError::AgentNotFound {
        repo: repo.to_string(),
        name: name.to_string(),
    }
}

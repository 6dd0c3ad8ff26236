//! Agent store that combines a local store with an optional remote one.
//!
//! Writes always land locally first. Reads prefer the remote view. With
//! `fallback_to_local` set, a failing remote never fails the call as long as
//! the local store can answer.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use taskmesh_core::{AgentRecord, AgentStatus};

use crate::error::ClientError;
use crate::store::AgentStore;

/// Remote usage policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HybridConfig {
    /// Mirror writes to, and read from, the remote store.
    pub enabled: bool,
    /// Answer from the local store when the remote fails.
    pub fallback_to_local: bool,
}

impl Default for HybridConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            fallback_to_local: true,
        }
    }
}

pub struct HybridRegistry {
    local: Arc<dyn AgentStore>,
    remote: Option<Arc<dyn AgentStore>>,
    config: HybridConfig,
}

impl HybridRegistry {
    pub fn new(
        local: Arc<dyn AgentStore>,
        remote: Option<Arc<dyn AgentStore>>,
        config: HybridConfig,
    ) -> Self {
        Self {
            local,
            remote,
            config,
        }
    }

    /// A registry with no remote; every call is answered locally.
    pub fn local_only(local: Arc<dyn AgentStore>) -> Self {
        Self::new(
            local,
            None,
            HybridConfig {
                enabled: false,
                fallback_to_local: true,
            },
        )
    }

    pub fn config(&self) -> HybridConfig {
        self.config
    }

    fn remote(&self) -> Option<&Arc<dyn AgentStore>> {
        if self.config.enabled {
            self.remote.as_ref()
        } else {
            None
        }
    }

    /// Combine a local write with its remote mirror.
    ///
    /// A local "not found" is tolerated when a remote exists: the record may
    /// only be known remotely.
    fn merge_write<T>(
        &self,
        operation: &str,
        local: Result<T, ClientError>,
        remote: Option<Result<T, ClientError>>,
    ) -> Result<T, ClientError> {
        match remote {
            None => local,
            Some(Ok(value)) => match local {
                Err(e) if !e.is_not_found() => Err(e),
                _ => Ok(value),
            },
            Some(Err(e)) if self.config.fallback_to_local => {
                warn!(operation, error = %e, "Remote agent store failed, keeping local result");
                local
            }
            Some(Err(e)) => Err(e),
        }
    }

    /// Run a read against the remote, falling back to local if allowed.
    async fn read_fallback<T>(
        &self,
        operation: &str,
        remote: Result<T, ClientError>,
        local: impl std::future::Future<Output = Result<T, ClientError>> + Send,
    ) -> Result<T, ClientError> {
        match remote {
            Ok(value) => Ok(value),
            Err(e) if self.config.fallback_to_local => {
                debug!(operation, error = %e, "Remote read failed, falling back to local");
                local.await
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl AgentStore for HybridRegistry {
    async fn register(&self, agent: AgentRecord) -> Result<AgentRecord, ClientError> {
        let local = self.local.register(agent).await?;
        let Some(remote) = self.remote() else {
            return Ok(local);
        };
        let mirrored = remote.register(local.clone()).await;
        self.merge_write("register", Ok(local), Some(mirrored))
    }

    async fn unregister(&self, repo: &str, name: &str) -> Result<(), ClientError> {
        let local = self.local.unregister(repo, name).await;
        let Some(remote) = self.remote() else {
            return local;
        };
        if let Err(e) = &local {
            if !e.is_not_found() {
                return local;
            }
        }
        let mirrored = remote.unregister(repo, name).await;
        self.merge_write("unregister", local, Some(mirrored))
    }

    async fn get(&self, repo: &str, name: &str) -> Result<AgentRecord, ClientError> {
        let Some(remote) = self.remote() else {
            return self.local.get(repo, name).await;
        };
        let result = remote.get(repo, name).await;
        self.read_fallback("get", result, self.local.get(repo, name))
            .await
    }

    /// Local and remote agents merged by `(repo, name)`; remote entries win.
    async fn list(&self, repo: Option<&str>) -> Result<Vec<AgentRecord>, ClientError> {
        let local = self.local.list(repo).await?;
        let Some(remote) = self.remote() else {
            return Ok(local);
        };
        let remote_agents = match remote.list(repo).await {
            Ok(agents) => agents,
            Err(e) if self.config.fallback_to_local => {
                debug!(error = %e, "Remote list failed, returning local agents");
                return Ok(local);
            }
            Err(e) => return Err(e),
        };

        let mut merged: HashMap<(String, String), AgentRecord> =
            local.into_iter().map(|a| (a.key(), a)).collect();
        for agent in remote_agents {
            merged.insert(agent.key(), agent);
        }
        let mut agents: Vec<AgentRecord> = merged.into_values().collect();
        agents.sort_by(|a, b| (&a.repo, &a.name).cmp(&(&b.repo, &b.name)));
        Ok(agents)
    }

    async fn update_status(
        &self,
        repo: &str,
        name: &str,
        status: AgentStatus,
    ) -> Result<AgentRecord, ClientError> {
        let local = self.local.update_status(repo, name, status).await;
        let Some(remote) = self.remote() else {
            return local;
        };
        if let Err(e) = &local {
            if !e.is_not_found() {
                return local;
            }
        }
        let mirrored = remote.update_status(repo, name, status).await;
        self.merge_write("update_status", local, Some(mirrored))
    }

    async fn heartbeat(&self, repo: &str, name: &str) -> Result<AgentRecord, ClientError> {
        let local = self.local.heartbeat(repo, name).await;
        let Some(remote) = self.remote() else {
            return local;
        };
        if let Err(e) = &local {
            if !e.is_not_found() {
                return local;
            }
        }
        let mirrored = remote.heartbeat(repo, name).await;
        self.merge_write("heartbeat", local, Some(mirrored))
    }
}

//! Agent store abstraction shared by the local, remote and hybrid stores.

use async_trait::async_trait;

use taskmesh_core::{AgentRecord, AgentStatus};

use crate::error::ClientError;

/// Keyed storage of agent records.
///
/// Lookups of an unknown `(repo, name)` fail with an error for which
/// [`ClientError::is_not_found`] is true.
#[async_trait]
pub trait AgentStore: Send + Sync {
    /// Insert or replace an agent, filling timestamps and ownership.
    async fn register(&self, agent: AgentRecord) -> Result<AgentRecord, ClientError>;

    async fn unregister(&self, repo: &str, name: &str) -> Result<(), ClientError>;

    async fn get(&self, repo: &str, name: &str) -> Result<AgentRecord, ClientError>;

    /// All agents, or only those of `repo`.
    async fn list(&self, repo: Option<&str>) -> Result<Vec<AgentRecord>, ClientError>;

    async fn update_status(
        &self,
        repo: &str,
        name: &str,
        status: AgentStatus,
    ) -> Result<AgentRecord, ClientError>;

    async fn heartbeat(&self, repo: &str, name: &str) -> Result<AgentRecord, ClientError>;
}

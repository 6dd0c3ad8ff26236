//! Agent records and ownership tiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{NodeId, TaskId};

/// Kind of agent a participant runs.
///
/// Unrecognised type strings deserialize to [`AgentType::Unknown`] instead
/// of failing, and get the most aggressive cleanup tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentType {
    /// Long-lived coordinator of a repository.
    Supervisor,
    /// Long-lived merge gatekeeper of a repository.
    MergeQueue,
    /// Interactive session owned by a human user.
    Workspace,
    /// Ephemeral executor of a single task.
    #[default]
    Worker,
    /// Ephemeral reviewer of a single change.
    Review,
    #[serde(other)]
    Unknown,
}

impl AgentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Supervisor => "supervisor",
            Self::MergeQueue => "merge-queue",
            Self::Workspace => "workspace",
            Self::Worker => "worker",
            Self::Review => "review",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How long-lived a participant is, and so how aggressively it may be
/// cleaned up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnershipLevel {
    /// Lives as long as the repository is tracked.
    Repo,
    /// Lives as long as its user keeps it.
    User,
    /// Lives as long as its task.
    Task,
}

impl OwnershipLevel {
    /// Ownership tier implied by an agent type.
    pub fn for_agent_type(agent_type: AgentType) -> Self {
        match agent_type {
            AgentType::Supervisor | AgentType::MergeQueue => Self::Repo,
            AgentType::Workspace => Self::User,
            AgentType::Worker | AgentType::Review | AgentType::Unknown => Self::Task,
        }
    }
}

/// Lifecycle status of an agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    #[default]
    Starting,
    Working,
    Idle,
    Stopped,
}

/// A registered agent, keyed by `(repo, name)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub repo: String,
    pub name: String,
    #[serde(default)]
    pub agent_type: AgentType,
    #[serde(default)]
    pub status: AgentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ownership: Option<OwnershipLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worktree: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registered_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl AgentRecord {
    pub fn new(repo: impl Into<String>, name: impl Into<String>, agent_type: AgentType) -> Self {
        Self {
            repo: repo.into(),
            name: name.into(),
            agent_type,
            status: AgentStatus::default(),
            ownership: None,
            node_id: None,
            task_id: None,
            pid: None,
            worktree: None,
            registered_at: None,
            last_heartbeat: None,
        }
    }

    /// Cache/map key.
    pub fn key(&self) -> (String, String) {
        (self.repo.clone(), self.name.clone())
    }

    /// Explicit ownership if set, otherwise the tier implied by the type.
    pub fn effective_ownership(&self) -> OwnershipLevel {
        self.ownership
            .unwrap_or_else(|| OwnershipLevel::for_agent_type(self.agent_type))
    }

    /// Fill timestamps and ownership the caller left out.
    pub fn fill_defaults(&mut self, now: DateTime<Utc>) {
        self.registered_at.get_or_insert(now);
        self.last_heartbeat.get_or_insert(now);
        if self.ownership.is_none() {
            self.ownership = Some(OwnershipLevel::for_agent_type(self.agent_type));
        }
    }
}

//! Wire types shared by the coordinator's HTTP API and its clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AgentRecord, AgentStatus, Node, NodeId, RegistrationId, Task};

// ============================================================================
// Envelope
// ============================================================================

/// Envelope wrapping every API response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            code: None,
        }
    }

    pub fn err(code: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            code: Some(code.into()),
        }
    }
}

// ============================================================================
// Health and stats
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

/// Node counts and aggregate capacity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub total: usize,
    pub online: usize,
    pub offline: usize,
    pub draining: usize,
    pub total_capacity: u64,
    pub used_capacity: u64,
}

/// Task counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStats {
    pub total: usize,
    pub pending: usize,
    pub claimed: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub orphaned: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsResponse {
    pub nodes: RegistryStats,
    pub tasks: TaskStats,
    pub event_subscribers: usize,
}

/// Aggregate view of one repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoStateResponse {
    pub repo: String,
    pub agents: Vec<AgentRecord>,
    pub nodes: Vec<Node>,
    pub pending_tasks: usize,
}

// ============================================================================
// Nodes
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnregisterResponse {
    pub node_id: NodeId,
    pub registration_id: RegistrationId,
}

// ============================================================================
// Tasks
// ============================================================================

/// Body of `POST /api/v1/tasks/{id}/claim`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimRequest {
    /// Proves the caller is a registered node.
    pub registration_id: RegistrationId,
    pub worker_name: String,
}

/// Outcome of a claim. Conflicts are data, not errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimResponse {
    pub claimed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<Task>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ClaimResponse {
    pub fn claimed(task: Task) -> Self {
        Self {
            claimed: true,
            task: Some(task),
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            claimed: false,
            task: None,
            error: Some(error.into()),
        }
    }
}

// ============================================================================
// Agents
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStatusUpdate {
    pub status: AgentStatus,
}

// ============================================================================
// Messages
// ============================================================================

/// Body of `POST /api/v1/messages`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageRequest {
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: String,
    pub routed: bool,
}

/// A routed message, as carried in `message.routed` event data and returned
/// by `GET /api/v1/messages`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub from: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    pub body: String,
    pub sent_at: DateTime<Utc>,
}

impl Message {
    pub fn new(id: impl Into<String>, req: MessageRequest) -> Self {
        Self {
            id: id.into(),
            from: req.from,
            to: req.to,
            repo: req.repo,
            body: req.body,
            sent_at: Utc::now(),
        }
    }
}

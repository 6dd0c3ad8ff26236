//! Node registration types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{AgentStatus, AgentType, NodeId, NodeStatus, RegistrationId, TaskId};

/// Worker slots a node offers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capacity {
    pub max_workers: u32,
    #[serde(default)]
    pub current_workers: u32,
}

impl Capacity {
    pub fn new(max_workers: u32) -> Self {
        Self {
            max_workers,
            current_workers: 0,
        }
    }

    /// Returns true if at least one slot is free.
    pub fn has_free_slot(&self) -> bool {
        self.current_workers < self.max_workers
    }
}

/// Summary of one piece of work a node is currently running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSummary {
    pub name: String,
    #[serde(default)]
    pub repo: String,
    #[serde(default)]
    pub agent_type: AgentType,
    #[serde(default)]
    pub status: AgentStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
}

/// Optional resource gauges reported with heartbeats.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_average: Option<f64>,
}

/// A registered execution participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Caller-supplied identifier.
    pub id: NodeId,

    /// Service-issued handle for the current registration.
    pub registration_id: RegistrationId,

    pub hostname: String,
    pub capacity: Capacity,

    /// Selection labels (region, hardware, repo, ...).
    #[serde(default)]
    pub labels: HashMap<String, String>,

    pub status: NodeStatus,
    pub last_seen: DateTime<Utc>,
    pub registered_at: DateTime<Utc>,

    /// Work currently running on the node, as of the last heartbeat.
    #[serde(default)]
    pub agents: Vec<AgentSummary>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<NodeMetrics>,
}

impl Node {
    /// Online with at least one free worker slot.
    pub fn is_available(&self) -> bool {
        self.status == NodeStatus::Online && self.capacity.has_free_slot()
    }

    /// AND-match: every required label must be present with the same value.
    pub fn matches_labels(&self, required: &HashMap<String, String>) -> bool {
        required
            .iter()
            .all(|(k, v)| self.labels.get(k).is_some_and(|have| have == v))
    }

    /// Returns true if any running agent belongs to `repo`.
    pub fn runs_repo(&self, repo: &str) -> bool {
        self.agents.iter().any(|a| a.repo == repo)
    }
}

/// Body of `POST /api/v1/register`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub node_id: NodeId,
    pub hostname: String,
    pub capacity: Capacity,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// Initial status; `online` when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<NodeStatus>,
}

impl RegisterRequest {
    pub fn new(node_id: impl Into<NodeId>, hostname: impl Into<String>, max_workers: u32) -> Self {
        Self {
            node_id: node_id.into(),
            hostname: hostname.into(),
            capacity: Capacity::new(max_workers),
            labels: HashMap::new(),
            status: None,
        }
    }

    /// Builder method to add a label.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Result of a successful registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub registration_id: RegistrationId,
    pub heartbeat_interval_secs: u64,
}

/// Body of `POST /api/v1/heartbeat`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    pub registration_id: RegistrationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<NodeStatus>,
    /// When present, replaces the node's agent list and resyncs
    /// `capacity.current_workers` to its length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agents: Option<Vec<AgentSummary>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<NodeMetrics>,
}

impl HeartbeatRequest {
    pub fn new(registration_id: impl Into<RegistrationId>) -> Self {
        Self {
            registration_id: registration_id.into(),
            ..Self::default()
        }
    }
}

//! Task types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{NodeId, Priority, TaskId, TaskStatus};

/// A Task is one unit of distributable work in the shared queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier.
    pub id: TaskId,

    /// Repository the work belongs to.
    pub repo: String,

    /// What needs to be done.
    pub description: String,

    pub priority: Priority,

    /// Labels a node must carry to pick this task up.
    #[serde(default)]
    pub labels: HashMap<String, String>,

    pub status: TaskStatus,

    /// `"<worker>@<node>"` while the task is claimed or running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_by: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
}

impl Task {
    /// Create a new pending Task.
    pub fn new(repo: impl Into<String>, description: impl Into<String>, priority: Priority) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::generate(),
            repo: repo.into(),
            description: description.into(),
            priority,
            labels: HashMap::new(),
            status: TaskStatus::Pending,
            claimed_by: None,
            claimed_at: None,
            created_at: now,
            updated_at: now,
            result: None,
        }
    }

    /// Builder method to add a label.
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// AND-match: every requested label must be present with the same value.
    pub fn matches_labels(&self, required: &HashMap<String, String>) -> bool {
        required
            .iter()
            .all(|(k, v)| self.labels.get(k).is_some_and(|have| have == v))
    }

    /// Format the claimant string stored in `claimed_by`.
    pub fn claimant(worker_name: &str, node_id: &NodeId) -> String {
        format!("{worker_name}@{node_id}")
    }

    /// Move to `status`, keeping claim fields consistent with it.
    ///
    /// Claim fields survive only while the new status holds a claim; the
    /// caller is responsible for having validated the transition.
    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
        self.updated_at = Utc::now();
        if !status.holds_claim() {
            self.claimed_by = None;
            self.claimed_at = None;
        }
    }

    /// Record a fresh claim.
    pub fn set_claim(&mut self, claimed_by: String) {
        let now = Utc::now();
        self.status = TaskStatus::Claimed;
        self.claimed_by = Some(claimed_by);
        self.claimed_at = Some(now);
        self.updated_at = now;
    }
}

/// Opaque outcome reported by the executing worker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
}

/// Body of `POST /api/v1/tasks`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreateTaskRequest {
    pub repo: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl CreateTaskRequest {
    pub fn new(repo: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// Body of `PUT /api/v1/tasks/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateTaskRequest {
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<TaskResult>,
    /// Claimant, required only when the target status is `claimed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_name: Option<String>,
}

impl UpdateTaskRequest {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn with_result(mut self, result: TaskResult) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_claimant(mut self, node_id: impl Into<NodeId>, worker_name: impl Into<String>) -> Self {
        self.node_id = Some(node_id.into());
        self.worker_name = Some(worker_name.into());
        self
    }
}

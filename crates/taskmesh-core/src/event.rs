//! Coordination events streamed to observers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::{EventId, NodeId, TaskId};
use crate::{Node, Task, TaskStatus};

/// An observable fact emitted on every coordinator state change.
///
/// `id` and `timestamp` are left empty by constructors and stamped by the
/// event bus at publish time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EventId>,
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
}

impl Event {
    /// Create a bare event of the given type.
    pub fn new(event_type: EventType) -> Self {
        Self {
            id: None,
            event_type,
            timestamp: None,
            repo: None,
            node_id: None,
            agent_name: None,
            task_id: None,
            data: serde_json::Value::Null,
        }
    }

    pub fn with_repo(mut self, repo: impl Into<String>) -> Self {
        self.repo = Some(repo.into());
        self
    }

    pub fn with_node(mut self, node_id: NodeId) -> Self {
        self.node_id = Some(node_id);
        self
    }

    pub fn with_agent(mut self, agent_name: impl Into<String>) -> Self {
        self.agent_name = Some(agent_name.into());
        self
    }

    pub fn with_task(mut self, task_id: TaskId) -> Self {
        self.task_id = Some(task_id);
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Event about a node, carrying its hostname and status.
    pub fn for_node(event_type: EventType, node: &Node) -> Self {
        Self::new(event_type)
            .with_node(node.id.clone())
            .with_data(serde_json::json!({
                "hostname": node.hostname,
                "status": node.status,
                "capacity": node.capacity,
            }))
    }

    /// Event about a task, carrying its status, priority and claimant.
    pub fn for_task(event_type: EventType, task: &Task) -> Self {
        Self::new(event_type)
            .with_repo(task.repo.clone())
            .with_task(task.id.clone())
            .with_data(serde_json::json!({
                "status": task.status,
                "priority": task.priority,
                "claimed_by": task.claimed_by,
            }))
    }
}

/// Type of coordination event. Serialized as dotted names such as
/// `task.claimed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// Sentinel sent first on every event stream.
    #[serde(rename = "connected")]
    Connected,
    #[serde(rename = "node.registered")]
    NodeRegistered,
    #[serde(rename = "node.unregistered")]
    NodeUnregistered,
    #[serde(rename = "node.heartbeat")]
    NodeHeartbeat,
    #[serde(rename = "node.offline")]
    NodeOffline,
    #[serde(rename = "task.created")]
    TaskCreated,
    #[serde(rename = "task.claimed")]
    TaskClaimed,
    #[serde(rename = "task.updated")]
    TaskUpdated,
    #[serde(rename = "task.released")]
    TaskReleased,
    #[serde(rename = "task.completed")]
    TaskCompleted,
    #[serde(rename = "task.failed")]
    TaskFailed,
    #[serde(rename = "task.orphaned")]
    TaskOrphaned,
    #[serde(rename = "task.deleted")]
    TaskDeleted,
    #[serde(rename = "agent.registered")]
    AgentRegistered,
    #[serde(rename = "agent.unregistered")]
    AgentUnregistered,
    #[serde(rename = "agent.updated")]
    AgentUpdated,
    #[serde(rename = "message.routed")]
    MessageRouted,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::NodeRegistered => "node.registered",
            Self::NodeUnregistered => "node.unregistered",
            Self::NodeHeartbeat => "node.heartbeat",
            Self::NodeOffline => "node.offline",
            Self::TaskCreated => "task.created",
            Self::TaskClaimed => "task.claimed",
            Self::TaskUpdated => "task.updated",
            Self::TaskReleased => "task.released",
            Self::TaskCompleted => "task.completed",
            Self::TaskFailed => "task.failed",
            Self::TaskOrphaned => "task.orphaned",
            Self::TaskDeleted => "task.deleted",
            Self::AgentRegistered => "agent.registered",
            Self::AgentUnregistered => "agent.unregistered",
            Self::AgentUpdated => "agent.updated",
            Self::MessageRouted => "message.routed",
        }
    }

    /// Event type announcing that a task entered `status`.
    pub fn for_task_status(status: TaskStatus) -> Self {
        match status {
            TaskStatus::Completed => Self::TaskCompleted,
            TaskStatus::Failed => Self::TaskFailed,
            TaskStatus::Orphaned => Self::TaskOrphaned,
            TaskStatus::Claimed => Self::TaskClaimed,
            TaskStatus::Pending | TaskStatus::Running => Self::TaskUpdated,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Priority;

    #[test]
    fn test_type_serializes_dotted() {
        let event = Event::new(EventType::TaskClaimed);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "task.claimed");
        assert!(json.get("id").is_none());
        assert!(json.get("data").is_none());
        assert_eq!(EventType::TaskClaimed.as_str(), "task.claimed");
    }

    #[test]
    fn test_for_task() {
        let task = Task::new("acme/api", "ship it", Priority::Critical);
        let event = Event::for_task(EventType::TaskCreated, &task);

        assert_eq!(event.task_id.as_ref(), Some(&task.id));
        assert_eq!(event.repo.as_deref(), Some("acme/api"));
        assert_eq!(event.data["priority"], "critical");
    }

    #[test]
    fn test_status_event_mapping() {
        assert_eq!(
            EventType::for_task_status(TaskStatus::Completed),
            EventType::TaskCompleted
        );
        assert_eq!(
            EventType::for_task_status(TaskStatus::Running),
            EventType::TaskUpdated
        );
    }
}

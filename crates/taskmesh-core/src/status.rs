//! Status enums for Nodes and Tasks, plus task priority.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::CoreError;

/// Liveness status of a registered node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// Node is heartbeating and accepting work.
    #[default]
    Online,
    /// Node missed heartbeats past the offline threshold.
    Offline,
    /// Node is finishing current work and not accepting new tasks.
    Draining,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Draining => "draining",
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(Self::Online),
            "offline" => Ok(Self::Offline),
            "draining" => Ok(Self::Draining),
            other => Err(CoreError::InvalidRequest(format!("unknown node status: {other}"))),
        }
    }
}

/// Status of a Task in the coordination queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Waiting for a worker to claim it.
    #[default]
    Pending,
    /// Exclusively claimed by a worker, not yet started.
    Claimed,
    /// Claimant reported that execution started.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished unsuccessfully; may be retried.
    Failed,
    /// Claim expired without progress.
    Orphaned,
}

impl TaskStatus {
    /// Every status, in declaration order.
    pub const ALL: [TaskStatus; 6] = [
        Self::Pending,
        Self::Claimed,
        Self::Running,
        Self::Completed,
        Self::Failed,
        Self::Orphaned,
    ];

    /// Targets reachable from this status. This table is the only source of
    /// truth for task transitions.
    pub fn allowed_transitions(&self) -> &'static [TaskStatus] {
        match self {
            Self::Pending => &[Self::Claimed],
            Self::Claimed => &[Self::Running, Self::Pending, Self::Orphaned],
            Self::Running => &[Self::Completed, Self::Failed, Self::Orphaned],
            Self::Orphaned => &[Self::Pending, Self::Claimed],
            Self::Completed => &[],
            Self::Failed => &[Self::Pending],
        }
    }

    /// Returns true if `to` is listed for this status.
    pub fn can_transition_to(&self, to: TaskStatus) -> bool {
        self.allowed_transitions().contains(&to)
    }

    /// Returns true if the task carries a live claim in this status.
    pub fn holds_claim(&self) -> bool {
        matches!(self, Self::Claimed | Self::Running)
    }

    /// Returns true if no transition leaves this status.
    pub fn is_terminal(&self) -> bool {
        self.allowed_transitions().is_empty()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Claimed => "claimed",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Orphaned => "orphaned",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CoreError::InvalidRequest(format!("unknown task status: {s}")))
    }
}

/// Task priority. Ordering follows urgency, so `Critical` sorts highest.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(CoreError::InvalidRequest(format!("unknown priority: {other}"))),
        }
    }
}

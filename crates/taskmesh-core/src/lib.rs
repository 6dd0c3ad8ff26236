//! TaskMesh Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - Network/HTTP
//! - Async runtimes
//! - Storage
//!
//! Both the coordinator and the client speak in these types, so the JSON
//! shape of every entity is defined exactly once.

pub mod agent;
pub mod api;
pub mod error;
pub mod event;
pub mod ids;
pub mod node;
pub mod status;
pub mod task;

// Re-export commonly used types
pub use agent::{AgentRecord, AgentStatus, AgentType, OwnershipLevel};
pub use error::CoreError;
pub use event::{Event, EventType};
pub use ids::{EventId, NodeId, RegistrationId, TaskId};
pub use node::{
    AgentSummary, Capacity, HeartbeatRequest, Node, NodeMetrics, RegisterRequest,
    RegisterResponse,
};
pub use status::{NodeStatus, Priority, TaskStatus};
pub use task::{CreateTaskRequest, Task, TaskResult, UpdateTaskRequest};

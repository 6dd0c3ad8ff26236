//! TaskMesh Coordinator Library
//!
//! The single process of record for a TaskMesh deployment: node registry,
//! task queue, agent directory and event bus, served over HTTP + SSE.
//! All state lives in memory; a restart starts from empty.

pub mod agents;
pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod metrics;
pub mod registry;
pub mod server;
pub mod state;
pub mod tasks;

pub use agents::AgentDirectory;
pub use config::Config;
pub use error::ServerError;
pub use events::{EventBus, Subscription};
pub use registry::Registry;
pub use server::Server;
pub use state::AppState;
pub use tasks::TaskManager;

//! Client library for the TaskMesh coordinator.
//!
//! [`CoordinatorClient`] speaks the coordinator's HTTP API and keeps a
//! short-lived cache of agent records. [`HybridRegistry`] layers an
//! in-process [`LocalAgentStore`] under a remote store so agent bookkeeping
//! keeps working while the coordinator is unreachable.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod hybrid;
pub mod local;
pub mod store;

pub use cache::{AgentCache, CacheStats};
pub use client::CoordinatorClient;
pub use config::ClientConfig;
pub use error::ClientError;
pub use hybrid::{HybridConfig, HybridRegistry};
pub use local::LocalAgentStore;
pub use store::AgentStore;

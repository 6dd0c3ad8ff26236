//! Shared application state.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use taskmesh_core::Event;

use crate::agents::AgentDirectory;
use crate::config::Config;
use crate::events::EventBus;
use crate::registry::Registry;
use crate::tasks::TaskManager;

/// Shared application state.
pub struct AppState {
    pub config: Config,

    /// Registered nodes.
    pub registry: Arc<Registry>,

    /// Work queue.
    pub tasks: Arc<TaskManager>,

    /// Registered agents keyed by `(repo, name)`.
    pub agents: AgentDirectory,

    /// Fan-out to SSE subscribers.
    pub events: EventBus,

    /// Fires when the server begins shutting down; ends open event streams.
    pub shutdown: CancellationToken,

    pub started_at: Instant,
}

impl AppState {
    /// Create a new AppState wrapped in Arc.
    pub fn new(config: Config) -> Arc<Self> {
        Arc::new(Self {
            registry: Arc::new(Registry::new(config.heartbeat_interval)),
            tasks: Arc::new(TaskManager::new(config.default_priority)),
            agents: AgentDirectory::new(),
            events: EventBus::new(config.event_buffer),
            shutdown: CancellationToken::new(),
            started_at: Instant::now(),
            config,
        })
    }

    /// Publish an event to every subscriber.
    pub fn emit(&self, event: Event) {
        self.events.publish(event);
    }
}

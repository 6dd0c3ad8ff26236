//! HTTP request handlers.

mod agents;
mod events;
mod health;
mod messages;
mod nodes;
mod state;
mod tasks;

pub use agents::{
    agent_heartbeat, get_agent, list_agents, register_agent, unregister_agent, update_agent_status,
};
pub use events::event_stream;
pub use health::{health_check, metrics_handler};
pub use messages::{list_messages, route_message};
pub use nodes::{get_node, heartbeat, list_nodes, register_node, unregister_node};
pub use state::{repo_state, stats};
pub use tasks::{
    claim_task, create_task, delete_task, get_task, list_pending, list_tasks, release_task,
    update_task,
};

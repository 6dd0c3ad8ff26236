//! Node registry - membership, capacity and liveness of execution nodes.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use taskmesh_core::api::RegistryStats;
use taskmesh_core::{
    CoreError, HeartbeatRequest, Node, NodeId, NodeStatus, RegisterRequest, RegisterResponse,
    RegistrationId,
};

/// Both maps live behind one lock so a registration id can never point at a
/// node that is not in `nodes`.
#[derive(Default)]
struct RegistryInner {
    nodes: HashMap<NodeId, Node>,
    registrations: HashMap<RegistrationId, NodeId>,
}

/// Tracks participating nodes.
pub struct Registry {
    inner: RwLock<RegistryInner>,
    heartbeat_interval: Duration,
}

impl Registry {
    /// Create an empty registry that tells nodes to heartbeat every
    /// `heartbeat_interval`.
    pub fn new(heartbeat_interval: Duration) -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            heartbeat_interval,
        }
    }

    /// Register a node, or refresh it if its id is already known.
    ///
    /// Re-registration keeps the existing registration id.
    pub async fn register(&self, req: RegisterRequest) -> Result<RegisterResponse, CoreError> {
        if req.node_id.is_empty() {
            return Err(CoreError::MissingField("node_id"));
        }

        let now = Utc::now();
        let status = req.status.unwrap_or(NodeStatus::Online);
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;

        let registration_id = match inner.nodes.get_mut(&req.node_id) {
            Some(node) => {
                node.hostname = req.hostname;
                node.capacity = req.capacity;
                node.labels = req.labels;
                node.status = status;
                node.last_seen = now;
                info!(
                    node_id = %node.id,
                    registration_id = %node.registration_id,
                    "Node re-registered"
                );
                node.registration_id.clone()
            }
            None => {
                let registration_id = RegistrationId::generate();
                let node = Node {
                    id: req.node_id.clone(),
                    registration_id: registration_id.clone(),
                    hostname: req.hostname,
                    capacity: req.capacity,
                    labels: req.labels,
                    status,
                    last_seen: now,
                    registered_at: now,
                    agents: Vec::new(),
                    metrics: None,
                };
                info!(
                    node_id = %node.id,
                    registration_id = %registration_id,
                    hostname = %node.hostname,
                    max_workers = node.capacity.max_workers,
                    "Node registered"
                );
                inner
                    .registrations
                    .insert(registration_id.clone(), req.node_id.clone());
                inner.nodes.insert(req.node_id, node);
                registration_id
            }
        };

        Ok(RegisterResponse {
            registration_id,
            heartbeat_interval_secs: self.heartbeat_interval.as_secs(),
        })
    }

    /// Remove a node and its registration.
    pub async fn unregister(&self, registration_id: &RegistrationId) -> Result<Node, CoreError> {
        let mut inner = self.inner.write().await;
        let node_id = inner
            .registrations
            .remove(registration_id)
            .ok_or_else(|| CoreError::RegistrationNotFound(registration_id.to_string()))?;
        let node = inner
            .nodes
            .remove(&node_id)
            .ok_or_else(|| CoreError::NodeNotFound(node_id.to_string()))?;

        info!(node_id = %node.id, registration_id = %registration_id, "Node unregistered");
        Ok(node)
    }

    /// Refresh liveness for a registration.
    ///
    /// An unknown registration fails with not-found, which tells the node to
    /// register again.
    pub async fn heartbeat(&self, req: HeartbeatRequest) -> Result<Node, CoreError> {
        let mut inner = self.inner.write().await;
        let node_id = inner
            .registrations
            .get(&req.registration_id)
            .cloned()
            .ok_or_else(|| CoreError::RegistrationNotFound(req.registration_id.to_string()))?;
        let node = inner
            .nodes
            .get_mut(&node_id)
            .ok_or_else(|| CoreError::NodeNotFound(node_id.to_string()))?;

        match req.status {
            Some(status) => node.status = status,
            None if node.status == NodeStatus::Offline => {
                info!(node_id = %node.id, "Offline node is heartbeating again");
                node.status = NodeStatus::Online;
            }
            None => {}
        }
        node.last_seen = Utc::now();
        if let Some(agents) = req.agents {
            node.capacity.current_workers = u32::try_from(agents.len()).unwrap_or(u32::MAX);
            node.agents = agents;
        }
        if let Some(metrics) = req.metrics {
            node.metrics = Some(metrics);
        }

        debug!(
            node_id = %node.id,
            status = %node.status,
            current_workers = node.capacity.current_workers,
            "Heartbeat"
        );
        Ok(node.clone())
    }

    pub async fn get_node(&self, node_id: &NodeId) -> Result<Node, CoreError> {
        self.inner
            .read()
            .await
            .nodes
            .get(node_id)
            .cloned()
            .ok_or_else(|| CoreError::NodeNotFound(node_id.to_string()))
    }

    pub async fn get_node_by_registration(
        &self,
        registration_id: &RegistrationId,
    ) -> Result<Node, CoreError> {
        let inner = self.inner.read().await;
        inner
            .registrations
            .get(registration_id)
            .and_then(|node_id| inner.nodes.get(node_id))
            .cloned()
            .ok_or_else(|| CoreError::RegistrationNotFound(registration_id.to_string()))
    }

    /// All nodes, ordered by id.
    pub async fn list_nodes(&self) -> Vec<Node> {
        self.collect(|_| true).await
    }

    pub async fn list_online_nodes(&self) -> Vec<Node> {
        self.collect(|n| n.status == NodeStatus::Online).await
    }

    /// Online nodes with a free worker slot.
    pub async fn list_available_nodes(&self) -> Vec<Node> {
        self.collect(Node::is_available).await
    }

    /// Online nodes carrying every label in `labels`.
    pub async fn find_nodes_by_label(&self, labels: &HashMap<String, String>) -> Vec<Node> {
        self.collect(|n| n.status == NodeStatus::Online && n.matches_labels(labels))
            .await
    }

    async fn collect(&self, keep: impl Fn(&Node) -> bool) -> Vec<Node> {
        let inner = self.inner.read().await;
        let mut nodes: Vec<Node> = inner.nodes.values().filter(|n| keep(n)).cloned().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        nodes
    }

    /// Mark online nodes silent for longer than `threshold` as offline.
    ///
    /// Returns the nodes that changed.
    pub async fn mark_stale_offline(&self, threshold: Duration) -> Vec<Node> {
        let now = Utc::now();
        let mut inner = self.inner.write().await;
        let mut changed = Vec::new();

        for node in inner.nodes.values_mut() {
            if node.status != NodeStatus::Online {
                continue;
            }
            let silent_for = (now - node.last_seen).to_std().unwrap_or_default();
            if silent_for > threshold {
                warn!(
                    node_id = %node.id,
                    silent_secs = silent_for.as_secs(),
                    "Node missed heartbeats, marking offline"
                );
                node.status = NodeStatus::Offline;
                changed.push(node.clone());
            }
        }
        changed
    }

    /// Start the offline sweep, ticking every `threshold / 3` until `cancel`
    /// fires.
    pub fn start_cleanup(
        self: &Arc<Self>,
        cancel: CancellationToken,
        threshold: Duration,
    ) -> JoinHandle<()> {
        self.start_cleanup_with(cancel, threshold, |_| {})
    }

    /// Like [`start_cleanup`](Self::start_cleanup), calling `on_offline` with
    /// the nodes each tick marked offline.
    pub fn start_cleanup_with<F>(
        self: &Arc<Self>,
        cancel: CancellationToken,
        threshold: Duration,
        on_offline: F,
    ) -> JoinHandle<()>
    where
        F: Fn(Vec<Node>) + Send + Sync + 'static,
    {
        let registry = Arc::clone(self);
        let period = (threshold / 3).max(Duration::from_millis(10));
        info!(
            threshold_ms = threshold.as_millis() as u64,
            period_ms = period.as_millis() as u64,
            "Starting node offline sweep"
        );

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Node offline sweep stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        let changed = registry.mark_stale_offline(threshold).await;
                        if !changed.is_empty() {
                            on_offline(changed);
                        }
                    }
                }
            }
        })
    }

    /// Node counts by status plus aggregate capacity.
    pub async fn stats(&self) -> RegistryStats {
        let inner = self.inner.read().await;
        let mut stats = RegistryStats {
            total: inner.nodes.len(),
            ..RegistryStats::default()
        };
        for node in inner.nodes.values() {
            match node.status {
                NodeStatus::Online => stats.online += 1,
                NodeStatus::Offline => stats.offline += 1,
                NodeStatus::Draining => stats.draining += 1,
            }
            stats.total_capacity += u64::from(node.capacity.max_workers);
            stats.used_capacity += u64::from(node.capacity.current_workers);
        }
        stats
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }
}

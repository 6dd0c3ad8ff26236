//! Task manager - the shared work queue and its claim state machine.
//!
//! Every check-then-set sequence (claim, update, release, expiry) runs under
//! the single write lock, which is what makes a claim exclusive.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use taskmesh_core::api::TaskStats;
use taskmesh_core::{
    CoreError, CreateTaskRequest, NodeId, Priority, Task, TaskId, TaskStatus, UpdateTaskRequest,
};

struct TaskEntry {
    task: Task,
    /// Insertion order, the final tie-breaker when sorting.
    seq: u64,
}

#[derive(Default)]
struct TaskStore {
    tasks: HashMap<TaskId, TaskEntry>,
    next_seq: u64,
}

impl TaskStore {
    fn get_mut(&mut self, id: &TaskId) -> Result<&mut Task, CoreError> {
        self.tasks
            .get_mut(id)
            .map(|entry| &mut entry.task)
            .ok_or_else(|| CoreError::TaskNotFound(id.to_string()))
    }

    /// Tasks passing `keep`, by priority desc, then age, then insertion.
    fn sorted(&self, keep: impl Fn(&Task) -> bool) -> Vec<Task> {
        let mut entries: Vec<&TaskEntry> = self.tasks.values().filter(|e| keep(&e.task)).collect();
        entries.sort_by(|a, b| {
            b.task
                .priority
                .cmp(&a.task.priority)
                .then(a.task.created_at.cmp(&b.task.created_at))
                .then(a.seq.cmp(&b.seq))
        });
        entries.into_iter().map(|e| e.task.clone()).collect()
    }
}

/// Owns all tasks.
pub struct TaskManager {
    inner: RwLock<TaskStore>,
    default_priority: Priority,
}

impl TaskManager {
    pub fn new(default_priority: Priority) -> Self {
        Self {
            inner: RwLock::new(TaskStore::default()),
            default_priority,
        }
    }

    /// Add a pending task to the queue.
    pub async fn create(&self, req: CreateTaskRequest) -> Result<Task, CoreError> {
        if req.repo.trim().is_empty() {
            return Err(CoreError::MissingField("repo"));
        }
        if req.description.trim().is_empty() {
            return Err(CoreError::MissingField("description"));
        }

        let mut task = Task::new(
            req.repo,
            req.description,
            req.priority.unwrap_or(self.default_priority),
        );
        task.labels = req.labels;

        let mut store = self.inner.write().await;
        let seq = store.next_seq;
        store.next_seq += 1;
        store.tasks.insert(
            task.id.clone(),
            TaskEntry {
                task: task.clone(),
                seq,
            },
        );

        info!(
            task_id = %task.id,
            repo = %task.repo,
            priority = %task.priority,
            "Task created"
        );
        Ok(task)
    }

    pub async fn get(&self, id: &TaskId) -> Result<Task, CoreError> {
        self.inner
            .read()
            .await
            .tasks
            .get(id)
            .map(|e| e.task.clone())
            .ok_or_else(|| CoreError::TaskNotFound(id.to_string()))
    }

    /// All tasks, optionally filtered by status, in queue order.
    pub async fn list(&self, status: Option<TaskStatus>) -> Vec<Task> {
        self.inner
            .read()
            .await
            .sorted(|t| status.map_or(true, |s| t.status == s))
    }

    /// Pending tasks carrying every label in `labels`, in queue order.
    pub async fn pending(&self, labels: &HashMap<String, String>) -> Vec<Task> {
        self.inner
            .read()
            .await
            .sorted(|t| t.status == TaskStatus::Pending && t.matches_labels(labels))
    }

    /// Count pending tasks for one repository.
    pub async fn pending_count_for_repo(&self, repo: &str) -> usize {
        self.inner
            .read()
            .await
            .tasks
            .values()
            .filter(|e| e.task.status == TaskStatus::Pending && e.task.repo == repo)
            .count()
    }

    /// Exclusively claim a pending task for `worker_name@node_id`.
    ///
    /// Losing callers get [`CoreError::AlreadyClaimed`] when someone holds the
    /// claim, or [`CoreError::NotPending`] for any other non-pending state.
    pub async fn claim(
        &self,
        id: &TaskId,
        node_id: &NodeId,
        worker_name: &str,
    ) -> Result<Task, CoreError> {
        if node_id.is_empty() {
            return Err(CoreError::MissingField("node_id"));
        }
        if worker_name.trim().is_empty() {
            return Err(CoreError::MissingField("worker_name"));
        }

        let mut store = self.inner.write().await;
        let task = store.get_mut(id)?;

        if task.status != TaskStatus::Pending {
            debug!(task_id = %id, status = %task.status, "Claim rejected");
            return Err(match &task.claimed_by {
                Some(claimed_by) => CoreError::AlreadyClaimed {
                    task_id: id.to_string(),
                    claimed_by: claimed_by.clone(),
                },
                None => CoreError::NotPending {
                    task_id: id.to_string(),
                    status: task.status,
                },
            });
        }

        task.set_claim(Task::claimant(worker_name, node_id));
        info!(
            task_id = %id,
            claimed_by = task.claimed_by.as_deref().unwrap_or_default(),
            "Task claimed"
        );
        Ok(task.clone())
    }

    /// Move a task along the transition table, attaching a result if given.
    pub async fn update(&self, id: &TaskId, req: UpdateTaskRequest) -> Result<Task, CoreError> {
        let mut store = self.inner.write().await;
        let task = store.get_mut(id)?;
        let from = task.status;
        let to = req.status;

        if !from.can_transition_to(to) {
            debug!(task_id = %id, %from, %to, "Transition rejected");
            return Err(CoreError::InvalidTransition { from, to });
        }

        if to == TaskStatus::Claimed {
            let node_id = req.node_id.filter(|n| !n.is_empty());
            let worker = req.worker_name.filter(|w| !w.trim().is_empty());
            let (Some(node_id), Some(worker)) = (node_id, worker) else {
                return Err(CoreError::MissingField("node_id and worker_name"));
            };
            task.set_claim(Task::claimant(&worker, &node_id));
        } else {
            task.set_status(to);
        }
        if let Some(result) = req.result {
            task.result = Some(result);
        }

        info!(task_id = %id, %from, %to, "Task status updated");
        Ok(task.clone())
    }

    /// Return a claimed or running task to the queue.
    pub async fn release(&self, id: &TaskId) -> Result<Task, CoreError> {
        let mut store = self.inner.write().await;
        let task = store.get_mut(id)?;
        if !task.status.holds_claim() {
            return Err(CoreError::InvalidTransition {
                from: task.status,
                to: TaskStatus::Pending,
            });
        }

        let previous = task.claimed_by.take();
        task.set_status(TaskStatus::Pending);
        info!(
            task_id = %id,
            released_from = previous.as_deref().unwrap_or_default(),
            "Task released"
        );
        Ok(task.clone())
    }

    pub async fn delete(&self, id: &TaskId) -> Result<Task, CoreError> {
        let removed = self
            .inner
            .write()
            .await
            .tasks
            .remove(id)
            .map(|e| e.task)
            .ok_or_else(|| CoreError::TaskNotFound(id.to_string()))?;
        info!(task_id = %id, "Task deleted");
        Ok(removed)
    }

    /// Orphan claimed tasks whose claim is older than `timeout`.
    ///
    /// Running tasks are left alone: they already proved the claimant alive.
    pub async fn mark_expired_orphaned(&self, timeout: Duration) -> Vec<Task> {
        let now = Utc::now();
        let mut store = self.inner.write().await;
        let mut changed = Vec::new();

        for entry in store.tasks.values_mut() {
            let task = &mut entry.task;
            if task.status != TaskStatus::Claimed {
                continue;
            }
            let Some(claimed_at) = task.claimed_at else {
                continue;
            };
            let held_for = (now - claimed_at).to_std().unwrap_or_default();
            if held_for > timeout {
                warn!(
                    task_id = %task.id,
                    claimed_by = task.claimed_by.as_deref().unwrap_or_default(),
                    held_secs = held_for.as_secs(),
                    "Claim expired, orphaning task"
                );
                task.set_status(TaskStatus::Orphaned);
                changed.push(task.clone());
            }
        }
        changed
    }

    /// Start the claim-expiry sweep, ticking every `timeout / 3` until
    /// `cancel` fires.
    pub fn start_cleanup(
        self: &Arc<Self>,
        cancel: CancellationToken,
        timeout: Duration,
    ) -> JoinHandle<()> {
        self.start_cleanup_with(cancel, timeout, |_| {})
    }

    /// Like [`start_cleanup`](Self::start_cleanup), calling `on_orphaned`
    /// with the tasks each tick orphaned.
    pub fn start_cleanup_with<F>(
        self: &Arc<Self>,
        cancel: CancellationToken,
        timeout: Duration,
        on_orphaned: F,
    ) -> JoinHandle<()>
    where
        F: Fn(Vec<Task>) + Send + Sync + 'static,
    {
        let manager = Arc::clone(self);
        let period = (timeout / 3).max(Duration::from_millis(10));
        info!(
            timeout_ms = timeout.as_millis() as u64,
            period_ms = period.as_millis() as u64,
            "Starting claim expiry sweep"
        );

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Claim expiry sweep stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        let changed = manager.mark_expired_orphaned(timeout).await;
                        if !changed.is_empty() {
                            on_orphaned(changed);
                        }
                    }
                }
            }
        })
    }

    /// Task counts per status.
    pub async fn stats(&self) -> TaskStats {
        let store = self.inner.read().await;
        let mut stats = TaskStats {
            total: store.tasks.len(),
            ..TaskStats::default()
        };
        for entry in store.tasks.values() {
            match entry.task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Claimed => stats.claimed += 1,
                TaskStatus::Running => stats.running += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Orphaned => stats.orphaned += 1,
            }
        }
        stats
    }
}

impl Default for TaskManager {
    fn default() -> Self {
        Self::new(Priority::Medium)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskmesh_core::TaskResult;

    fn labels(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    async fn create(manager: &TaskManager, description: &str, priority: Priority) -> Task {
        manager
            .create(CreateTaskRequest::new("acme/api", description).with_priority(priority))
            .await
            .unwrap()
    }

    /// Force a task into `status`, with a claim where the status needs one.
    async fn force_status(manager: &TaskManager, id: &TaskId, status: TaskStatus) {
        let mut store = manager.inner.write().await;
        let task = store.get_mut(id).unwrap();
        if status.holds_claim() {
            task.set_claim("w0@n0".to_string());
        }
        task.set_status(status);
    }

    #[tokio::test]
    async fn test_create_validates_and_defaults_priority() {
        let manager = TaskManager::new(Priority::Low);

        let err = manager
            .create(CreateTaskRequest::new("", "do it"))
            .await
            .unwrap_err();
        assert_eq!(err, CoreError::MissingField("repo"));
        let err = manager
            .create(CreateTaskRequest::new("acme/api", "  "))
            .await
            .unwrap_err();
        assert_eq!(err, CoreError::MissingField("description"));

        let task = manager
            .create(CreateTaskRequest::new("acme/api", "do it"))
            .await
            .unwrap();
        assert_eq!(task.priority, Priority::Low);
        assert_eq!(task.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn test_concurrent_claims_exactly_one_wins() {
        let manager = Arc::new(TaskManager::default());
        let task = create(&manager, "contended", Priority::High).await;

        let mut handles = Vec::new();
        for i in 0..32 {
            let manager = Arc::clone(&manager);
            let id = task.id.clone();
            handles.push(tokio::spawn(async move {
                manager
                    .claim(&id, &NodeId::new(format!("n{i}")), &format!("w{i}"))
                    .await
            }));
        }

        let mut wins = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => wins += 1,
                Err(e) => {
                    assert!(matches!(e, CoreError::AlreadyClaimed { .. }), "{e}");
                    assert!(e.to_string().contains("already claimed by"));
                }
            }
        }
        assert_eq!(wins, 1);
    }

    #[tokio::test]
    async fn test_claim_sets_claimant() {
        let manager = TaskManager::default();
        let task = create(&manager, "t", Priority::Medium).await;

        let claimed = manager.claim(&task.id, &NodeId::new("N1"), "w1").await.unwrap();

        assert_eq!(claimed.status, TaskStatus::Claimed);
        assert_eq!(claimed.claimed_by.as_deref(), Some("w1@N1"));
        assert!(claimed.claimed_at.is_some());
    }

    #[tokio::test]
    async fn test_claim_on_finished_task_is_not_pending() {
        let manager = TaskManager::default();
        let task = create(&manager, "t", Priority::Medium).await;
        force_status(&manager, &task.id, TaskStatus::Completed).await;

        let err = manager
            .claim(&task.id, &NodeId::new("n"), "w")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            CoreError::NotPending {
                task_id: task.id.to_string(),
                status: TaskStatus::Completed
            }
        );
    }

    #[tokio::test]
    async fn test_claim_unknown_task() {
        let err = TaskManager::default()
            .claim(&TaskId::new("nope"), &NodeId::new("n"), "w")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_transition_table_is_exhaustive() {
        let manager = TaskManager::default();
        for from in TaskStatus::ALL {
            for to in TaskStatus::ALL {
                let task = create(&manager, "t", Priority::Medium).await;
                force_status(&manager, &task.id, from).await;

                let req = UpdateTaskRequest::status(to).with_claimant("n1", "w1");
                let result = manager.update(&task.id, req).await;

                let allowed = matches!(
                    (from, to),
                    (TaskStatus::Pending, TaskStatus::Claimed)
                        | (TaskStatus::Claimed, TaskStatus::Running)
                        | (TaskStatus::Claimed, TaskStatus::Pending)
                        | (TaskStatus::Claimed, TaskStatus::Orphaned)
                        | (TaskStatus::Running, TaskStatus::Completed)
                        | (TaskStatus::Running, TaskStatus::Failed)
                        | (TaskStatus::Running, TaskStatus::Orphaned)
                        | (TaskStatus::Orphaned, TaskStatus::Pending)
                        | (TaskStatus::Orphaned, TaskStatus::Claimed)
                        | (TaskStatus::Failed, TaskStatus::Pending)
                );
                match result {
                    Ok(updated) => {
                        assert!(allowed, "{from} -> {to} should be rejected");
                        assert_eq!(updated.status, to);
                        assert_eq!(updated.claimed_by.is_some(), to.holds_claim());
                        assert_eq!(updated.claimed_at.is_some(), to.holds_claim());
                    }
                    Err(err) => {
                        assert!(!allowed, "{from} -> {to} should be allowed: {err}");
                        assert_eq!(
                            err.to_string(),
                            format!("invalid transition from {from} to {to}")
                        );
                    }
                }
            }
        }
    }

    #[tokio::test]
    async fn test_update_to_claimed_requires_claimant() {
        let manager = TaskManager::default();
        let task = create(&manager, "t", Priority::Medium).await;
        force_status(&manager, &task.id, TaskStatus::Orphaned).await;

        let err = manager
            .update(&task.id, UpdateTaskRequest::status(TaskStatus::Claimed))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "MISSING_FIELD");
    }

    #[tokio::test]
    async fn test_update_attaches_result() {
        let manager = TaskManager::default();
        let task = create(&manager, "t", Priority::Medium).await;
        manager.claim(&task.id, &NodeId::new("n"), "w").await.unwrap();
        manager
            .update(&task.id, UpdateTaskRequest::status(TaskStatus::Running))
            .await
            .unwrap();

        let result = TaskResult {
            success: true,
            pr_number: Some(42),
            pr_url: Some("https://example.com/pr/42".into()),
            error: None,
            duration_secs: Some(12.5),
        };
        let done = manager
            .update(
                &task.id,
                UpdateTaskRequest::status(TaskStatus::Completed).with_result(result.clone()),
            )
            .await
            .unwrap();

        assert_eq!(done.result, Some(result));
        assert!(done.claimed_by.is_none());
    }

    #[tokio::test]
    async fn test_release_returns_to_pending() {
        let manager = TaskManager::default();
        let task = create(&manager, "t", Priority::Medium).await;
        manager.claim(&task.id, &NodeId::new("n"), "w").await.unwrap();
        manager
            .update(&task.id, UpdateTaskRequest::status(TaskStatus::Running))
            .await
            .unwrap();

        let released = manager.release(&task.id).await.unwrap();
        assert_eq!(released.status, TaskStatus::Pending);
        assert!(released.claimed_by.is_none() && released.claimed_at.is_none());

        let err = manager.release(&task.id).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_TRANSITION");
    }

    #[tokio::test]
    async fn test_ordering_priority_then_age_then_insertion() {
        let manager = TaskManager::default();
        let low = create(&manager, "low", Priority::Low).await;
        let med1 = create(&manager, "med1", Priority::Medium).await;
        let crit = create(&manager, "crit", Priority::Critical).await;
        let med2 = create(&manager, "med2", Priority::Medium).await;
        let high = create(&manager, "high", Priority::High).await;

        // Same timestamp for both medium tasks: insertion order decides.
        {
            let mut store = manager.inner.write().await;
            let stamp = store.get_mut(&med1.id).unwrap().created_at;
            store.get_mut(&med2.id).unwrap().created_at = stamp;
        }

        let order: Vec<TaskId> = manager.list(None).await.into_iter().map(|t| t.id).collect();
        assert_eq!(order, vec![crit.id, high.id, med1.id, med2.id, low.id]);
    }

    #[tokio::test]
    async fn test_pending_label_filter() {
        let manager = TaskManager::default();
        manager
            .create(CreateTaskRequest::new("r", "linux").with_label("os", "linux"))
            .await
            .unwrap();
        let linux_gpu = manager
            .create(
                CreateTaskRequest::new("r", "linux gpu")
                    .with_label("os", "linux")
                    .with_label("gpu", "yes"),
            )
            .await
            .unwrap();
        let mac = manager
            .create(CreateTaskRequest::new("r", "mac").with_label("os", "mac"))
            .await
            .unwrap();
        manager.claim(&mac.id, &NodeId::new("n"), "w").await.unwrap();

        assert_eq!(manager.pending(&HashMap::new()).await.len(), 2);

        let found = manager.pending(&labels(&[("os", "linux")])).await;
        assert_eq!(found.len(), 2);

        let found = manager
            .pending(&labels(&[("os", "linux"), ("gpu", "yes")]))
            .await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, linux_gpu.id);

        let found = manager.pending(&labels(&[("os", "mac")])).await;
        assert!(found.is_empty(), "claimed task must not be pending");

        assert!(manager.pending(&labels(&[("gpu", "no")])).await.is_empty());
    }

    #[tokio::test]
    async fn test_list_status_filter() {
        let manager = TaskManager::default();
        let a = create(&manager, "a", Priority::Medium).await;
        create(&manager, "b", Priority::Medium).await;
        manager.claim(&a.id, &NodeId::new("n"), "w").await.unwrap();

        assert_eq!(manager.list(Some(TaskStatus::Claimed)).await.len(), 1);
        assert_eq!(manager.list(Some(TaskStatus::Pending)).await.len(), 1);
        assert_eq!(manager.list(None).await.len(), 2);
    }

    #[tokio::test]
    async fn test_expired_claim_is_orphaned_then_reclaimable() {
        let manager = TaskManager::default();
        let task = create(&manager, "t", Priority::Medium).await;
        manager.claim(&task.id, &NodeId::new("n1"), "w1").await.unwrap();
        {
            let mut store = manager.inner.write().await;
            let t = store.get_mut(&task.id).unwrap();
            t.claimed_at = t.claimed_at.map(|at| at - chrono::Duration::seconds(600));
        }

        let orphaned = manager.mark_expired_orphaned(Duration::from_secs(300)).await;
        assert_eq!(orphaned.len(), 1);
        let current = manager.get(&task.id).await.unwrap();
        assert_eq!(current.status, TaskStatus::Orphaned);
        assert!(current.claimed_by.is_none());

        // Direct orphaned -> claimed.
        let reclaimed = manager
            .update(
                &task.id,
                UpdateTaskRequest::status(TaskStatus::Claimed).with_claimant("n2", "w2"),
            )
            .await
            .unwrap();
        assert_eq!(reclaimed.claimed_by.as_deref(), Some("w2@n2"));
    }

    #[tokio::test]
    async fn test_orphaned_via_pending_then_claim() {
        let manager = Arc::new(TaskManager::default());
        let task = create(&manager, "t", Priority::Medium).await;
        manager.claim(&task.id, &NodeId::new("n1"), "w1").await.unwrap();

        let cancel = CancellationToken::new();
        let handle = manager.start_cleanup(cancel.clone(), Duration::from_millis(60));
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(manager.get(&task.id).await.unwrap().status, TaskStatus::Orphaned);

        manager
            .update(&task.id, UpdateTaskRequest::status(TaskStatus::Pending))
            .await
            .unwrap();
        let claimed = manager.claim(&task.id, &NodeId::new("n2"), "w2").await.unwrap();
        assert_eq!(claimed.claimed_by.as_deref(), Some("w2@n2"));
    }

    #[tokio::test]
    async fn test_running_tasks_never_expire() {
        let manager = TaskManager::default();
        let task = create(&manager, "t", Priority::Medium).await;
        manager.claim(&task.id, &NodeId::new("n"), "w").await.unwrap();
        manager
            .update(&task.id, UpdateTaskRequest::status(TaskStatus::Running))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(manager
            .mark_expired_orphaned(Duration::from_millis(1))
            .await
            .is_empty());
    }

    #[tokio::test]
    async fn test_delete_and_stats() {
        let manager = TaskManager::default();
        let a = create(&manager, "a", Priority::Medium).await;
        let b = create(&manager, "b", Priority::Medium).await;
        manager.claim(&b.id, &NodeId::new("n"), "w").await.unwrap();

        manager.delete(&a.id).await.unwrap();
        assert!(manager.delete(&a.id).await.unwrap_err().is_not_found());

        let stats = manager.stats().await;
        assert_eq!(stats.total, 1);
        assert_eq!(stats.claimed, 1);
        assert_eq!(stats.pending, 0);
        assert_eq!(manager.pending_count_for_repo("acme/api").await, 0);
    }
}

//! Prometheus metrics collection and formatting.
//!
//! This module provides metrics in Prometheus text exposition format.

use std::fmt::Write;

use crate::state::AppState;

/// Collect all metrics from AppState and format as Prometheus text.
pub async fn collect_metrics(state: &AppState) -> String {
    let mut output = String::new();

    collect_node_metrics(state, &mut output).await;
    collect_task_metrics(state, &mut output).await;
    collect_event_metrics(state, &mut output);

    output
}

fn write_gauge_header(output: &mut String, name: &str, help: &str) {
    writeln!(output, "# HELP {name} {help}").ok();
    writeln!(output, "# TYPE {name} gauge").ok();
}

/// Node counts by status and worker capacity.
async fn collect_node_metrics(state: &AppState, output: &mut String) {
    let stats = state.registry.stats().await;

    write_gauge_header(output, "taskmesh_nodes", "Number of registered nodes by status");
    for (status, count) in [
        ("online", stats.online),
        ("offline", stats.offline),
        ("draining", stats.draining),
    ] {
        writeln!(output, "taskmesh_nodes{{status=\"{status}\"}} {count}").ok();
    }

    writeln!(output).ok();
    write_gauge_header(
        output,
        "taskmesh_capacity_workers",
        "Worker slots across registered nodes",
    );
    writeln!(
        output,
        "taskmesh_capacity_workers{{kind=\"total\"}} {}",
        stats.total_capacity
    )
    .ok();
    writeln!(
        output,
        "taskmesh_capacity_workers{{kind=\"used\"}} {}",
        stats.used_capacity
    )
    .ok();
}

/// Task counts by status.
async fn collect_task_metrics(state: &AppState, output: &mut String) {
    let stats = state.tasks.stats().await;

    writeln!(output).ok();
    write_gauge_header(output, "taskmesh_tasks", "Number of tasks by status");
    for (status, count) in [
        ("pending", stats.pending),
        ("claimed", stats.claimed),
        ("running", stats.running),
        ("completed", stats.completed),
        ("failed", stats.failed),
        ("orphaned", stats.orphaned),
    ] {
        writeln!(output, "taskmesh_tasks{{status=\"{status}\"}} {count}").ok();
    }
}

fn collect_event_metrics(state: &AppState, output: &mut String) {
    writeln!(output).ok();
    write_gauge_header(
        output,
        "taskmesh_event_subscribers",
        "Open event stream subscriptions",
    );
    writeln!(
        output,
        "taskmesh_event_subscribers {}",
        state.events.subscriber_count()
    )
    .ok();

    writeln!(output).ok();
    writeln!(
        output,
        "# HELP taskmesh_events_dropped_total Event deliveries dropped on full subscriber buffers"
    )
    .ok();
    writeln!(output, "# TYPE taskmesh_events_dropped_total counter").ok();
    writeln!(
        output,
        "taskmesh_events_dropped_total {}",
        state.events.dropped_count()
    )
    .ok();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use taskmesh_core::{CreateTaskRequest, RegisterRequest};

    #[tokio::test]
    async fn test_collect_metrics_empty_state() {
        let state = AppState::new(Config::default());
        let output = collect_metrics(&state).await;

        assert!(output.contains("# TYPE taskmesh_nodes gauge"));
        assert!(output.contains("taskmesh_nodes{status=\"online\"} 0"));
        assert!(output.contains("taskmesh_tasks{status=\"pending\"} 0"));
        assert!(output.contains("taskmesh_capacity_workers{kind=\"total\"} 0"));
        assert!(output.contains("taskmesh_event_subscribers 0"));
    }

    #[tokio::test]
    async fn test_collect_metrics_counts() {
        let state = AppState::new(Config::default());
        state
            .registry
            .register(RegisterRequest::new("n1", "host-1", 4))
            .await
            .unwrap();
        state
            .tasks
            .create(CreateTaskRequest::new("acme/api", "build"))
            .await
            .unwrap();
        let _sub = state.events.subscribe();

        let output = collect_metrics(&state).await;

        assert!(output.contains("taskmesh_nodes{status=\"online\"} 1"));
        assert!(output.contains("taskmesh_capacity_workers{kind=\"total\"} 4"));
        assert!(output.contains("taskmesh_tasks{status=\"pending\"} 1"));
        assert!(output.contains("taskmesh_event_subscribers 1"));
    }
}

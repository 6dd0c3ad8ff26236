//! TaskMesh CLI - Command line interface for the TaskMesh coordinator.

use std::collections::HashMap;

use clap::{Parser, Subcommand};
use serde::Serialize;

use taskmesh_client::{ClientConfig, CoordinatorClient};
use taskmesh_core::{
    CreateTaskRequest, Node, Priority, RegisterRequest, RegistrationId, Task, TaskStatus,
    UpdateTaskRequest,
};

/// TaskMesh CLI - coordinator management tool
#[derive(Parser)]
#[command(name = "taskmesh")]
#[command(about = "CLI for the TaskMesh coordinator", long_about = None)]
struct Cli {
    /// Coordinator address
    #[arg(short, long, env = "TASKMESH_URL", default_value = "http://127.0.0.1:7331")]
    addr: String,

    /// Bearer token
    #[arg(long, env = "TASKMESH_TOKEN")]
    token: Option<String>,

    /// Print raw JSON instead of tables
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check coordinator health
    Health,

    /// Show node and task counters
    Stats,

    /// Show agents, nodes and pending tasks of a repository
    State {
        /// Repository, e.g. acme/api
        repo: String,
    },

    /// List registered nodes
    Nodes {
        /// online, offline, draining or available
        #[arg(short, long)]
        status: Option<String>,

        /// Required label, key=value (repeatable)
        #[arg(short, long = "label", value_parser = parse_label)]
        labels: Vec<(String, String)>,
    },

    /// Register a node
    Register {
        /// Node ID
        node_id: String,

        #[arg(long)]
        hostname: String,

        #[arg(long, default_value = "1")]
        max_workers: u32,

        /// Label, key=value (repeatable)
        #[arg(short, long = "label", value_parser = parse_label)]
        labels: Vec<(String, String)>,
    },

    /// Remove a node registration
    Unregister {
        /// Registration ID returned by `register`
        registration_id: String,
    },

    /// List tasks
    #[command(name = "list-tasks")]
    ListTasks {
        #[arg(short, long)]
        status: Option<TaskStatus>,
    },

    /// List claimable tasks in priority order
    Pending {
        /// Required label, key=value (repeatable)
        #[arg(short, long = "label", value_parser = parse_label)]
        labels: Vec<(String, String)>,
    },

    /// Create a new task
    #[command(name = "create-task")]
    CreateTask {
        #[arg(short, long)]
        repo: String,

        #[arg(short, long)]
        description: String,

        #[arg(short, long)]
        priority: Option<Priority>,

        /// Label, key=value (repeatable)
        #[arg(short, long = "label", value_parser = parse_label)]
        labels: Vec<(String, String)>,
    },

    /// Get a task
    #[command(name = "get-task")]
    GetTask {
        /// Task ID
        id: String,
    },

    /// Claim a task for a worker
    Claim {
        /// Task ID
        id: String,

        #[arg(long)]
        registration_id: String,

        #[arg(long)]
        worker: String,
    },

    /// Move a task to a new status
    #[command(name = "update-task")]
    UpdateTask {
        /// Task ID
        id: String,

        status: TaskStatus,
    },

    /// Return a claimed or running task to the queue
    Release {
        /// Task ID
        id: String,
    },

    /// Delete a task
    #[command(name = "delete-task")]
    DeleteTask {
        /// Task ID
        id: String,
    },

    /// List agents
    Agents {
        #[arg(short, long)]
        repo: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = ClientConfig::new(cli.addr);
    if let Some(token) = cli.token {
        config = config.with_token(token);
    }
    let client = CoordinatorClient::new(config)?;
    let json = cli.json;

    match cli.command {
        Commands::Health => {
            let health = client.health().await?;
            if json {
                return print_json(&health);
            }
            println!(
                "{} (version {}, up {}s)",
                health.status, health.version, health.uptime_secs
            );
        }
        Commands::Stats => {
            let stats = client.stats().await?;
            if json {
                return print_json(&stats);
            }
            let (n, t) = (&stats.nodes, &stats.tasks);
            println!(
                "Nodes:  {} total, {} online, {} offline, {} draining, workers {}/{}",
                n.total, n.online, n.offline, n.draining, n.used_capacity, n.total_capacity
            );
            println!(
                "Tasks:  {} total, {} pending, {} claimed, {} running, {} completed, {} failed, {} orphaned",
                t.total, t.pending, t.claimed, t.running, t.completed, t.failed, t.orphaned
            );
            println!("Event subscribers: {}", stats.event_subscribers);
        }
        Commands::State { repo } => {
            let state = client.repo_state(&repo).await?;
            if json {
                return print_json(&state);
            }
            println!("Repository {}: {} pending tasks", state.repo, state.pending_tasks);
            print_nodes(&state.nodes);
            println!("Agents ({}):", state.agents.len());
            for agent in &state.agents {
                println!("  {:<24}  {:<12}", agent.name, agent.agent_type.as_str());
            }
        }
        Commands::Nodes { status, labels } => {
            let nodes = client
                .list_nodes(status.as_deref(), &labels.into_iter().collect())
                .await?;
            if json {
                return print_json(&nodes);
            }
            print_nodes(&nodes);
        }
        Commands::Register {
            node_id,
            hostname,
            max_workers,
            labels,
        } => {
            let mut req = RegisterRequest::new(node_id, hostname, max_workers);
            req.labels = labels.into_iter().collect::<HashMap<_, _>>();
            let resp = client.register_node(&req).await?;
            if json {
                return print_json(&resp);
            }
            println!("Registered:");
            println!("  Registration: {}", resp.registration_id);
            println!("  Heartbeat:    every {}s", resp.heartbeat_interval_secs);
        }
        Commands::Unregister { registration_id } => {
            let resp = client
                .unregister_node(&RegistrationId::new(registration_id))
                .await?;
            if json {
                return print_json(&resp);
            }
            println!("Node {} unregistered", resp.node_id);
        }
        Commands::ListTasks { status } => {
            let tasks = client.list_tasks(status).await?;
            if json {
                return print_json(&tasks);
            }
            print_tasks(&tasks);
        }
        Commands::Pending { labels } => {
            let tasks = client.pending_tasks(&labels.into_iter().collect()).await?;
            if json {
                return print_json(&tasks);
            }
            print_tasks(&tasks);
        }
        Commands::CreateTask {
            repo,
            description,
            priority,
            labels,
        } => {
            let mut req = CreateTaskRequest::new(repo, description);
            req.priority = priority;
            req.labels = labels.into_iter().collect();
            let task = client.create_task(&req).await?;
            if json {
                return print_json(&task);
            }
            println!("Task created:");
            print_task(&task);
        }
        Commands::GetTask { id } => {
            let task = client.get_task(&id.into()).await?;
            if json {
                return print_json(&task);
            }
            print_task(&task);
        }
        Commands::Claim {
            id,
            registration_id,
            worker,
        } => {
            let resp = client
                .claim_task(&id.into(), &registration_id.into(), &worker)
                .await?;
            if json {
                return print_json(&resp);
            }
            match (resp.claimed, resp.task) {
                (true, Some(task)) => {
                    println!("Task claimed:");
                    print_task(&task);
                }
                _ => println!(
                    "Not claimed: {}",
                    resp.error.as_deref().unwrap_or("unknown reason")
                ),
            }
        }
        Commands::UpdateTask { id, status } => {
            let task = client
                .update_task(&id.into(), &UpdateTaskRequest::status(status))
                .await?;
            if json {
                return print_json(&task);
            }
            println!("Task updated:");
            print_task(&task);
        }
        Commands::Release { id } => {
            let task = client.release_task(&id.into()).await?;
            if json {
                return print_json(&task);
            }
            println!("Task released:");
            print_task(&task);
        }
        Commands::DeleteTask { id } => {
            let task = client.delete_task(&id.into()).await?;
            if json {
                return print_json(&task);
            }
            println!("Task {} deleted", task.id);
        }
        Commands::Agents { repo } => {
            let agents = client.list_agents(repo.as_deref()).await?;
            if json {
                return print_json(&agents);
            }
            println!("Agents ({}):", agents.len());
            println!("{:<24}  {:<24}  {:<12}  {}", "REPO", "NAME", "TYPE", "STATUS");
            println!("{}", "-".repeat(80));
            for agent in agents {
                println!(
                    "{:<24}  {:<24}  {:<12}  {:?}",
                    agent.repo, agent.name, agent.agent_type.as_str(), agent.status
                );
            }
        }
    }

    Ok(())
}

fn parse_label(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => Err(format!("expected key=value, got '{s}'")),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_nodes(nodes: &[Node]) {
    println!("Nodes ({}):", nodes.len());
    println!("{:<24}  {:<10}  {:<8}  {}", "ID", "STATUS", "WORKERS", "LAST SEEN");
    println!("{}", "-".repeat(80));
    for node in nodes {
        let workers = format!(
            "{}/{}",
            node.capacity.current_workers, node.capacity.max_workers
        );
        println!(
            "{:<24}  {:<10}  {:<8}  {}",
            node.id.as_str(),
            node.status.as_str(),
            workers,
            format_timestamp(&node.last_seen)
        );
    }
}

fn print_tasks(tasks: &[Task]) {
    println!("Tasks ({}):", tasks.len());
    println!(
        "{:<36}  {:<10}  {:<8}  {:<20}  {}",
        "ID", "STATUS", "PRIORITY", "REPO", "CREATED"
    );
    println!("{}", "-".repeat(100));
    for task in tasks {
        println!(
            "{:<36}  {:<10}  {:<8}  {:<20}  {}",
            task.id.as_str(),
            task.status.as_str(),
            task.priority.as_str(),
            task.repo,
            format_timestamp(&task.created_at)
        );
    }
}

fn print_task(task: &Task) {
    println!("  ID:          {}", task.id);
    println!("  Repo:        {}", task.repo);
    println!("  Description: {}", task.description);
    println!("  Priority:    {}", task.priority);
    println!("  Status:      {}", task.status);
    println!("  Created:     {}", format_timestamp(&task.created_at));
    if let Some(claimed_by) = &task.claimed_by {
        println!("  Claimed by:  {claimed_by}");
    }
    if !task.labels.is_empty() {
        let mut labels: Vec<String> = task.labels.iter().map(|(k, v)| format!("{k}={v}")).collect();
        labels.sort();
        println!("  Labels:      {}", labels.join(", "));
    }
    if let Some(result) = &task.result {
        println!(
            "  Result:      {}",
            if result.success { "success" } else { "failure" }
        );
        if let Some(url) = &result.pr_url {
            println!("  PR:          {url}");
        }
        if let Some(error) = &result.error {
            println!("  Error:       {error}");
        }
    }
}

fn format_timestamp(ts: &chrono::DateTime<chrono::Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_label() {
        assert_eq!(
            parse_label("os=linux").unwrap(),
            ("os".to_string(), "linux".to_string())
        );
        assert_eq!(
            parse_label("zone=eu=west").unwrap(),
            ("zone".to_string(), "eu=west".to_string())
        );
        assert!(parse_label("nolabel").is_err());
        assert!(parse_label("=x").is_err());
    }

    #[test]
    fn test_parse_create_task() {
        let cli = Cli::try_parse_from([
            "taskmesh",
            "create-task",
            "--repo",
            "acme/api",
            "--description",
            "fix bug",
            "--priority",
            "high",
            "-l",
            "os=linux",
        ])
        .unwrap();
        match cli.command {
            Commands::CreateTask {
                repo,
                priority,
                labels,
                ..
            } => {
                assert_eq!(repo, "acme/api");
                assert_eq!(priority, Some(Priority::High));
                assert_eq!(labels, vec![("os".to_string(), "linux".to_string())]);
            }
            _ => panic!("wrong subcommand"),
        }
    }
}

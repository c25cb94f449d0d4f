//! CLI command handlers.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use comfy_table::{presets::UTF8_FULL, Table};
use console::style;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::adapters::sqlite::{create_pool, run_migrations, PoolConfig, SqliteMemoryStore};
use crate::domain::errors::DomainResult;
use crate::domain::models::{
    tier_of, Agent, AgentFitness, AgentRole, AgentTraits, ComplexTask, DeploymentStrategy,
    MemoryEntry, MemoryMetadata, MemoryQuery, SubTask, TIER_ORDER,
};
use crate::domain::ports::SharedMemoryStore;
use crate::infrastructure::Config;
use crate::services::{
    DeploymentController, ExecutionMode, SubtaskRunner, SwarmConfig, SwarmCoordinator,
};
use anyhow::{anyhow, Result};

pub fn handle_tier(balance: f64, json_output: bool) {
    let tier = tier_of(balance);
    if json_output {
        println!(
            "{}",
            json!({
                "balance": balance,
                "tier": tier.as_str(),
                "model": tier.model_id(),
                "can_replicate": tier.can_replicate(),
                "can_experiment": tier.can_experiment(),
                "capabilities": tier.capabilities(),
            })
        );
        return;
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec![
        "tier",
        "floor",
        "model",
        "replicate",
        "experiment",
    ]);
    for candidate in TIER_ORDER {
        let marker = if candidate == tier { "→ " } else { "  " };
        table.add_row(vec![
            format!("{marker}{}", candidate.as_str()),
            format!("{}", candidate.min_balance()),
            candidate.model_id().to_string(),
            candidate.can_replicate().to_string(),
            candidate.can_experiment().to_string(),
        ]);
    }
    println!("balance {balance} → {}", style(tier.as_str()).bold());
    println!("{table}");
}

async fn open_store(config: &Config) -> Result<SqliteMemoryStore> {
    let pool = create_pool(
        &config.database.url,
        PoolConfig {
            max_connections: config.database.max_connections,
            ..PoolConfig::default()
        },
    )
    .await?;
    run_migrations(&pool).await?;
    Ok(SqliteMemoryStore::new(pool))
}

fn print_entries(entries: &[MemoryEntry], json_output: bool) {
    if json_output {
        println!("{}", serde_json::to_string_pretty(entries).unwrap_or_default());
        return;
    }
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["id", "key", "value", "created", "expires"]);
    for entry in entries {
        table.add_row(vec![
            entry.id.to_string(),
            entry.key.clone(),
            entry.value.to_string(),
            entry.created_at.to_rfc3339(),
            entry
                .expires_at
                .map_or_else(|| "-".to_string(), |t| t.to_rfc3339()),
        ]);
    }
    println!("{table}");
}

#[allow(clippy::too_many_arguments)]
pub async fn handle_memory_store(
    config: &Config,
    key: &str,
    raw_value: &str,
    tags: Vec<String>,
    context: Option<String>,
    ttl_secs: Option<i64>,
    json_output: bool,
) -> Result<()> {
    let store = open_store(config).await?;
    let value: Value =
        serde_json::from_str(raw_value).map_err(|e| anyhow!("value is not valid JSON: {e}"))?;
    let metadata = MemoryMetadata {
        tags,
        context,
        ..MemoryMetadata::default()
    };
    let expires_at = ttl_secs.map(|secs| Utc::now() + ChronoDuration::seconds(secs));

    let entry = store.store(key, value, metadata, None, expires_at).await?;
    print_entries(std::slice::from_ref(&entry), json_output);
    Ok(())
}

pub async fn handle_memory_get(config: &Config, key: &str, json_output: bool) -> Result<()> {
    let store = open_store(config).await?;
    match store.get(key).await? {
        Some(entry) => print_entries(std::slice::from_ref(&entry), json_output),
        None => println!("{}", style("no entry").dim()),
    }
    Ok(())
}

pub async fn handle_memory_all(config: &Config, key: &str, json_output: bool) -> Result<()> {
    let store = open_store(config).await?;
    let entries = store.get_all(key).await?;
    print_entries(&entries, json_output);
    Ok(())
}

pub async fn handle_memory_query(
    config: &Config,
    context: Option<String>,
    tags: Vec<String>,
    limit: usize,
    json_output: bool,
) -> Result<()> {
    let store = open_store(config).await?;
    let mut query = MemoryQuery::new().limit(limit);
    if let Some(context) = context {
        query = query.context(context);
    }
    for tag in tags {
        query = query.with_tag(tag);
    }
    let entries = store.query(query).await?;
    print_entries(&entries, json_output);
    Ok(())
}

pub async fn handle_memory_cleanup(config: &Config, json_output: bool) -> Result<()> {
    let store = open_store(config).await?;
    let removed = store.cleanup_expired().await?;
    if json_output {
        println!("{}", json!({ "removed": removed }));
    } else {
        println!("removed {removed} expired entries");
    }
    Ok(())
}

/// Demo runner: completes each subtask with a record of who ran it.
struct DemoRunner;

#[async_trait]
impl SubtaskRunner for DemoRunner {
    async fn run(&self, subtask: &SubTask, agent: &Agent) -> DomainResult<Value> {
        Ok(json!({
            "subtask": subtask.id,
            "agent": agent.name,
            "role": subtask.required_role.map(|r| r.as_str()),
            "model": agent.tier().model_id(),
        }))
    }
}

fn demo_agents() -> Vec<Agent> {
    let fit = AgentFitness {
        survival: 0.8,
        earnings: 0.7,
        offspring: 0.2,
        adaptation: 0.6,
        innovation: 0.5,
    };
    let mut agents = Vec::new();
    for role in [
        AgentRole::Researcher,
        AgentRole::Coder,
        AgentRole::Trader,
        AgentRole::Coordinator,
    ] {
        let profile = role.profile();
        let mut traits = AgentTraits::default();
        for cap in profile.required_capabilities {
            traits = traits.with_skill(*cap);
        }
        for tool in profile.preferred_tools {
            traits = traits.with_tool(*tool);
        }
        agents.push(
            Agent::new(format!("{}-1", role.as_str()), 5.0)
                .with_traits(traits)
                .with_experience(profile.min_experience)
                .with_fitness(fit),
        );
    }
    agents
}

pub async fn handle_swarm(
    config: &Config,
    description: &str,
    requirements: Vec<String>,
    sequential: bool,
    json_output: bool,
) -> Result<()> {
    let store = Arc::new(open_store(config).await?);
    let mut swarm_config: SwarmConfig = config.swarm_config();
    if sequential {
        swarm_config.execution_mode = ExecutionMode::Sequential;
    }
    let coordinator = SwarmCoordinator::new(store, Arc::new(DemoRunner), swarm_config);

    let mut task = ComplexTask::new(Uuid::new_v4().to_string(), description);
    for requirement in requirements {
        task = task.with_requirement(requirement);
    }

    let mut agents = demo_agents();
    let result = coordinator
        .coordinate(&task, &mut agents, Uuid::new_v4(), None)
        .await;

    if json_output {
        println!(
            "{}",
            json!({
                "task_id": result.task_id,
                "success": result.success,
                "results": result.subtask_results,
                "output": result.output,
                "errors": result.errors,
                "duration_ms": result.duration_ms,
            })
        );
        return Ok(());
    }

    println!(
        "task {} {} in {} ms",
        result.task_id,
        if result.success {
            style("succeeded").green().to_string()
        } else {
            style("failed").red().to_string()
        },
        result.duration_ms
    );
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["subtask", "result"]);
    for (id, value) in &result.subtask_results {
        table.add_row(vec![id.clone(), value.to_string()]);
    }
    println!("{table}");
    for error in &result.errors {
        println!("{} {error}", style("error:").red());
    }
    Ok(())
}

pub async fn handle_deploy(
    config: &Config,
    version: &str,
    strategy: &str,
    json_output: bool,
) -> Result<()> {
    let strategy = DeploymentStrategy::parse_str(strategy)
        .ok_or_else(|| anyhow!("unknown strategy: {strategy}"))?;
    let mut controller = DeploymentController::new(
        config.deployment_config(),
        Arc::new(crate::services::AlwaysHealthy),
    );
    let mut events = controller.subscribe();

    let result = controller.deploy(version, strategy).await;
    let stats = controller.stats();

    if json_output {
        println!(
            "{}",
            json!({
                "success": result.success,
                "status": result.final_status.as_str(),
                "failed_requests": result.failed_requests,
                "total_requests": result.total_requests,
                "duration_ms": result.deployment_time_ms,
                "error": result.error,
                "stats": { "total": stats.total, "failed": stats.failed, "success_rate": stats.success_rate },
            })
        );
        return Ok(());
    }

    while let Ok(event) = events.try_recv() {
        println!("{} {}", style("event").dim(), json!(event));
    }
    println!(
        "deployment of {version} via {}: {}",
        strategy.as_str(),
        if result.success {
            style("completed with zero drops").green().to_string()
        } else {
            style(format!("failed ({})", result.error.unwrap_or_default()))
                .red()
                .to_string()
        }
    );
    println!(
        "stats: {}/{} succeeded ({:.0}%)",
        stats.total - stats.failed,
        stats.total,
        stats.success_rate
    );
    Ok(())
}

//! CLI interface module
//!
//! Command definitions and handlers for the thin demo surface over the
//! orchestration library: tier classification, shared memory access,
//! swarm runs, and deployment drills.

pub mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "swarmlord", about = "Agent orchestration substrate", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Emit machine-readable JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    /// Path to a config file (defaults to .swarmlord/config.yaml)
    #[arg(long, global = true)]
    pub config: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Classify a balance into its survival tier
    Tier {
        /// Balance to classify
        balance: f64,
    },
    /// Shared memory operations
    #[command(subcommand)]
    Memory(MemoryCommands),
    /// Run a demo swarm over a described task
    Swarm {
        /// Task description
        description: String,
        /// Requirements, one subtask each
        #[arg(short, long)]
        requirement: Vec<String>,
        /// Run subtasks one at a time
        #[arg(long)]
        sequential: bool,
    },
    /// Drive a deployment drill
    Deploy {
        /// Version label to deploy
        version: String,
        /// Strategy: blue-green, rolling, or canary
        #[arg(long, default_value = "blue-green")]
        strategy: String,
    },
}

#[derive(Subcommand)]
pub enum MemoryCommands {
    /// Store a new entry under a key
    Store {
        key: String,
        /// JSON value
        value: String,
        #[arg(short, long)]
        tag: Vec<String>,
        #[arg(long)]
        context: Option<String>,
        /// Expire after this many seconds
        #[arg(long)]
        ttl_secs: Option<i64>,
    },
    /// Latest entry for a key
    Get { key: String },
    /// All entries for a key, newest first
    All { key: String },
    /// Query entries by context and tags
    Query {
        #[arg(long)]
        context: Option<String>,
        #[arg(short, long)]
        tag: Vec<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Delete expired entries
    Cleanup,
}

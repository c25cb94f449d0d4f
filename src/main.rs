//! Swarmlord CLI entry point

use anyhow::Result;
use clap::Parser;

use swarmlord::cli::{commands, Cli, Commands, MemoryCommands};
use swarmlord::infrastructure::{logging, Config, ConfigLoader};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config: Config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };
    let _log_guard = logging::init(&config.logging)?;

    match cli.command {
        Commands::Tier { balance } => {
            commands::handle_tier(balance, cli.json);
        }
        Commands::Memory(memory) => match memory {
            MemoryCommands::Store {
                key,
                value,
                tag,
                context,
                ttl_secs,
            } => {
                commands::handle_memory_store(
                    &config, &key, &value, tag, context, ttl_secs, cli.json,
                )
                .await?;
            }
            MemoryCommands::Get { key } => {
                commands::handle_memory_get(&config, &key, cli.json).await?;
            }
            MemoryCommands::All { key } => {
                commands::handle_memory_all(&config, &key, cli.json).await?;
            }
            MemoryCommands::Query {
                context,
                tag,
                limit,
            } => {
                commands::handle_memory_query(&config, context, tag, limit, cli.json).await?;
            }
            MemoryCommands::Cleanup => {
                commands::handle_memory_cleanup(&config, cli.json).await?;
            }
        },
        Commands::Swarm {
            description,
            requirement,
            sequential,
        } => {
            commands::handle_swarm(&config, &description, requirement, sequential, cli.json)
                .await?;
        }
        Commands::Deploy { version, strategy } => {
            commands::handle_deploy(&config, &version, &strategy, cli.json).await?;
        }
    }

    Ok(())
}

//! vers-fleet CLI entry point

use anyhow::{Context, Result};
use clap::Parser;

use vers_fleet::cli::commands::{lieutenant, swarm};
use vers_fleet::cli::service::FleetServices;
use vers_fleet::cli::{Cli, Commands, LieutenantCommands, SwarmCommands};
use vers_fleet::infrastructure::config::ConfigLoader;
use vers_fleet::infrastructure::logging::LoggerImpl;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::load().context("failed to load configuration")?;
    let _logger = LoggerImpl::init(&config.logging).context("failed to initialize logger")?;

    let services = FleetServices::build(&config, None).context("failed to bootstrap fleet services")?;

    match cli.command {
        Commands::Swarm(SwarmCommands::Run { commit_id, count, tasks, labels, api_key, model, timeout_secs }) => {
            swarm::handle_run(
                &services,
                &commit_id,
                count,
                &tasks,
                labels,
                api_key.as_deref(),
                model.as_deref(),
                timeout_secs,
                cli.json,
            )
            .await?;
        }
        Commands::Lieutenant(cmd) => {
            services.reconnect().await.context("failed to reconnect lieutenant state")?;

            match cmd {
                LieutenantCommands::Create { name, role, commit_id, api_key, model, local } => {
                    lieutenant::handle_create(
                        &services,
                        &name,
                        &role,
                        commit_id.as_deref(),
                        api_key.as_deref(),
                        model.as_deref(),
                        local,
                        cli.json,
                    )
                    .await?;
                }
                LieutenantCommands::Send { name, message, mode } => {
                    lieutenant::handle_send(&services, &name, &message, mode, cli.json).await?;
                }
                LieutenantCommands::Pause { name } => {
                    lieutenant::handle_pause(&services, &name, cli.json).await?;
                }
                LieutenantCommands::Resume { name } => {
                    lieutenant::handle_resume(&services, &name, cli.json).await?;
                }
                LieutenantCommands::Destroy { name } => {
                    lieutenant::handle_destroy(&services, &name, cli.json).await?;
                }
                LieutenantCommands::List => {
                    lieutenant::handle_list(&services, cli.json).await?;
                }
                LieutenantCommands::Discover => {
                    lieutenant::handle_discover(&services, cli.json).await?;
                }
            }
        }
    }

    Ok(())
}

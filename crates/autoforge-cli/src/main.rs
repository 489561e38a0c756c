//! autoforge CLI.

use anyhow::Context;
use autoforge_config::SystemConfig;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "autoforge")]
#[command(about = "Unattended discover, build and publish pipeline", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "AUTOFORGE_LOG_JSON")]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List candidate ideas, best first
    Discover {
        /// Maximum number of ideas to show
        #[arg(long, default_value = "5")]
        limit: usize,
    },
    /// Build and publish a single idea now
    Develop {
        /// Project name, turned into a slug
        #[arg(long)]
        name: String,
        /// What the project should do
        #[arg(long)]
        description: String,
        /// Project type, e.g. cli_app or security_tool
        #[arg(long = "type", default_value = "cli_app")]
        project_type: String,
    },
    /// Run the pipeline on its schedule
    Scheduler {
        /// Run the pipeline once and exit
        #[arg(long, conflicts_with = "daemon")]
        once: bool,
        /// Keep running until interrupted (default)
        #[arg(long)]
        daemon: bool,
    },
    /// Check configuration, credentials and backend health
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    let config = SystemConfig::from_env().context("Failed to load configuration")?;

    match cli.command {
        Commands::Discover { limit } => {
            commands::discover::run(&config, limit).await?;
        }
        Commands::Develop {
            name,
            description,
            project_type,
        } => {
            commands::develop::run(config, &name, &description, &project_type).await?;
        }
        Commands::Scheduler { once, daemon: _ } => {
            if once {
                commands::scheduler::run_once(config).await?;
            } else {
                commands::scheduler::run_daemon(config).await?;
            }
        }
        Commands::Check => {
            commands::check::run(&config).await?;
        }
    }

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "ailink")]
#[command(about = "Coordination bus for independent software agents", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize ailink configuration and storage
    Onboard {
        /// Force overwrite existing configuration
        #[arg(long)]
        force: bool,
    },

    /// Show configuration and bus contents
    Status,

    /// Run the bus scheduler (long-running daemon)
    Serve,

    /// Run an echo agent that registers, polls its mailbox, and answers requests
    Agent {
        /// Agent id
        #[arg(long)]
        id: String,

        /// Display name (defaults to the id)
        #[arg(long)]
        name: Option<String>,

        /// Comma-separated capability tags (e.g. "price,flash-loan")
        #[arg(long, default_value = "")]
        capabilities: String,
    },

    /// Invoke one bus operation by name with JSON arguments
    Call {
        /// Operation name (e.g. register_ai, submit_task, list_tasks)
        operation: String,

        /// Arguments as a JSON object
        #[arg(default_value = "{}")]
        args: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Onboard { force } => {
            commands::onboard::run(force).await?;
        }
        Commands::Status => {
            commands::status::run().await?;
        }
        Commands::Serve => {
            commands::serve::run().await?;
        }
        Commands::Agent {
            id,
            name,
            capabilities,
        } => {
            commands::agent::run(&id, name.as_deref(), &capabilities).await?;
        }
        Commands::Call { operation, args } => {
            commands::call::run(&operation, &args).await?;
        }
    }

    Ok(())
}

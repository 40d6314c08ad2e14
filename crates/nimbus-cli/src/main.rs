//! `nimbus` -- CLI binary for the nimbus assistant platform.
//!
//! Provides the following subcommands:
//!
//! - `nimbus serve` -- Run the REST + WebSocket gateway.
//! - `nimbus chat` -- Interactive chat session in the terminal.
//! - `nimbus models` -- Show the model catalog and what the daemon serves.
//! - `nimbus config` -- Inspect the resolved configuration.

use clap::{Parser, Subcommand};

mod commands;

/// nimbus AI assistant CLI.
#[derive(Parser)]
#[command(name = "nimbus", about = "nimbus AI assistant CLI", version)]
struct Cli {
    /// Enable verbose (debug-level) logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path (overrides `~/.nimbus/config.toml`).
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Run the API gateway.
    Serve {
        /// Bind address (overrides config).
        #[arg(long)]
        host: Option<String>,

        /// Bind port (overrides config).
        #[arg(long)]
        port: Option<u16>,
    },

    /// Start an interactive chat session.
    Chat {
        /// Resume an existing session by id.
        #[arg(long)]
        session: Option<String>,

        /// User id used for episodic memory.
        #[arg(long)]
        user: Option<String>,
    },

    /// Show the model catalog.
    Models,

    /// Show resolved configuration.
    Config {
        #[command(subcommand)]
        action: ConfigCmd,
    },
}

/// Subcommands for `nimbus config`.
#[derive(Subcommand)]
enum ConfigCmd {
    /// Show the full resolved configuration.
    Show,

    /// Print the config file path.
    Path,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins, then LOG_LEVEL, then the flag default.
    let default_filter = if cli.verbose {
        "debug".to_string()
    } else {
        std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into())
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    match cli.command {
        Commands::Serve { host, port } => {
            commands::serve::run(cli.config.as_deref(), host, port).await?
        }
        Commands::Chat { session, user } => {
            commands::chat::run(cli.config.as_deref(), session, user).await?
        }
        Commands::Models => commands::models::run(cli.config.as_deref()).await?,
        Commands::Config { action } => match action {
            ConfigCmd::Show => commands::config_cmd::show(cli.config.as_deref())?,
            ConfigCmd::Path => commands::config_cmd::path(),
        },
    }

    Ok(())
}

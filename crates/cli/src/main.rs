//! Charmline CLI: the main entry point.
//!
//! Commands:
//! - `init`: Write a default config file
//! - `serve`: Start the HTTP gateway
//! - `chat`: Talk to a persona from the terminal
//! - `personas`: List the persona catalog
//! - `status`: Show the resolved configuration

use charmline_core::Backend;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "charmline",
    about = "Charmline — persona chat with impression scoring",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,

    /// Keep conversations in memory instead of the configured store
    #[arg(long, global = true)]
    ephemeral: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config to ~/.charmline/config.toml
    Init,

    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Chat with a persona
    Chat {
        /// Persona id from the catalog
        persona: String,

        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Backend for this session (openai or anthropic)
        #[arg(short, long)]
        backend: Option<Backend>,

        /// Continue an existing conversation
        #[arg(short, long)]
        conversation: Option<String>,
    },

    /// List personas in the catalog
    Personas,

    /// Show configuration and store status
    Status,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    let ephemeral = cli.ephemeral;
    match cli.command {
        Commands::Init => commands::init::run().await?,
        Commands::Serve { port } => commands::serve::run(port, ephemeral).await?,
        Commands::Chat {
            persona,
            message,
            backend,
            conversation,
        } => {
            let options = commands::chat::ChatOptions {
                persona,
                message,
                backend,
                conversation,
            };
            commands::chat::run(options, ephemeral).await?
        }
        Commands::Personas => commands::personas::run(ephemeral).await?,
        Commands::Status => commands::status::run(ephemeral).await?,
    }

    Ok(())
}

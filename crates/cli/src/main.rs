//! Tierwise CLI: the main entry point.
//!
//! Commands:
//! - `tiers`  : Show the tier table and skill mapping
//! - `route`  : Show which tier a request would be routed to
//! - `search` : Query the configured corpus
//! - `ask`    : Run one request through the full pipeline
//! - `serve`  : Start the HTTP gateway
//! - `doctor` : Diagnose configuration and backend health

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "tierwise",
    about = "Tierwise — tiered LLM routing with budgeted context assembly",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the tier table and skill mapping
    Tiers,

    /// Show the routing decision for a skill and context size
    Route {
        /// Skill identifier (e.g. correcteur, tuteur, titreur)
        #[arg(short, long)]
        skill: String,

        /// Estimated context size in tokens
        #[arg(short, long, default_value_t = 0)]
        tokens: usize,

        #[arg(short, long)]
        user: Option<String>,

        /// Request a streaming response
        #[arg(long)]
        stream: bool,
    },

    /// Search the configured corpus
    Search {
        #[arg(short, long)]
        query: String,

        #[arg(short, long, default_value_t = 5)]
        limit: usize,

        /// Favour passages from this work
        #[arg(long)]
        work: Option<String>,

        /// Favour passages under this thematic path
        #[arg(long)]
        path: Option<String>,
    },

    /// Send one message through retrieval, routing, assembly and generation
    Ask {
        #[arg(short, long)]
        skill: String,

        #[arg(short, long)]
        message: String,

        /// Retrieval query (defaults to no retrieval)
        #[arg(short, long)]
        query: Option<String>,

        #[arg(long, default_value = "")]
        system: String,

        /// Print chunks as they arrive
        #[arg(long)]
        stream: bool,
    },

    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Diagnose system health
    Doctor,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Tiers => commands::tiers::run().await?,
        Commands::Route {
            skill,
            tokens,
            user,
            stream,
        } => commands::route::run(skill, tokens, user, stream).await?,
        Commands::Search {
            query,
            limit,
            work,
            path,
        } => commands::search::run(query, limit, work, path).await?,
        Commands::Ask {
            skill,
            message,
            query,
            system,
            stream,
        } => commands::ask::run(skill, message, query, system, stream).await?,
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}

pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "eventmaster")]
#[command(about = "EventMaster CLI - serve, migrate and administer the Event/Master API")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the API server")]
    Serve {
        #[arg(long, help = "Port to listen on (defaults to the configured port)")]
        port: Option<u16>,
    },

    #[command(about = "Create collection tables and indexes in Postgres")]
    Migrate,

    #[command(about = "User account administration")]
    User {
        #[command(subcommand)]
        cmd: commands::user::UserCommands,
    },

    #[command(about = "Mint a bearer token for a user")]
    Token {
        #[arg(long, help = "User id (24 hex digits)")]
        user_id: String,
        #[arg(long, help = "Platform the token is valid for (admin|device)")]
        platform: String,
        #[arg(long, default_value = "admin", help = "Role claim")]
        role: String,
    },

    #[command(about = "Check a running server's /health endpoint")]
    Health {
        #[arg(long, help = "Server base URL (defaults to http://localhost:<port>)")]
        url: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

/// `RUST_LOG` wins; otherwise info for the crate and tower-http
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command {
        Commands::Serve { port } => commands::serve::handle(port).await,
        Commands::Migrate => commands::migrate::handle(output_format).await,
        Commands::User { cmd } => commands::user::handle(cmd, output_format).await,
        Commands::Token { user_id, platform, role } => {
            commands::token::handle(&user_id, &platform, &role, output_format)
        }
        Commands::Health { url } => commands::health::handle(url, output_format).await,
    }
}

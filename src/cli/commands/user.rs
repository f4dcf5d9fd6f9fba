use std::sync::Arc;

use anyhow::Context;
use clap::Subcommand;

use crate::cli::utils::{output_error, output_success};
use crate::cli::OutputFormat;
use crate::config::StoreBackend;
use crate::database::open_store;
use crate::services::{NewUser, UserService};

#[derive(Subcommand)]
pub enum UserCommands {
    #[command(about = "Create an active user account")]
    Add {
        #[arg(long, help = "Username")]
        username: String,
        #[arg(long, help = "Email")]
        email: String,
        #[arg(long, help = "Password (stored as a bcrypt hash)")]
        password: String,
        #[arg(long, default_value = "admin", help = "Role (admin|system_user|user)")]
        role: String,
        #[arg(long, help = "Display name")]
        name: Option<String>,
    },
}

pub async fn handle(cmd: UserCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        UserCommands::Add { username, email, password, role, name } => {
            if crate::config::config().database.backend == StoreBackend::Memory {
                tracing::warn!("DATABASE_BACKEND is memory; the user will not outlive this process");
            }
            let store = open_store().await.context("failed to open document store")?;
            let users = UserService::new(Arc::clone(&store));
            match users.create_user(NewUser { username, email, password, role, name }).await {
                Ok(user) => output_success(output_format, "User created", Some(user)),
                Err(e) => {
                    output_error(output_format, &e.to_string(), None)?;
                    Err(anyhow::anyhow!("user creation failed"))
                }
            }
        }
    }
}

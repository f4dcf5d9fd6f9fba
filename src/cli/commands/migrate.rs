use anyhow::Context;
use serde_json::json;

use crate::cli::utils::output_success;
use crate::cli::OutputFormat;
use crate::database::manager::COLLECTIONS;
use crate::database::DatabaseManager;

pub async fn handle(output_format: OutputFormat) -> anyhow::Result<()> {
    let pool = DatabaseManager::main_pool().await.context("failed to connect to Postgres")?;
    DatabaseManager::migrate(&pool).await.context("migration failed")?;
    DatabaseManager::close_all().await;

    output_success(
        output_format,
        "Collections migrated",
        Some(json!({ "collections": COLLECTIONS })),
    )
}

use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, PgPool};
use tokio::sync::RwLock;
use tracing::info;

use crate::config::CONFIG;
use crate::database::document::unique_fields;
use crate::database::store::DatabaseError;

/// Collections that get a table on migrate
pub const COLLECTIONS: &[&str] = &["user", "master", "event"];

/// Process-wide Postgres pool holder
pub struct DatabaseManager {
    pool: RwLock<Option<PgPool>>,
}

impl DatabaseManager {
    fn instance() -> &'static DatabaseManager {
        use std::sync::OnceLock;
        static INSTANCE: OnceLock<DatabaseManager> = OnceLock::new();
        INSTANCE.get_or_init(|| DatabaseManager { pool: RwLock::new(None) })
    }

    /// Get the shared pool, connecting lazily on first use
    pub async fn main_pool() -> Result<PgPool, DatabaseError> {
        let manager = Self::instance();
        {
            let pool = manager.pool.read().await;
            if let Some(pool) = pool.as_ref() {
                return Ok(pool.clone());
            }
        }

        let mut slot = manager.pool.write().await;
        if let Some(pool) = slot.as_ref() {
            return Ok(pool.clone());
        }

        let connection_string = Self::build_connection_string()?;
        let pool = PgPoolOptions::new()
            .max_connections(CONFIG.database.max_connections)
            .acquire_timeout(Duration::from_secs(CONFIG.database.connection_timeout))
            .connect(&connection_string)
            .await?;

        info!("Created database pool for: {}", Self::redact(&connection_string));
        *slot = Some(pool.clone());
        Ok(pool)
    }

    fn build_connection_string() -> Result<String, DatabaseError> {
        let base = CONFIG
            .database
            .url
            .clone()
            .ok_or(DatabaseError::ConfigMissing("DATABASE_URL"))?;
        let url = url::Url::parse(&base).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;
        if !matches!(url.scheme(), "postgres" | "postgresql") {
            return Err(DatabaseError::InvalidDatabaseUrl);
        }
        Ok(url.into())
    }

    /// Connection string with the password masked, for logs
    pub fn redact(connection_string: &str) -> String {
        match url::Url::parse(connection_string) {
            Ok(mut url) => {
                if url.password().is_some() {
                    let _ = url.set_password(Some("****"));
                }
                url.into()
            }
            Err(_) => "<invalid url>".to_string(),
        }
    }

    /// Pings the pool to ensure connectivity
    pub async fn health_check() -> Result<(), DatabaseError> {
        let pool = Self::main_pool().await?;
        sqlx::query("SELECT 1").execute(&pool).await?;
        Ok(())
    }

    /// Create every collection table and its unique indexes
    pub async fn migrate(pool: &PgPool) -> Result<(), DatabaseError> {
        for statement in Self::migration_statements() {
            sqlx::query(&statement).execute(pool).await?;
        }
        info!("Migrated collections: {}", COLLECTIONS.join(", "));
        Ok(())
    }

    fn migration_statements() -> Vec<String> {
        let mut statements = Vec::new();
        for collection in COLLECTIONS {
            let table = Self::quote_identifier(collection);
            statements.push(format!(
                "CREATE TABLE IF NOT EXISTS {} (seq BIGSERIAL, id TEXT PRIMARY KEY, doc JSONB NOT NULL)",
                table
            ));
            for field in unique_fields(collection) {
                statements.push(format!(
                    "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} ((doc->>'{}'))",
                    Self::quote_identifier(&format!("{}_{}_unique", collection, field)),
                    table,
                    field
                ));
            }
        }
        statements
    }

    /// Quote SQL identifier to prevent injection
    fn quote_identifier(name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Close and drop the pool (e.g., on shutdown)
    pub async fn close_all() {
        let mut slot = Self::instance().pool.write().await;
        if let Some(pool) = slot.take() {
            pool.close().await;
            info!("Closed database pool");
        }
    }
}

pub mod document;
pub mod manager;
pub mod memory;
pub mod pagination;
pub mod postgres;
pub mod store;

use std::sync::Arc;

use tracing::info;

use crate::config::{StoreBackend, CONFIG};

pub use document::{Document, ObjectId, ID_FIELD};
pub use manager::DatabaseManager;
pub use memory::MemoryStore;
pub use pagination::{paginate, Page, PageOptions, Paginator};
pub use postgres::PgStore;
pub use store::{DatabaseError, DocumentStore, FindOptions, WriteOp};

/// Open the store selected by configuration
pub async fn open_store() -> Result<Arc<dyn DocumentStore>, DatabaseError> {
    match CONFIG.database.backend {
        StoreBackend::Memory => {
            info!("Using in-memory document store");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Postgres => {
            let pool = DatabaseManager::main_pool().await?;
            DatabaseManager::migrate(&pool).await?;
            Ok(Arc::new(PgStore::new(pool)))
        }
    }
}

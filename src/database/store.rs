use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::database::document::Document;
use crate::filter::{FilterError, FilterOrderInfo};

/// Errors from the document store layer
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("Duplicate key: {collection}.{field}")]
    DuplicateKey { collection: String, field: String },

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl From<FilterError> for DatabaseError {
    fn from(err: FilterError) -> Self {
        DatabaseError::QueryError(err.to_string())
    }
}

/// Sort/skip/limit for `find`
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub sort: Vec<FilterOrderInfo>,
    pub skip: u64,
    pub limit: Option<u64>,
}

/// One write of an atomic batch
#[derive(Debug, Clone)]
pub enum WriteOp {
    UpdateMany { collection: String, query: Value, set: Document },
    DeleteMany { collection: String, query: Value },
}

impl WriteOp {
    pub fn collection(&self) -> &str {
        match self {
            WriteOp::UpdateMany { collection, .. } | WriteOp::DeleteMany { collection, .. } => collection,
        }
    }
}

/// Generic repository over named collections, queried with MongoDB-style
/// query objects. Updates are shallow `$set`s of top-level fields.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    async fn ping(&self) -> Result<(), DatabaseError>;

    /// Insert one document; it must already carry `_id`
    async fn insert_one(&self, collection: &str, doc: Document) -> Result<Document, DatabaseError>;

    /// Insert all documents or none
    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<u64, DatabaseError>;

    async fn find_one(&self, collection: &str, query: &Value) -> Result<Option<Document>, DatabaseError>;

    async fn find(&self, collection: &str, query: &Value, options: &FindOptions) -> Result<Vec<Document>, DatabaseError>;

    async fn count(&self, collection: &str, query: &Value) -> Result<u64, DatabaseError>;

    /// Update the first match and return it as stored afterwards
    async fn update_one(&self, collection: &str, query: &Value, set: &Document) -> Result<Option<Document>, DatabaseError>;

    async fn update_many(&self, collection: &str, query: &Value, set: &Document) -> Result<u64, DatabaseError>;

    /// Delete the first match and return it
    async fn delete_one(&self, collection: &str, query: &Value) -> Result<Option<Document>, DatabaseError>;

    async fn delete_many(&self, collection: &str, query: &Value) -> Result<u64, DatabaseError>;

    /// Apply every write or none; returns the affected count per op
    async fn apply_batch(&self, ops: Vec<WriteOp>) -> Result<Vec<u64>, DatabaseError>;
}

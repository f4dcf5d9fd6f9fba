use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{PgPool, Postgres, Row};
use tracing::{debug, warn};

use crate::config::CONFIG;
use crate::database::document::{document_id, Document, ID_FIELD};
use crate::database::store::{DatabaseError, DocumentStore, FindOptions, WriteOp};
use crate::filter::{Filter, SqlParam, SqlResult};

type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;

/// Postgres-backed store. Each collection is a table
/// `(seq BIGSERIAL, id TEXT PRIMARY KEY, doc JSONB NOT NULL)`.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn filter(collection: &str, query: &Value) -> Result<Filter, DatabaseError> {
        let mut filter = Filter::new(collection)?;
        filter.where_clause(query)?;
        Ok(filter)
    }
}

fn bind_param<'q>(q: PgQuery<'q>, param: &'q SqlParam) -> PgQuery<'q> {
    match param {
        SqlParam::Json(v) => q.bind(sqlx::types::Json(v)),
        SqlParam::Text(s) => q.bind(s),
        SqlParam::Int(i) => q.bind(*i),
    }
}

fn build_query(sql: &SqlResult) -> PgQuery<'_> {
    let mut query = sqlx::query(&sql.query);
    for param in &sql.params {
        query = bind_param(query, param);
    }
    query
}

fn row_to_document(row: &PgRow) -> Result<Document, DatabaseError> {
    let sqlx::types::Json(value): sqlx::types::Json<Value> = row.try_get("doc")?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(DatabaseError::InvalidDocument(format!("stored doc is not an object: {}", other))),
    }
}

fn log_timing(sql: &str, started: Instant) {
    let elapsed = started.elapsed().as_millis() as u64;
    let db = &CONFIG.database;
    if db.enable_query_logging {
        debug!("SQL ({}ms): {}", elapsed, sql);
    }
    if db.enable_slow_query_warning && elapsed >= db.slow_query_threshold_ms {
        warn!("Slow query ({}ms): {}", elapsed, sql);
    }
}

/// Unique violations (SQLSTATE 23505) become `DuplicateKey`
fn map_write_error(collection: &str, err: sqlx::Error) -> DatabaseError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            let constraint = db_err.constraint().unwrap_or_default();
            let field = if constraint.ends_with("_pkey") {
                ID_FIELD.to_string()
            } else {
                constraint
                    .strip_prefix(&format!("{}_", collection))
                    .and_then(|rest| rest.strip_suffix("_unique"))
                    .unwrap_or(constraint)
                    .to_string()
            };
            return DatabaseError::DuplicateKey { collection: collection.to_string(), field };
        }
    }
    DatabaseError::Sqlx(err)
}

fn insert_sql(collection: &str) -> Result<String, DatabaseError> {
    Filter::validate_table_name(collection)?;
    Ok(format!("INSERT INTO \"{}\" (id, doc) VALUES ($1, $2)", collection))
}

fn without_id(set: &Document) -> Value {
    Value::Object(
        set.iter()
            .filter(|(k, _)| k.as_str() != ID_FIELD)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    )
}

#[async_trait]
impl DocumentStore for PgStore {
    fn backend_name(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_one(&self, collection: &str, doc: Document) -> Result<Document, DatabaseError> {
        let sql = insert_sql(collection)?;
        let id = document_id(&doc)
            .ok_or_else(|| DatabaseError::InvalidDocument("document has no _id".to_string()))?
            .to_string();
        let started = Instant::now();
        sqlx::query(&sql)
            .bind(&id)
            .bind(sqlx::types::Json(&doc))
            .execute(&self.pool)
            .await
            .map_err(|e| map_write_error(collection, e))?;
        log_timing(&sql, started);
        Ok(doc)
    }

    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<u64, DatabaseError> {
        let sql = insert_sql(collection)?;
        let started = Instant::now();
        let mut tx = self.pool.begin().await?;
        for doc in &docs {
            let id = document_id(doc)
                .ok_or_else(|| DatabaseError::InvalidDocument("document has no _id".to_string()))?;
            sqlx::query(&sql)
                .bind(id)
                .bind(sqlx::types::Json(doc))
                .execute(&mut *tx)
                .await
                .map_err(|e| map_write_error(collection, e))?;
        }
        tx.commit().await?;
        log_timing(&sql, started);
        Ok(docs.len() as u64)
    }

    async fn find_one(&self, collection: &str, query: &Value) -> Result<Option<Document>, DatabaseError> {
        let mut filter = Self::filter(collection, query)?;
        filter.limit(Some(1), None);
        let sql = filter.to_sql()?;
        let started = Instant::now();
        let row = build_query(&sql).fetch_optional(&self.pool).await?;
        log_timing(&sql.query, started);
        row.as_ref().map(row_to_document).transpose()
    }

    async fn find(&self, collection: &str, query: &Value, options: &FindOptions) -> Result<Vec<Document>, DatabaseError> {
        let mut filter = Self::filter(collection, query)?;
        filter.order(options.sort.clone()).limit(options.limit, Some(options.skip));
        let sql = filter.to_sql()?;
        let started = Instant::now();
        let rows = build_query(&sql).fetch_all(&self.pool).await?;
        log_timing(&sql.query, started);
        rows.iter().map(row_to_document).collect()
    }

    async fn count(&self, collection: &str, query: &Value) -> Result<u64, DatabaseError> {
        let sql = Self::filter(collection, query)?.to_count_sql()?;
        let started = Instant::now();
        let row = build_query(&sql).fetch_one(&self.pool).await?;
        log_timing(&sql.query, started);
        let count: i64 = row.try_get("count")?;
        Ok(count.max(0) as u64)
    }

    async fn update_one(&self, collection: &str, query: &Value, set: &Document) -> Result<Option<Document>, DatabaseError> {
        let sql = Self::filter(collection, query)?.to_update_sql(without_id(set), true)?;
        let started = Instant::now();
        let row = build_query(&sql)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_write_error(collection, e))?;
        log_timing(&sql.query, started);
        row.as_ref().map(row_to_document).transpose()
    }

    async fn update_many(&self, collection: &str, query: &Value, set: &Document) -> Result<u64, DatabaseError> {
        let sql = Self::filter(collection, query)?.to_update_sql(without_id(set), false)?;
        let started = Instant::now();
        let result = build_query(&sql)
            .execute(&self.pool)
            .await
            .map_err(|e| map_write_error(collection, e))?;
        log_timing(&sql.query, started);
        Ok(result.rows_affected())
    }

    async fn delete_one(&self, collection: &str, query: &Value) -> Result<Option<Document>, DatabaseError> {
        let sql = Self::filter(collection, query)?.to_delete_sql(true)?;
        let started = Instant::now();
        let row = build_query(&sql).fetch_optional(&self.pool).await?;
        log_timing(&sql.query, started);
        row.as_ref().map(row_to_document).transpose()
    }

    async fn delete_many(&self, collection: &str, query: &Value) -> Result<u64, DatabaseError> {
        let sql = Self::filter(collection, query)?.to_delete_sql(false)?;
        let started = Instant::now();
        let result = build_query(&sql).execute(&self.pool).await?;
        log_timing(&sql.query, started);
        Ok(result.rows_affected())
    }

    async fn apply_batch(&self, ops: Vec<WriteOp>) -> Result<Vec<u64>, DatabaseError> {
        // Render everything first so a bad op fails before the transaction opens
        let mut statements = Vec::with_capacity(ops.len());
        for op in &ops {
            let sql = match op {
                WriteOp::UpdateMany { collection, query, set } => {
                    Self::filter(collection, query)?.to_update_sql(without_id(set), false)?
                }
                WriteOp::DeleteMany { collection, query } => Self::filter(collection, query)?.to_delete_sql(false)?,
            };
            statements.push((op.collection(), sql));
        }

        let started = Instant::now();
        let mut tx = self.pool.begin().await?;
        let mut counts = Vec::with_capacity(statements.len());
        for (collection, sql) in &statements {
            let result = build_query(sql)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_write_error(collection, e))?;
            counts.push(result.rows_affected());
        }
        tx.commit().await?;
        log_timing(&format!("batch of {} statements", statements.len()), started);
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn update_patch_never_carries_id() {
        let set = json!({ "_id": "x", "name": "n" }).as_object().cloned().unwrap();
        assert_eq!(without_id(&set), json!({ "name": "n" }));
    }

    #[test]
    fn insert_rejects_bad_collection() {
        assert!(insert_sql("event").is_ok());
        assert!(insert_sql("event\"; --").is_err());
    }
}

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::database::document::{document_id, unique_fields, Document, ID_FIELD};
use crate::database::store::{DatabaseError, DocumentStore, FindOptions, WriteOp};
use crate::filter::{matcher, Condition, Filter, FilterWhere};

type Collections = HashMap<String, Vec<Document>>;

/// In-process store. Collections keep insertion order, which is the natural
/// order of unsorted reads.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn parse_query(collection: &str, query: &Value) -> Result<Condition, DatabaseError> {
    Filter::validate_table_name(collection)?;
    Ok(FilterWhere::parse(query)?)
}

fn matching_positions(docs: &[Document], condition: &Condition) -> Result<Vec<usize>, DatabaseError> {
    let mut positions = Vec::new();
    for (i, doc) in docs.iter().enumerate() {
        if matcher::matches(doc, condition)? {
            positions.push(i);
        }
    }
    Ok(positions)
}

/// Rejects `candidate` if it collides with any document other than `skip`
fn check_unique(
    collection: &str,
    docs: &[Document],
    candidate: &Document,
    skip: Option<usize>,
) -> Result<(), DatabaseError> {
    let fields = std::iter::once(ID_FIELD).chain(unique_fields(collection).iter().copied());
    for field in fields {
        let value = match candidate.get(field) {
            Some(v) if !v.is_null() => v,
            _ => continue,
        };
        let clash = docs
            .iter()
            .enumerate()
            .any(|(i, other)| Some(i) != skip && other.get(field).map(|o| matcher::values_equal(o, value)).unwrap_or(false));
        if clash {
            return Err(DatabaseError::DuplicateKey {
                collection: collection.to_string(),
                field: field.to_string(),
            });
        }
    }
    Ok(())
}

fn insert_into(collections: &mut Collections, collection: &str, doc: Document) -> Result<(), DatabaseError> {
    if document_id(&doc).is_none() {
        return Err(DatabaseError::InvalidDocument("document has no _id".to_string()));
    }
    let docs = collections.entry(collection.to_string()).or_default();
    check_unique(collection, docs, &doc, None)?;
    docs.push(doc);
    Ok(())
}

fn update_in(
    collections: &mut Collections,
    collection: &str,
    condition: &Condition,
    set: &Document,
    single: bool,
) -> Result<Vec<Document>, DatabaseError> {
    let docs = match collections.get_mut(collection) {
        Some(docs) => docs,
        None => return Ok(vec![]),
    };
    let mut positions = matching_positions(docs, condition)?;
    if single {
        positions.truncate(1);
    }

    let mut updated = Vec::with_capacity(positions.len());
    for i in positions {
        let mut next = docs[i].clone();
        for (k, v) in set.iter().filter(|(k, _)| k.as_str() != ID_FIELD) {
            next.insert(k.clone(), v.clone());
        }
        check_unique(collection, docs, &next, Some(i))?;
        docs[i] = next.clone();
        updated.push(next);
    }
    Ok(updated)
}

fn delete_from(
    collections: &mut Collections,
    collection: &str,
    condition: &Condition,
    single: bool,
) -> Result<Vec<Document>, DatabaseError> {
    let docs = match collections.get_mut(collection) {
        Some(docs) => docs,
        None => return Ok(vec![]),
    };
    let mut positions = matching_positions(docs, condition)?;
    if single {
        positions.truncate(1);
    }
    let mut removed = Vec::with_capacity(positions.len());
    for i in positions.into_iter().rev() {
        removed.push(docs.remove(i));
    }
    removed.reverse();
    Ok(removed)
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        Ok(())
    }

    async fn insert_one(&self, collection: &str, doc: Document) -> Result<Document, DatabaseError> {
        Filter::validate_table_name(collection)?;
        let mut collections = self.collections.write().await;
        insert_into(&mut collections, collection, doc.clone())?;
        Ok(doc)
    }

    async fn insert_many(&self, collection: &str, docs: Vec<Document>) -> Result<u64, DatabaseError> {
        Filter::validate_table_name(collection)?;
        let mut collections = self.collections.write().await;
        let mut staged = collections.get(collection).cloned().unwrap_or_default();
        let count = docs.len() as u64;
        for doc in docs {
            if document_id(&doc).is_none() {
                return Err(DatabaseError::InvalidDocument("document has no _id".to_string()));
            }
            check_unique(collection, &staged, &doc, None)?;
            staged.push(doc);
        }
        collections.insert(collection.to_string(), staged);
        Ok(count)
    }

    async fn find_one(&self, collection: &str, query: &Value) -> Result<Option<Document>, DatabaseError> {
        let condition = parse_query(collection, query)?;
        let collections = self.collections.read().await;
        let docs = match collections.get(collection) {
            Some(docs) => docs,
            None => return Ok(None),
        };
        for doc in docs {
            if matcher::matches(doc, &condition)? {
                return Ok(Some(doc.clone()));
            }
        }
        Ok(None)
    }

    async fn find(&self, collection: &str, query: &Value, options: &FindOptions) -> Result<Vec<Document>, DatabaseError> {
        let condition = parse_query(collection, query)?;
        let collections = self.collections.read().await;
        let mut found = Vec::new();
        if let Some(docs) = collections.get(collection) {
            for doc in docs {
                if matcher::matches(doc, &condition)? {
                    found.push(doc.clone());
                }
            }
        }
        drop(collections);

        matcher::sort_documents(&mut found, &options.sort);
        let skipped = found.into_iter().skip(options.skip as usize);
        Ok(match options.limit {
            Some(limit) => skipped.take(limit as usize).collect(),
            None => skipped.collect(),
        })
    }

    async fn count(&self, collection: &str, query: &Value) -> Result<u64, DatabaseError> {
        let condition = parse_query(collection, query)?;
        let collections = self.collections.read().await;
        match collections.get(collection) {
            Some(docs) => Ok(matching_positions(docs, &condition)?.len() as u64),
            None => Ok(0),
        }
    }

    async fn update_one(&self, collection: &str, query: &Value, set: &Document) -> Result<Option<Document>, DatabaseError> {
        let condition = parse_query(collection, query)?;
        let mut collections = self.collections.write().await;
        Ok(update_in(&mut collections, collection, &condition, set, true)?.into_iter().next())
    }

    async fn update_many(&self, collection: &str, query: &Value, set: &Document) -> Result<u64, DatabaseError> {
        let condition = parse_query(collection, query)?;
        let mut collections = self.collections.write().await;
        // A unique violation midway must leave nothing applied
        let mut staged = collections.clone();
        let updated = update_in(&mut staged, collection, &condition, set, false)?;
        *collections = staged;
        Ok(updated.len() as u64)
    }

    async fn delete_one(&self, collection: &str, query: &Value) -> Result<Option<Document>, DatabaseError> {
        let condition = parse_query(collection, query)?;
        let mut collections = self.collections.write().await;
        Ok(delete_from(&mut collections, collection, &condition, true)?.into_iter().next())
    }

    async fn delete_many(&self, collection: &str, query: &Value) -> Result<u64, DatabaseError> {
        let condition = parse_query(collection, query)?;
        let mut collections = self.collections.write().await;
        Ok(delete_from(&mut collections, collection, &condition, false)?.len() as u64)
    }

    async fn apply_batch(&self, ops: Vec<WriteOp>) -> Result<Vec<u64>, DatabaseError> {
        let mut collections = self.collections.write().await;
        let mut staged = collections.clone();
        let mut counts = Vec::with_capacity(ops.len());
        for op in &ops {
            let count = match op {
                WriteOp::UpdateMany { collection, query, set } => {
                    let condition = parse_query(collection, query)?;
                    update_in(&mut staged, collection, &condition, set, false)?.len()
                }
                WriteOp::DeleteMany { collection, query } => {
                    let condition = parse_query(collection, query)?;
                    delete_from(&mut staged, collection, &condition, false)?.len()
                }
            };
            counts.push(count as u64);
        }
        *collections = staged;
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn insert_find_and_natural_order() {
        let store = MemoryStore::new();
        store.insert_one("master", doc(json!({ "_id": "a", "name": "B" }))).await.unwrap();
        store.insert_one("master", doc(json!({ "_id": "b", "name": "A" }))).await.unwrap();

        let all = store.find("master", &json!({}), &FindOptions::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0]["_id"], json!("a"));

        let found = store.find_one("master", &json!({ "name": "A" })).await.unwrap();
        assert_eq!(found.unwrap()["_id"], json!("b"));
        assert_eq!(store.count("event", &json!({})).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unique_fields_reject_duplicates() {
        let store = MemoryStore::new();
        store.insert_one("user", doc(json!({ "_id": "u1", "email": "a@x.io", "username": "a" }))).await.unwrap();
        let err = store
            .insert_one("user", doc(json!({ "_id": "u2", "email": "a@x.io", "username": "b" })))
            .await
            .unwrap_err();
        assert!(matches!(err, DatabaseError::DuplicateKey { ref field, .. } if field == "email"));
    }

    #[tokio::test]
    async fn insert_many_is_all_or_nothing() {
        let store = MemoryStore::new();
        let docs = vec![doc(json!({ "_id": "a" })), doc(json!({ "_id": "a" }))];
        assert!(store.insert_many("event", docs).await.is_err());
        assert_eq!(store.count("event", &json!({})).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn update_one_returns_updated_document() {
        let store = MemoryStore::new();
        store.insert_one("event", doc(json!({ "_id": "a", "name": "x", "isDeleted": false }))).await.unwrap();
        let updated = store
            .update_one("event", &json!({ "_id": "a" }), &doc(json!({ "isDeleted": true })))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated["isDeleted"], json!(true));
        assert_eq!(updated["name"], json!("x"));
    }

    #[tokio::test]
    async fn failed_batch_leaves_store_untouched() {
        let store = MemoryStore::new();
        store.insert_one("user", doc(json!({ "_id": "u1", "email": "a@x.io" }))).await.unwrap();
        store.insert_one("user", doc(json!({ "_id": "u2", "email": "b@x.io" }))).await.unwrap();
        let ops = vec![
            WriteOp::DeleteMany { collection: "user".into(), query: json!({ "_id": "u1" }) },
            WriteOp::UpdateMany {
                collection: "user".into(),
                query: json!({ "_id": "u2" }),
                set: doc(json!({ "_id": "u2", "email": "c@x.io" })),
            },
            WriteOp::UpdateMany { collection: "bad name".into(), query: json!({}), set: Document::new() },
        ];
        assert!(store.apply_batch(ops).await.is_err());
        assert_eq!(store.count("user", &json!({})).await.unwrap(), 2);
        let u2 = store.find_one("user", &json!({ "_id": "u2" })).await.unwrap().unwrap();
        assert_eq!(u2["email"], json!("b@x.io"));
    }

    #[tokio::test]
    async fn delete_many_reports_count() {
        let store = MemoryStore::new();
        for id in ["a", "b", "c"] {
            store.insert_one("event", doc(json!({ "_id": id, "tag": id != "c" }))).await.unwrap();
        }
        assert_eq!(store.delete_many("event", &json!({ "tag": true })).await.unwrap(), 2);
        assert_eq!(store.count("event", &json!({})).await.unwrap(), 1);
    }
}

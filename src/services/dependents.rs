//! Dependent-aware deletion. Records that reference a deleted record by
//! foreign key are found by walking a static edge table level by level, then
//! soft-deleted or removed together with the targets in one atomic batch.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::database::{DatabaseError, Document, DocumentStore, FindOptions, WriteOp, ID_FIELD};

/// `child.foreign_key` holds the id of a `parent` record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DependencyEdge {
    pub parent: &'static str,
    pub child: &'static str,
    pub foreign_key: &'static str,
}

pub const DEPENDENCY_EDGES: &[DependencyEdge] = &[DependencyEdge {
    parent: "master",
    child: "master",
    foreign_key: "parentId",
}];

#[derive(Debug, Error)]
pub enum DependencyError {
    #[error("Dependency chain is deeper than the allowed {0} levels")]
    DepthExceeded(usize),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DependentCount {
    pub collection: String,
    pub foreign_key: String,
    pub count: u64,
}

/// Per-collection tally of one deletion (or of its dry run)
#[derive(Debug, Clone, PartialEq)]
pub struct DeletionReport {
    pub collection: String,
    pub targets: u64,
    pub dependents: Vec<DependentCount>,
}

impl DeletionReport {
    /// `{ "<collection>": n, "dependents": [{collection, foreignKey, count}] }`
    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        out.insert(self.collection.clone(), json!(self.targets));
        out.insert("dependents".to_string(), json!(self.dependents));
        Value::Object(out)
    }
}

/// Ids reached through one edge
#[derive(Debug, Clone)]
struct DependentGroup {
    collection: &'static str,
    foreign_key: &'static str,
    ids: Vec<String>,
}

#[derive(Debug, Clone)]
struct DeletionPlan {
    collection: String,
    targets: Vec<String>,
    dependents: Vec<DependentGroup>,
}

impl DeletionPlan {
    fn report(&self, targets: u64, dependent_counts: &[u64]) -> DeletionReport {
        DeletionReport {
            collection: self.collection.clone(),
            targets,
            dependents: self
                .dependents
                .iter()
                .zip(dependent_counts)
                .map(|(group, count)| DependentCount {
                    collection: group.collection.to_string(),
                    foreign_key: group.foreign_key.to_string(),
                    count: *count,
                })
                .collect(),
        }
    }
}

fn id_query(ids: &[String]) -> Value {
    json!({ ID_FIELD: { "$in": ids } })
}

fn ids_of(docs: &[Document]) -> Vec<String> {
    docs.iter()
        .filter_map(|d| d.get(ID_FIELD).and_then(Value::as_str))
        .map(str::to_string)
        .collect()
}

pub struct DependentService {
    store: Arc<dyn DocumentStore>,
    edges: &'static [DependencyEdge],
    max_depth: usize,
}

impl DependentService {
    pub fn new(store: Arc<dyn DocumentStore>, max_depth: usize) -> Self {
        Self::with_edges(store, DEPENDENCY_EDGES, max_depth)
    }

    pub fn with_edges(store: Arc<dyn DocumentStore>, edges: &'static [DependencyEdge], max_depth: usize) -> Self {
        Self { store, edges, max_depth }
    }

    /// Breadth-first walk from the records matching `query`. A visited set per
    /// collection keeps cycles finite; more than `max_depth` levels is an error.
    async fn plan(&self, collection: &str, query: &Value) -> Result<Option<DeletionPlan>, DependencyError> {
        let targets = ids_of(&self.store.find(collection, query, &FindOptions::default()).await?);
        if targets.is_empty() {
            return Ok(None);
        }

        let mut visited: HashMap<String, HashSet<String>> = HashMap::new();
        visited.entry(collection.to_string()).or_default().extend(targets.iter().cloned());

        let mut groups: Vec<DependentGroup> = Vec::new();
        let mut frontier: Vec<(String, Vec<String>)> = vec![(collection.to_string(), targets.clone())];
        let mut depth = 0;

        while !frontier.is_empty() {
            let mut next = Vec::new();
            for (parent, ids) in &frontier {
                for edge in self.edges.iter().filter(|e| e.parent == parent) {
                    let query = json!({ edge.foreign_key: { "$in": ids } });
                    let found = ids_of(&self.store.find(edge.child, &query, &FindOptions::default()).await?);

                    let seen = visited.entry(edge.child.to_string()).or_default();
                    let fresh: Vec<String> = found.into_iter().filter(|id| seen.insert(id.clone())).collect();
                    if fresh.is_empty() {
                        continue;
                    }
                    if depth + 1 > self.max_depth {
                        return Err(DependencyError::DepthExceeded(self.max_depth));
                    }

                    match groups
                        .iter_mut()
                        .find(|g| g.collection == edge.child && g.foreign_key == edge.foreign_key)
                    {
                        Some(group) => group.ids.extend(fresh.iter().cloned()),
                        None => groups.push(DependentGroup {
                            collection: edge.child,
                            foreign_key: edge.foreign_key,
                            ids: fresh.clone(),
                        }),
                    }
                    next.push((edge.child.to_string(), fresh));
                }
            }
            frontier = next;
            depth += 1;
        }

        debug!(
            "Deletion plan for {}: {} targets, {} dependent groups, {} levels",
            collection,
            targets.len(),
            groups.len(),
            depth
        );
        Ok(Some(DeletionPlan { collection: collection.to_string(), targets, dependents: groups }))
    }

    /// Dry run: how many records a deletion would touch. `None` when nothing matches.
    pub async fn count(&self, collection: &str, query: &Value) -> Result<Option<DeletionReport>, DependencyError> {
        let plan = match self.plan(collection, query).await? {
            Some(plan) => plan,
            None => return Ok(None),
        };
        let counts: Vec<u64> = plan.dependents.iter().map(|g| g.ids.len() as u64).collect();
        Ok(Some(plan.report(plan.targets.len() as u64, &counts)))
    }

    /// Apply `update` to the targets and every dependent
    pub async fn soft_delete(
        &self,
        collection: &str,
        query: &Value,
        update: &Document,
    ) -> Result<Option<DeletionReport>, DependencyError> {
        let plan = match self.plan(collection, query).await? {
            Some(plan) => plan,
            None => return Ok(None),
        };

        let mut ops: Vec<WriteOp> = plan
            .dependents
            .iter()
            .map(|g| WriteOp::UpdateMany {
                collection: g.collection.to_string(),
                query: id_query(&g.ids),
                set: update.clone(),
            })
            .collect();
        ops.push(WriteOp::UpdateMany {
            collection: plan.collection.clone(),
            query: id_query(&plan.targets),
            set: update.clone(),
        });

        let counts = self.store.apply_batch(ops).await?;
        Ok(Some(Self::report_from_batch(&plan, &counts)))
    }

    /// Remove every dependent, then the targets
    pub async fn delete(&self, collection: &str, query: &Value) -> Result<Option<DeletionReport>, DependencyError> {
        let plan = match self.plan(collection, query).await? {
            Some(plan) => plan,
            None => return Ok(None),
        };

        let mut ops: Vec<WriteOp> = plan
            .dependents
            .iter()
            .map(|g| WriteOp::DeleteMany { collection: g.collection.to_string(), query: id_query(&g.ids) })
            .collect();
        ops.push(WriteOp::DeleteMany { collection: plan.collection.clone(), query: id_query(&plan.targets) });

        let counts = self.store.apply_batch(ops).await?;
        Ok(Some(Self::report_from_batch(&plan, &counts)))
    }

    /// Batch results are dependents in plan order followed by the targets
    fn report_from_batch(plan: &DeletionPlan, counts: &[u64]) -> DeletionReport {
        let (dependent_counts, target_count) = counts.split_at(counts.len().saturating_sub(1));
        plan.report(target_count.first().copied().unwrap_or(0), dependent_counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    /// root <- child1 <- grandchild, root <- child2, plus an unrelated record
    async fn seeded() -> Arc<dyn DocumentStore> {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let records = [
            json!({ "_id": "root", "parentId": null, "isDeleted": false }),
            json!({ "_id": "child1", "parentId": "root", "isDeleted": false }),
            json!({ "_id": "child2", "parentId": "root", "isDeleted": false }),
            json!({ "_id": "grandchild", "parentId": "child1", "isDeleted": false }),
            json!({ "_id": "other", "parentId": null, "isDeleted": false }),
        ];
        for r in records {
            store.insert_one("master", doc(r)).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn count_is_read_only() {
        let store = seeded().await;
        let service = DependentService::new(store.clone(), 32);
        let report = service.count("master", &json!({ "_id": "root" })).await.unwrap().unwrap();
        assert_eq!(
            report.to_json(),
            json!({ "master": 1, "dependents": [{ "collection": "master", "foreignKey": "parentId", "count": 3 }] })
        );
        assert_eq!(store.count("master", &json!({ "isDeleted": true })).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn soft_delete_cascades() {
        let store = seeded().await;
        let service = DependentService::new(store.clone(), 32);
        let update = doc(json!({ "isDeleted": true, "updatedBy": "admin" }));
        let report = service.soft_delete("master", &json!({ "_id": "root" }), &update).await.unwrap().unwrap();
        assert_eq!(report.targets, 1);
        assert_eq!(report.dependents[0].count, 3);
        assert_eq!(store.count("master", &json!({ "isDeleted": true })).await.unwrap(), 4);
        assert_eq!(store.count("master", &json!({})).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn delete_removes_subtree_only() {
        let store = seeded().await;
        let service = DependentService::new(store.clone(), 32);
        let report = service.delete("master", &json!({ "_id": "child1" })).await.unwrap().unwrap();
        assert_eq!(report.targets, 1);
        assert_eq!(report.dependents[0].count, 1);
        let left = store.find("master", &json!({}), &FindOptions::default()).await.unwrap();
        assert_eq!(ids_of(&left), vec!["root", "child2", "other"]);
    }

    #[tokio::test]
    async fn no_match_returns_none() {
        let store = seeded().await;
        let service = DependentService::new(store, 32);
        assert!(service.count("master", &json!({ "_id": "missing" })).await.unwrap().is_none());
        assert!(service.delete("master", &json!({ "_id": "missing" })).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cycles_terminate() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        store.insert_one("master", doc(json!({ "_id": "a", "parentId": "b" }))).await.unwrap();
        store.insert_one("master", doc(json!({ "_id": "b", "parentId": "a" }))).await.unwrap();
        let service = DependentService::new(store, 32);
        let report = service.count("master", &json!({ "_id": "a" })).await.unwrap().unwrap();
        assert_eq!(report.dependents[0].count, 1);
    }

    #[tokio::test]
    async fn depth_bound_fails_without_changes() {
        let store = seeded().await;
        let service = DependentService::new(store.clone(), 1);
        let err = service.delete("master", &json!({ "_id": "root" })).await.unwrap_err();
        assert!(matches!(err, DependencyError::DepthExceeded(1)));
        assert_eq!(store.count("master", &json!({})).await.unwrap(), 5);
    }
}

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tracing::{debug, info};

use super::dependents::DependentService;
use super::{ServiceError, ServiceResult};
use crate::api::format::{document_to_api_value, populate, PopulateSpec, Projection};
use crate::database::document::{normalize_id, timestamp_now};
use crate::database::{paginate, Document, DocumentStore, ObjectId, PageOptions, ID_FIELD};
use crate::filter::FilterWhere;
use crate::schema::{ResourceSchema, EVENT_SCHEMA, MASTER_SCHEMA};

/// How hard/soft deletes treat records that reference the deleted ones
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionPolicy {
    /// Delete only the addressed records and return them
    Direct,
    /// Cascade through the dependency graph and return a count report
    Dependents,
}

/// Everything resource-specific the generic service needs
#[derive(Debug, Clone, Copy)]
pub struct ResourceDef {
    pub schema: &'static ResourceSchema,
    pub deletion: DeletionPolicy,
}

impl ResourceDef {
    pub fn event() -> Self {
        Self { schema: &EVENT_SCHEMA, deletion: DeletionPolicy::Direct }
    }

    pub fn master() -> Self {
        Self { schema: &MASTER_SCHEMA, deletion: DeletionPolicy::Dependents }
    }

    pub fn collection(&self) -> &'static str {
        self.schema.collection
    }
}

/// Keys clients may never write directly
const PROTECTED_ON_UPDATE: &[&str] = &[ID_FIELD, "id", "addedBy", "createdAt"];

/// Generic create/read/update/delete over one collection
pub struct CrudService {
    def: ResourceDef,
    store: Arc<dyn DocumentStore>,
    dependents: DependentService,
}

impl CrudService {
    pub fn new(def: ResourceDef, store: Arc<dyn DocumentStore>, max_cascade_depth: usize) -> Self {
        let dependents = DependentService::new(store.clone(), max_cascade_depth);
        Self { def, store, dependents }
    }

    pub fn definition(&self) -> &ResourceDef {
        &self.def
    }

    fn collection(&self) -> &'static str {
        self.def.collection()
    }

    fn output(doc: Document) -> Value {
        Value::Object(document_to_api_value(doc))
    }

    /// Validated, lower-cased id or `InvalidId`
    fn parse_id(id: &str) -> ServiceResult<String> {
        if !ObjectId::is_valid(id) {
            return Err(ServiceError::InvalidId);
        }
        Ok(normalize_id(id))
    }

    /// Non-empty `ids` list of valid ids, or `BadRequest`
    fn parse_ids(body: &Value) -> ServiceResult<Vec<String>> {
        let ids = match body.get("ids").and_then(Value::as_array) {
            Some(ids) if !ids.is_empty() => ids,
            _ => return Err(ServiceError::BadRequest(None)),
        };
        ids.iter()
            .map(|id| id.as_str().ok_or(ServiceError::InvalidId).and_then(Self::parse_id))
            .collect()
    }

    fn object_field(body: &Value, keys: &[&str]) -> Value {
        keys.iter()
            .find_map(|k| body.get(*k).filter(|v| v.is_object()))
            .cloned()
            .unwrap_or_else(|| json!({}))
    }

    /// New document from a validated payload
    fn stamp_new(&self, mut doc: Document, caller: &str) -> Document {
        doc.remove("id");
        let now = timestamp_now();
        doc.insert(ID_FIELD.to_string(), Value::String(ObjectId::new().to_hex()));
        doc.insert("addedBy".to_string(), Value::String(caller.to_string()));
        doc.insert("isDeleted".to_string(), Value::Bool(false));
        doc.insert("isActive".to_string(), Value::Bool(true));
        doc.insert("createdAt".to_string(), now.clone());
        doc.insert("updatedAt".to_string(), now);
        doc
    }

    /// `$set` patch from a validated payload
    fn stamp_update(mut patch: Document, caller: &str) -> Document {
        for key in PROTECTED_ON_UPDATE {
            patch.remove(*key);
        }
        patch.insert("updatedBy".to_string(), Value::String(caller.to_string()));
        patch.insert("updatedAt".to_string(), timestamp_now());
        patch
    }

    fn soft_delete_patch(caller: &str) -> Document {
        let mut patch = Map::new();
        patch.insert("isDeleted".to_string(), Value::Bool(true));
        patch.insert("updatedBy".to_string(), Value::String(caller.to_string()));
        patch.insert("updatedAt".to_string(), timestamp_now());
        patch
    }

    pub async fn create(&self, caller: &str, payload: &Value) -> ServiceResult<Value> {
        let doc = self.def.schema.validate_create(payload).map_err(ServiceError::InvalidParameters)?;
        let created = self.store.insert_one(self.collection(), self.stamp_new(doc, caller)).await?;
        let id = created.get(ID_FIELD).and_then(Value::as_str).unwrap_or_default();
        info!("Created {} {}", self.collection(), id);
        Ok(Self::output(created))
    }

    /// All elements are validated before anything is written; returns `{count}`
    pub async fn bulk_create(&self, caller: &str, body: &Value) -> ServiceResult<Value> {
        let items = match body.get("data").and_then(Value::as_array) {
            Some(items) if !items.is_empty() => items,
            _ => return Err(ServiceError::BadRequest(None)),
        };

        let mut docs = Vec::with_capacity(items.len());
        for item in items {
            let doc = self.def.schema.validate_create(item).map_err(ServiceError::InvalidParameters)?;
            docs.push(self.stamp_new(doc, caller));
        }

        let count = self.store.insert_many(self.collection(), docs).await?;
        info!("Bulk created {} {} records", count, self.collection());
        Ok(json!({ "count": count }))
    }

    /// `{query, options, isCountOnly}` -> page envelope, or `{totalRecords}`
    pub async fn list(&self, body: &Value) -> ServiceResult<Value> {
        self.def.schema.validate_filter(body).map_err(ServiceError::Validation)?;
        let query = self.def.schema.normalize_query(&Self::object_field(body, &["query", "where"]));
        FilterWhere::parse(&query)?;

        if body.get("isCountOnly").and_then(Value::as_bool).unwrap_or(false) {
            let total = self.store.count(self.collection(), &query).await?;
            return Ok(json!({ "totalRecords": total }));
        }

        let options = Self::object_field(body, &["options"]);
        let page_options = PageOptions::from_options(&options)?;
        let page = paginate(self.store.as_ref(), self.collection(), &query, &page_options).await?;
        if page.docs.is_empty() {
            return Err(ServiceError::NotFound);
        }
        debug!("Listed {} {} records", page.docs.len(), self.collection());

        let projection = Projection::parse(options.get("select"));
        let mut docs: Vec<Map<String, Value>> = page
            .docs
            .into_iter()
            .map(|doc| {
                let mut out = document_to_api_value(doc);
                projection.apply(&mut out);
                out
            })
            .collect();
        let specs = PopulateSpec::parse(options.get("populate"));
        populate(self.store.as_ref(), self.def.schema, &mut docs, &specs).await?;

        Ok(json!({ "data": docs, "paginator": page.paginator }))
    }

    /// `{where}` -> `{count}`; zero is a result, not an error
    pub async fn count(&self, body: &Value) -> ServiceResult<Value> {
        self.def.schema.validate_filter(body).map_err(ServiceError::Validation)?;
        let query = self.def.schema.normalize_query(&Self::object_field(body, &["where", "query"]));
        FilterWhere::parse(&query)?;
        let count = self.store.count(self.collection(), &query).await?;
        Ok(json!({ "count": count }))
    }

    pub async fn get_by_id(&self, id: &str) -> ServiceResult<Value> {
        let id = Self::parse_id(id)?;
        self.store
            .find_one(self.collection(), &json!({ ID_FIELD: id }))
            .await?
            .map(Self::output)
            .ok_or(ServiceError::NotFound)
    }

    pub async fn update(&self, caller: &str, id: &str, payload: &Value) -> ServiceResult<Value> {
        let id = Self::parse_id(id)?;
        let patch = self.def.schema.validate_update(payload).map_err(ServiceError::InvalidParameters)?;
        self.store
            .update_one(self.collection(), &json!({ ID_FIELD: id }), &Self::stamp_update(patch, caller))
            .await?
            .map(Self::output)
            .ok_or(ServiceError::NotFound)
    }

    /// `{filter, data}` -> `{count}`; matching nothing is `NotFound`
    pub async fn bulk_update(&self, caller: &str, body: &Value) -> ServiceResult<Value> {
        let filter = self.def.schema.normalize_query(&Self::object_field(body, &["filter"]));
        FilterWhere::parse(&filter)?;
        let data = Self::object_field(body, &["data"]);
        let patch = self.def.schema.validate_update(&data).map_err(ServiceError::InvalidParameters)?;

        let count = self
            .store
            .update_many(self.collection(), &filter, &Self::stamp_update(patch, caller))
            .await?;
        if count == 0 {
            return Err(ServiceError::NotFound);
        }
        Ok(json!({ "count": count }))
    }

    pub async fn partial_update(&self, caller: &str, id: &str, payload: &Value) -> ServiceResult<Value> {
        if id.trim().is_empty() {
            return Err(ServiceError::BadRequest(Some(
                "Insufficient request parameters! id is required.".to_string(),
            )));
        }
        self.update(caller, id, payload).await
    }

    pub async fn soft_delete(&self, caller: &str, id: &str) -> ServiceResult<Value> {
        let id = Self::parse_id(id)?;
        let query = json!({ ID_FIELD: id });
        let patch = Self::soft_delete_patch(caller);
        match self.def.deletion {
            DeletionPolicy::Direct => self
                .store
                .update_one(self.collection(), &query, &patch)
                .await?
                .map(Self::output)
                .ok_or(ServiceError::NotFound),
            DeletionPolicy::Dependents => self
                .dependents
                .soft_delete(self.collection(), &query, &patch)
                .await?
                .map(|report| report.to_json())
                .ok_or(ServiceError::NotFound),
        }
    }

    pub async fn soft_delete_many(&self, caller: &str, body: &Value) -> ServiceResult<Value> {
        let ids = Self::parse_ids(body)?;
        let query = json!({ ID_FIELD: { "$in": ids } });
        let patch = Self::soft_delete_patch(caller);
        match self.def.deletion {
            DeletionPolicy::Direct => {
                let count = self.store.update_many(self.collection(), &query, &patch).await?;
                if count == 0 {
                    return Err(ServiceError::NotFound);
                }
                Ok(json!({ "count": count }))
            }
            DeletionPolicy::Dependents => self
                .dependents
                .soft_delete(self.collection(), &query, &patch)
                .await?
                .map(|report| report.to_json())
                .ok_or(ServiceError::NotFound),
        }
    }

    /// Hard delete; `isWarning: true` in the body only counts what would go
    pub async fn delete(&self, id: &str, body: &Value) -> ServiceResult<Value> {
        let id = Self::parse_id(id)?;
        let query = json!({ ID_FIELD: id });
        match self.def.deletion {
            DeletionPolicy::Direct => self
                .store
                .delete_one(self.collection(), &query)
                .await?
                .map(Self::output)
                .ok_or(ServiceError::NotFound),
            DeletionPolicy::Dependents => self.delete_with_dependents(&query, body).await,
        }
    }

    pub async fn delete_many(&self, body: &Value) -> ServiceResult<Value> {
        let ids = Self::parse_ids(body)?;
        let query = json!({ ID_FIELD: { "$in": ids } });
        match self.def.deletion {
            DeletionPolicy::Direct => {
                let count = self.store.delete_many(self.collection(), &query).await?;
                if count == 0 {
                    return Err(ServiceError::NotFound);
                }
                Ok(json!({ "count": count }))
            }
            DeletionPolicy::Dependents => self.delete_with_dependents(&query, body).await,
        }
    }

    async fn delete_with_dependents(&self, query: &Value, body: &Value) -> ServiceResult<Value> {
        let dry_run = body.get("isWarning").and_then(Value::as_bool).unwrap_or(false);
        let report = if dry_run {
            self.dependents.count(self.collection(), query).await?
        } else {
            self.dependents.delete(self.collection(), query).await?
        };
        report.map(|r| r.to_json()).ok_or(ServiceError::NotFound)
    }
}

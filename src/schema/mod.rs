//! Field descriptors and the three validation profiles (create, update,
//! filter) of each resource. Descriptors are built once on first use.

pub mod event;
pub mod field;
pub mod master;
pub mod user;
pub mod validate;

use once_cell::sync::Lazy;
use serde_json::Value;

use crate::database::document::{normalize_id, Document, ID_FIELD};
use crate::database::ObjectId;

pub use field::{FieldKind, FieldRule};
pub use validate::{FieldError, ValidationErrors};

/// A field holding the id of a document in another collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub field: &'static str,
    pub collection: &'static str,
}

impl Reference {
    pub fn new(field: &'static str, collection: &'static str) -> Self {
        Self { field, collection }
    }
}

#[derive(Debug, Clone)]
pub struct ResourceSchema {
    pub collection: &'static str,
    pub fields: Vec<FieldRule>,
    pub references: Vec<Reference>,
}

impl ResourceSchema {
    pub fn validate_create(&self, payload: &Value) -> Result<Document, ValidationErrors> {
        validate::validate_document(&self.fields, payload, true)
    }

    /// Same keys as create plus an optional `_id`; no defaults
    pub fn validate_update(&self, payload: &Value) -> Result<Document, ValidationErrors> {
        let mut fields = self.fields.clone();
        fields.push(FieldRule::object_id("_id"));
        validate::validate_document(&fields, payload, false)
    }

    pub fn validate_filter(&self, body: &Value) -> Result<(), ValidationErrors> {
        validate::validate_filter(&self.fields, body)
    }

    pub fn reference(&self, field: &str) -> Option<&Reference> {
        self.references.iter().find(|r| r.field == field)
    }

    /// Fields whose values are document ids
    fn is_id_field(&self, field: &str) -> bool {
        field == ID_FIELD
            || field == "id"
            || self.reference(field).is_some()
            || self.fields.iter().any(|rule| rule.name == field && matches!(rule.kind, FieldKind::ObjectId))
    }

    /// Lower-case every id value of a query object so it matches stored ids
    pub fn normalize_query(&self, query: &Value) -> Value {
        let obj = match query.as_object() {
            Some(obj) => obj,
            None => return query.clone(),
        };
        let normalized = obj
            .iter()
            .map(|(key, value)| {
                let value = match (key.as_str(), value) {
                    ("$and" | "$or" | "$nor", Value::Array(items)) => {
                        Value::Array(items.iter().map(|item| self.normalize_query(item)).collect())
                    }
                    ("$not", inner) => self.normalize_query(inner),
                    (field, inner) if self.is_id_field(field) => lower_ids(inner),
                    _ => value.clone(),
                };
                (key.clone(), value)
            })
            .collect();
        Value::Object(normalized)
    }
}

/// Ids inside a scalar, a list or an operator object
fn lower_ids(value: &Value) -> Value {
    match value {
        Value::String(s) if ObjectId::is_valid(s) => Value::String(normalize_id(s)),
        Value::Array(items) => Value::Array(items.iter().map(lower_ids).collect()),
        Value::Object(ops) => Value::Object(ops.iter().map(|(op, inner)| (op.clone(), lower_ids(inner))).collect()),
        other => other.clone(),
    }
}

pub static EVENT_SCHEMA: Lazy<ResourceSchema> = Lazy::new(event::schema);
pub static MASTER_SCHEMA: Lazy<ResourceSchema> = Lazy::new(master::schema);
pub static USER_SCHEMA: Lazy<ResourceSchema> = Lazy::new(user::schema);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_ids_are_lower_cased() {
        let query = json!({
            "_id": "65A1B2C3D4E5F60718293A4B",
            "parentId": { "$in": ["65A1B2C3D4E5F60718293A4C", null] },
            "$or": [{ "id": { "$ne": "65A1B2C3D4E5F60718293A4D" } }, { "addedBy": "65A1B2C3D4E5F60718293A4E" }],
            "name": "65A1B2C3D4E5F60718293A4F"
        });
        assert_eq!(
            MASTER_SCHEMA.normalize_query(&query),
            json!({
                "_id": "65a1b2c3d4e5f60718293a4b",
                "parentId": { "$in": ["65a1b2c3d4e5f60718293a4c", null] },
                "$or": [{ "id": { "$ne": "65a1b2c3d4e5f60718293a4d" } }, { "addedBy": "65a1b2c3d4e5f60718293a4e" }],
                "name": "65A1B2C3D4E5F60718293A4F"
            })
        );
    }

    #[test]
    fn master_create_defaults_is_default() {
        let doc = MASTER_SCHEMA.validate_create(&json!({ "name": "Category A" })).unwrap();
        assert_eq!(doc["isDefault"], json!(false));
    }

    #[test]
    fn update_profile_accepts_id_only_in_object_id_format() {
        assert!(MASTER_SCHEMA.validate_update(&json!({ "_id": "65a1b2c3d4e5f60718293a4b" })).is_ok());
        let err = MASTER_SCHEMA.validate_update(&json!({ "_id": "nope" })).unwrap_err();
        assert_eq!(err.message(), "\"_id\" with value \"nope\" fails to match the objectId pattern");
    }

    #[test]
    fn event_address_allows_literal_zero_or_object() {
        assert!(EVENT_SCHEMA.validate_create(&json!({ "address": 0 })).is_ok());
        assert!(EVENT_SCHEMA.validate_create(&json!({ "address": { "city": "Pune", "lat": 18 } })).is_ok());
        let err = EVENT_SCHEMA.validate_create(&json!({ "address": { "lat": 18.5 } })).unwrap_err();
        assert_eq!(err.message(), "\"address.lat\" must be an integer");
    }

    #[test]
    fn event_speakers_must_be_objects() {
        let err = EVENT_SCHEMA.validate_create(&json!({ "speakers": ["Ada"] })).unwrap_err();
        assert_eq!(err.message(), "\"speakers[0]\" must be an object");
    }

    #[test]
    fn declared_references() {
        assert_eq!(MASTER_SCHEMA.reference("parentId").map(|r| r.collection), Some("master"));
        assert_eq!(EVENT_SCHEMA.reference("addedBy").map(|r| r.collection), Some("user"));
        assert!(EVENT_SCHEMA.reference("parentId").is_none());
    }

    #[test]
    fn user_profile_types() {
        assert!(USER_SCHEMA.validate_update(&json!({ "userType": 1, "mobileNo": "" })).is_ok());
        assert!(USER_SCHEMA.validate_update(&json!({ "userType": "admin" })).is_err());
    }
}

use std::collections::HashMap;

use futures::future::try_join_all;
use serde_json::{json, Map, Value};

use crate::database::{DatabaseError, Document, DocumentStore, FindOptions, ID_FIELD};
use crate::schema::ResourceSchema;

/// Keys never sent to clients
const HIDDEN_FIELDS: &[&str] = &["password"];

/// Convert a stored document into the public wire format: `_id` becomes a
/// leading `id`, hidden fields are dropped.
pub fn document_to_api_value(doc: Document) -> Map<String, Value> {
    let mut out = Map::with_capacity(doc.len());
    if let Some(id) = doc.get(ID_FIELD) {
        out.insert("id".to_string(), id.clone());
    }
    for (key, value) in doc {
        if key == ID_FIELD || key == "id" || HIDDEN_FIELDS.contains(&key.as_str()) {
            continue;
        }
        out.insert(key, value);
    }
    out
}

/// Top-level field selection from `options.select`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl Projection {
    /// Accepts `"name code -image"`, `["name", "code"]` or `{name: 1, image: 0}`
    pub fn parse(select: Option<&Value>) -> Self {
        let mut projection = Self::default();
        let mut add = |field: &str, keep: bool| {
            let field = field.split('.').next().unwrap_or(field);
            let field = if field == ID_FIELD { "id" } else { field };
            if field.is_empty() {
                return;
            }
            if keep {
                projection.include.push(field.to_string());
            } else {
                projection.exclude.push(field.to_string());
            }
        };

        match select {
            Some(Value::String(s)) => {
                for token in s.split(|c: char| c.is_whitespace() || c == ',').filter(|t| !t.is_empty()) {
                    match token.strip_prefix('-') {
                        Some(field) => add(field, false),
                        None => add(token.trim_start_matches('+'), true),
                    }
                }
            }
            Some(Value::Array(items)) => {
                for item in items.iter().filter_map(Value::as_str) {
                    match item.strip_prefix('-') {
                        Some(field) => add(field, false),
                        None => add(item, true),
                    }
                }
            }
            Some(Value::Object(obj)) => {
                for (field, flag) in obj {
                    let keep = match flag {
                        Value::Bool(b) => *b,
                        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
                        _ => true,
                    };
                    add(field, keep);
                }
            }
            _ => {}
        }
        projection
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    /// Inclusion wins when both forms are given; `id` is always kept
    pub fn apply(&self, doc: &mut Map<String, Value>) {
        if !self.include.is_empty() {
            doc.retain(|key, _| key == "id" || self.include.iter().any(|f| f == key));
        } else {
            doc.retain(|key, _| key == "id" || !self.exclude.iter().any(|f| f == key));
        }
    }
}

/// One `options.populate` entry
#[derive(Debug, Clone, PartialEq)]
pub struct PopulateSpec {
    pub path: String,
    pub select: Projection,
}

impl PopulateSpec {
    /// Accepts `"addedBy updatedBy"`, `["addedBy"]`, `{path, select}` or a
    /// list mixing strings and objects.
    pub fn parse(populate: Option<&Value>) -> Vec<PopulateSpec> {
        fn one(value: &Value, out: &mut Vec<PopulateSpec>) {
            match value {
                Value::String(s) => {
                    for path in s.split(|c: char| c.is_whitespace() || c == ',').filter(|t| !t.is_empty()) {
                        out.push(PopulateSpec { path: path.to_string(), select: Projection::default() });
                    }
                }
                Value::Object(obj) => {
                    if let Some(path) = obj.get("path").and_then(Value::as_str) {
                        out.push(PopulateSpec {
                            path: path.to_string(),
                            select: Projection::parse(obj.get("select")),
                        });
                    }
                }
                Value::Array(items) => items.iter().for_each(|item| one(item, out)),
                _ => {}
            }
        }

        let mut out = Vec::new();
        if let Some(value) = populate {
            one(value, &mut out);
        }
        out
    }
}

/// Replace reference ids with the referenced documents. Paths the schema
/// does not declare as references are ignored; dangling ids become `null`.
pub async fn populate(
    store: &dyn DocumentStore,
    schema: &ResourceSchema,
    docs: &mut [Map<String, Value>],
    specs: &[PopulateSpec],
) -> Result<(), DatabaseError> {
    let resolvable: Vec<_> = specs
        .iter()
        .filter_map(|spec| schema.reference(&spec.path).map(|r| (spec, r.collection)))
        .collect();
    if resolvable.is_empty() || docs.is_empty() {
        return Ok(());
    }

    let lookups = resolvable.iter().map(|(spec, collection)| {
        let ids: Vec<Value> = docs
            .iter()
            .filter_map(|d| d.get(&spec.path).and_then(Value::as_str))
            .map(|s| Value::String(s.to_string()))
            .collect();
        async move {
            if ids.is_empty() {
                return Ok::<_, DatabaseError>(HashMap::new());
            }
            let found = store
                .find(collection, &json!({ "_id": { "$in": ids } }), &FindOptions::default())
                .await?;
            let mut by_id = HashMap::with_capacity(found.len());
            for doc in found {
                if let Some(id) = doc.get(ID_FIELD).and_then(Value::as_str).map(str::to_string) {
                    let mut value = document_to_api_value(doc);
                    spec.select.apply(&mut value);
                    by_id.insert(id, Value::Object(value));
                }
            }
            Ok(by_id)
        }
    });
    let resolved = try_join_all(lookups).await?;

    for ((spec, _), by_id) in resolvable.iter().zip(resolved) {
        for doc in docs.iter_mut() {
            let id = match doc.get(&spec.path).and_then(Value::as_str) {
                Some(id) => id.to_string(),
                None => continue,
            };
            let replacement = by_id.get(&id).cloned().unwrap_or(Value::Null);
            doc.insert(spec.path.clone(), replacement);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;
    use crate::schema::MASTER_SCHEMA;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn maps_id_and_hides_password() {
        let out = document_to_api_value(doc(json!({ "name": "a", "_id": "x", "password": "h" })));
        assert_eq!(Value::Object(out.clone()), json!({ "id": "x", "name": "a" }));
        assert_eq!(out.keys().next().map(String::as_str), Some("id"));
    }

    #[test]
    fn projection_forms() {
        let mut d = document_to_api_value(doc(json!({ "_id": "x", "name": "a", "code": "c", "image": "i" })));
        Projection::parse(Some(&json!("name -image"))).apply(&mut d);
        assert_eq!(Value::Object(d), json!({ "id": "x", "name": "a" }));

        let mut d = document_to_api_value(doc(json!({ "_id": "x", "name": "a", "image": "i" })));
        Projection::parse(Some(&json!({ "image": 0 }))).apply(&mut d);
        assert_eq!(Value::Object(d), json!({ "id": "x", "name": "a" }));
    }

    #[test]
    fn populate_spec_forms() {
        let specs = PopulateSpec::parse(Some(&json!(["addedBy", { "path": "parentId", "select": "name" }])));
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[1].path, "parentId");
        assert!(!specs[1].select.is_empty());
    }

    #[tokio::test]
    async fn populates_declared_references() {
        let store = MemoryStore::new();
        store
            .insert_one("user", doc(json!({ "_id": "u1", "username": "admin", "password": "hash" })))
            .await
            .unwrap();
        store.insert_one("master", doc(json!({ "_id": "p1", "name": "Parent" }))).await.unwrap();

        let mut docs = vec![document_to_api_value(doc(json!({
            "_id": "c1", "addedBy": "u1", "parentId": "p1", "updatedBy": "gone"
        })))];
        let specs = PopulateSpec::parse(Some(&json!("addedBy parentId updatedBy name")));
        populate(&store, &MASTER_SCHEMA, &mut docs, &specs).await.unwrap();

        assert_eq!(docs[0]["addedBy"], json!({ "id": "u1", "username": "admin" }));
        assert_eq!(docs[0]["parentId"]["name"], json!("Parent"));
        assert_eq!(docs[0]["updatedBy"], Value::Null);
    }
}

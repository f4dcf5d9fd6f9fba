use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde_json::{Map, Value};

use super::field::{FieldKind, FieldRule};
use crate::database::document::{Document, ObjectId};
use crate::filter::matcher::values_equal;

#[derive(Debug, Clone, PartialEq)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

/// Every failed field of one validation pass, in encounter order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationErrors {
    errors: Vec<FieldError>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(path: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.push(path, message);
        errors
    }

    pub fn push(&mut self, path: &str, message: impl Into<String>) {
        self.errors.push(FieldError { path: path.to_string(), message: message.into() });
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[FieldError] {
        &self.errors
    }

    /// Messages joined with ". "
    pub fn message(&self) -> String {
        self.errors.iter().map(|e| e.message.as_str()).collect::<Vec<_>>().join(". ")
    }

    /// `{path: message}`, first message per path
    pub fn field_errors(&self) -> Map<String, Value> {
        let mut map = Map::new();
        for e in &self.errors {
            map.entry(e.path.clone()).or_insert_with(|| Value::String(e.message.clone()));
        }
        map
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message())
    }
}

impl std::error::Error for ValidationErrors {}

/// Validate a create/update payload. Declared keys are checked and
/// normalized (dates to RFC 3339, ids to lower case); unknown keys pass
/// through untouched.
pub fn validate_document(rules: &[FieldRule], payload: &Value, apply_defaults: bool) -> Result<Document, ValidationErrors> {
    let obj = payload
        .as_object()
        .ok_or_else(|| ValidationErrors::single("value", "\"value\" must be of type object"))?;

    let mut errors = ValidationErrors::new();
    let mut out = obj.clone();
    for rule in rules {
        match obj.get(rule.name) {
            Some(value) => {
                let normalized = check_field(rule, rule.name, value, &mut errors);
                out.insert(rule.name.to_string(), normalized);
            }
            None if apply_defaults => {
                if let Some(default) = &rule.default {
                    out.insert(rule.name.to_string(), default.clone());
                }
            }
            None => {}
        }
    }

    if errors.is_empty() {
        Ok(out)
    } else {
        Err(errors)
    }
}

fn check_field(rule: &FieldRule, path: &str, value: &Value, errors: &mut ValidationErrors) -> Value {
    if value.is_null() && rule.nullable {
        return Value::Null;
    }
    if rule.also_allowed.iter().any(|allowed| values_equal(allowed, value)) {
        return value.clone();
    }
    if value.as_str() == Some("") {
        if rule.allow_empty {
            return value.clone();
        }
        if matches!(rule.kind, FieldKind::String) {
            errors.push(path, format!("\"{}\" is not allowed to be empty", path));
            return value.clone();
        }
    }
    check_kind(&rule.kind, path, value, errors)
}

fn check_kind(kind: &FieldKind, path: &str, value: &Value, errors: &mut ValidationErrors) -> Value {
    match kind {
        FieldKind::Any => value.clone(),
        FieldKind::String => {
            if !value.is_string() {
                fail(errors, path, "must be a string");
            }
            value.clone()
        }
        FieldKind::Integer => {
            match value {
                Value::Number(n) if n.is_i64() || n.is_u64() => {}
                Value::Number(n) if n.as_f64().map(|f| f.fract() == 0.0).unwrap_or(false) => {}
                Value::Number(_) => fail(errors, path, "must be an integer"),
                _ => fail(errors, path, "must be a number"),
            }
            value.clone()
        }
        FieldKind::Number => {
            if !value.is_number() {
                fail(errors, path, "must be a number");
            }
            value.clone()
        }
        FieldKind::Boolean => {
            if !value.is_boolean() {
                fail(errors, path, "must be a boolean");
            }
            value.clone()
        }
        FieldKind::Date => match parse_date(value) {
            Some(normalized) => Value::String(normalized),
            None => {
                fail(errors, path, "must be a valid date");
                value.clone()
            }
        },
        FieldKind::ObjectId => match value.as_str() {
            Some(s) if ObjectId::is_valid(s) => Value::String(s.to_ascii_lowercase()),
            Some(s) => {
                fail(errors, path, &format!("with value \"{}\" fails to match the objectId pattern", s));
                value.clone()
            }
            None => {
                fail(errors, path, "must be a string");
                value.clone()
            }
        },
        FieldKind::Object(keys) => match value.as_object() {
            Some(obj) => {
                let mut out = obj.clone();
                for rule in keys {
                    if let Some(inner) = obj.get(rule.name) {
                        let inner_path = format!("{}.{}", path, rule.name);
                        out.insert(rule.name.to_string(), check_field(rule, &inner_path, inner, errors));
                    }
                }
                Value::Object(out)
            }
            None => {
                fail(errors, path, "must be an object");
                value.clone()
            }
        },
        FieldKind::Array(items) => match value.as_array() {
            Some(values) => match items {
                Some(item_kind) => Value::Array(
                    values
                        .iter()
                        .enumerate()
                        .map(|(i, v)| check_kind(item_kind, &format!("{}[{}]", path, i), v, errors))
                        .collect(),
                ),
                None => value.clone(),
            },
            None => {
                fail(errors, path, "must be an array");
                value.clone()
            }
        },
    }
}

fn fail(errors: &mut ValidationErrors, path: &str, what: &str) {
    errors.push(path, format!("\"{}\" {}", path, what));
}

/// Accepts RFC 3339, `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM:SS[.fff]` (UTC) and
/// epoch milliseconds; returns RFC 3339 with millisecond precision.
pub fn parse_date(value: &Value) -> Option<String> {
    let parsed: DateTime<Utc> = match value {
        Value::Number(n) => Utc.timestamp_millis_opt(n.as_i64()?).single()?,
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                dt.with_timezone(&Utc)
            } else if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
                Utc.from_utc_datetime(&naive)
            } else if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?)
            } else {
                return None;
            }
        }
        _ => return None,
    };
    Some(parsed.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Validate a list/count request body: `query`/`where` objects whose declared
/// fields are each a list, an operator object or the field's scalar type,
/// plus `options` and `isCountOnly`.
pub fn validate_filter(rules: &[FieldRule], body: &Value) -> Result<(), ValidationErrors> {
    let obj = body
        .as_object()
        .ok_or_else(|| ValidationErrors::single("value", "\"value\" must be of type object"))?;
    let mut errors = ValidationErrors::new();

    for key in ["query", "where"] {
        match obj.get(key) {
            None => {}
            Some(Value::Object(query)) => check_query(rules, key, query, &mut errors),
            Some(_) => errors.push(key, format!("\"{}\" must be of type object", key)),
        }
    }

    match obj.get("options") {
        None => {}
        Some(Value::Object(options)) => check_options(options, &mut errors),
        Some(_) => errors.push("options", "\"options\" must be of type object"),
    }

    if let Some(v) = obj.get("isCountOnly") {
        if !v.is_boolean() {
            errors.push("isCountOnly", "\"isCountOnly\" must be a boolean");
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_query(rules: &[FieldRule], key: &str, query: &Map<String, Value>, errors: &mut ValidationErrors) {
    let id_rule = FieldRule::object_id("_id");
    for (field, value) in query {
        let rule = match field.as_str() {
            "id" => continue,
            "_id" => &id_rule,
            name => match rules.iter().find(|r| r.name == name) {
                Some(rule) => rule,
                None => continue,
            },
        };
        let path = format!("{}.{}", key, field);
        let accepted = match value {
            Value::Array(_) | Value::Object(_) => true,
            Value::Null => rule.nullable,
            scalar if rule.kind.is_scalar() => {
                let mut scratch = ValidationErrors::new();
                check_field(rule, &path, scalar, &mut scratch);
                scratch.is_empty()
            }
            _ => false,
        };
        if !accepted {
            errors.push(&path, format!("\"{}\" does not match any of the allowed types", path));
        }
    }
}

fn check_options(options: &Map<String, Value>, errors: &mut ValidationErrors) {
    for key in ["page", "limit"] {
        let path = format!("options.{}", key);
        match options.get(key) {
            None => {}
            Some(Value::Number(n)) => match n.as_i64() {
                Some(v) if v >= 1 => {}
                Some(_) => errors.push(&path, format!("\"{}\" must be greater than or equal to 1", path)),
                None => errors.push(&path, format!("\"{}\" must be an integer", path)),
            },
            Some(_) => errors.push(&path, format!("\"{}\" must be a number", path)),
        }
    }
    if let Some(v) = options.get("pagination") {
        if !v.is_boolean() {
            errors.push("options.pagination", "\"options.pagination\" must be a boolean");
        }
    }
    for key in ["sort", "select", "populate"] {
        if let Some(v) = options.get(key) {
            if !matches!(v, Value::String(_) | Value::Array(_) | Value::Object(_)) {
                let path = format!("options.{}", key);
                errors.push(&path, format!("\"{}\" does not match any of the allowed types", path));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rules() -> Vec<FieldRule> {
        vec![
            FieldRule::text("name"),
            FieldRule::integer("sequence"),
            FieldRule::object_id("parentId").nullable().allow_empty(),
            FieldRule::boolean("isDefault").default_value(json!(false)),
            FieldRule::date("startDateTime").nullable().allow_empty(),
            FieldRule::object("address", vec![FieldRule::string("city"), FieldRule::integer("lat")]).allow(json!(0)),
            FieldRule::new("speakers", FieldKind::array_of(FieldKind::Object(vec![]))),
        ]
    }

    #[test]
    fn accepts_valid_payload_and_applies_defaults() {
        let doc = validate_document(&rules(), &json!({ "name": "Category A", "extra": 1 }), true).unwrap();
        assert_eq!(doc["isDefault"], json!(false));
        assert_eq!(doc["extra"], json!(1));

        let doc = validate_document(&rules(), &json!({ "name": "" }), false).unwrap();
        assert!(doc.get("isDefault").is_none());
    }

    #[test]
    fn reports_every_failing_path() {
        let err = validate_document(
            &rules(),
            &json!({ "name": 5, "sequence": 1.5, "parentId": "xyz", "address": { "city": 3 } }),
            true,
        )
        .unwrap_err();
        assert_eq!(
            err.message(),
            "\"name\" must be a string. \"sequence\" must be an integer. \
             \"parentId\" with value \"xyz\" fails to match the objectId pattern. \"address.city\" must be a string"
        );
        assert!(err.field_errors().contains_key("address.city"));
    }

    #[test]
    fn strict_types_except_dates() {
        assert!(validate_document(&rules(), &json!({ "sequence": "2" }), true).is_err());
        assert!(validate_document(&rules(), &json!({ "isDefault": "true" }), true).is_err());

        let doc = validate_document(&rules(), &json!({ "startDateTime": "2024-03-01" }), true).unwrap();
        assert_eq!(doc["startDateTime"], json!("2024-03-01T00:00:00.000Z"));
        let doc = validate_document(&rules(), &json!({ "startDateTime": 0 }), true).unwrap();
        assert_eq!(doc["startDateTime"], json!("1970-01-01T00:00:00.000Z"));
        assert!(validate_document(&rules(), &json!({ "startDateTime": "soon" }), true).is_err());
    }

    #[test]
    fn literal_allowances_and_array_items() {
        assert!(validate_document(&rules(), &json!({ "address": 0 }), true).is_ok());
        let err = validate_document(&rules(), &json!({ "speakers": [{}, "bob"] }), true).unwrap_err();
        assert_eq!(err.message(), "\"speakers[1]\" must be an object");
    }

    #[test]
    fn normalizes_object_ids() {
        let doc = validate_document(&rules(), &json!({ "parentId": "65A1B2C3D4E5F60718293A4B" }), true).unwrap();
        assert_eq!(doc["parentId"], json!("65a1b2c3d4e5f60718293a4b"));
    }

    #[test]
    fn filter_profile_alternatives() {
        let ok = json!({
            "query": { "name": ["A", "B"], "sequence": { "$gt": 1 }, "id": 42, "unknown": true, "parentId": null },
            "options": { "page": 2, "limit": 5, "pagination": false, "sort": { "name": 1 } },
            "isCountOnly": false
        });
        assert!(validate_filter(&rules(), &ok).is_ok());

        let err = validate_filter(
            &rules(),
            &json!({ "where": { "sequence": "two" }, "options": { "page": 0 }, "isCountOnly": "yes" }),
        )
        .unwrap_err();
        let fields = err.field_errors();
        assert!(fields.contains_key("where.sequence"));
        assert!(fields.contains_key("options.page"));
        assert!(fields.contains_key("isCountOnly"));
    }
}

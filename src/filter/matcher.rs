//! In-process evaluation of parsed query conditions against JSON documents.
//! Semantics follow the SQL rendering in `filter_where`: equality matches
//! array members, ordered comparisons only compare values of the same type,
//! and missing fields behave like `null`.

use std::cmp::Ordering;

use regex::Regex;
use serde_json::{Map, Value};

use super::error::FilterError;
use super::types::{Condition, FilterOp, FilterOrderInfo, FilterWhereInfo, SortDirection};

pub fn matches(doc: &Map<String, Value>, condition: &Condition) -> Result<bool, FilterError> {
    match condition {
        Condition::And(parts) => {
            for part in parts {
                if !matches(doc, part)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Condition::Or(parts) => {
            for part in parts {
                if matches(doc, part)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Condition::Nor(parts) => Ok(!matches(doc, &Condition::Or(parts.clone()))?),
        Condition::Not(inner) => Ok(!matches(doc, inner)?),
        Condition::Field(info) => matches_field(doc, info),
    }
}

fn matches_field(doc: &Map<String, Value>, info: &FilterWhereInfo) -> Result<bool, FilterError> {
    let candidates = resolve(doc, &info.path());

    Ok(match info.operator {
        FilterOp::Eq => equals_any(&candidates, &info.data),
        FilterOp::Ne => !equals_any(&candidates, &info.data),
        FilterOp::Gt => compares(&candidates, &info.data, |o| o == Ordering::Greater),
        FilterOp::Gte => compares(&candidates, &info.data, |o| o != Ordering::Less),
        FilterOp::Lt => compares(&candidates, &info.data, |o| o == Ordering::Less),
        FilterOp::Lte => compares(&candidates, &info.data, |o| o != Ordering::Greater),
        FilterOp::In => in_list(&candidates, &info.data),
        FilterOp::NIn => !in_list(&candidates, &info.data),
        FilterOp::Between => {
            let bounds = info.data.as_array().cloned().unwrap_or_default();
            if bounds.len() != 2 {
                return Err(FilterError::InvalidOperatorData("$between requires exactly 2 values".to_string()));
            }
            compares(&candidates, &bounds[0], |o| o != Ordering::Less)
                && compares(&candidates, &bounds[1], |o| o != Ordering::Greater)
        }
        FilterOp::Size => {
            let size = info.data.as_u64().unwrap_or(u64::MAX);
            candidates.iter().any(|v| matches!(v, Value::Array(a) if a.len() as u64 == size))
        }
        FilterOp::Exists => {
            let present = !candidates.is_empty();
            present == info.data.as_bool().unwrap_or(true)
        }
        FilterOp::Regex => {
            let re = compile(info.data.as_str().unwrap_or_default())?;
            text_matches(&candidates, &re)
        }
        FilterOp::Like | FilterOp::ILike => {
            let pattern = like_to_regex(info.data.as_str().unwrap_or_default(), info.operator == FilterOp::ILike);
            let re = compile(&pattern)?;
            text_matches(&candidates, &re)
        }
    })
}

/// Collects every value a dotted path reaches, descending through arrays
fn resolve<'a>(doc: &'a Map<String, Value>, path: &[&str]) -> Vec<&'a Value> {
    let mut current: Vec<&Value> = match doc.get(path[0]) {
        Some(v) => vec![v],
        None => return vec![],
    };
    for segment in &path[1..] {
        let mut next = Vec::new();
        for value in current {
            match value {
                Value::Object(obj) => {
                    if let Some(v) = obj.get(*segment) {
                        next.push(v);
                    }
                }
                Value::Array(items) => {
                    for item in items {
                        if let Some(v) = item.as_object().and_then(|o| o.get(*segment)) {
                            next.push(v);
                        }
                    }
                }
                _ => {}
            }
        }
        current = next;
    }
    current
}

fn equals_any(candidates: &[&Value], data: &Value) -> bool {
    if data.is_null() && candidates.is_empty() {
        return true;
    }
    candidates.iter().any(|v| {
        values_equal(v, data) || matches!(v, Value::Array(items) if items.iter().any(|i| values_equal(i, data)))
    })
}

fn in_list(candidates: &[&Value], data: &Value) -> bool {
    match data {
        Value::Array(values) => values.iter().any(|v| equals_any(candidates, v)),
        other => equals_any(candidates, other),
    }
}

fn compares(candidates: &[&Value], data: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    candidates
        .iter()
        .any(|v| same_type_cmp(v, data).map(&accept).unwrap_or(false))
}

fn text_matches(candidates: &[&Value], re: &Regex) -> bool {
    candidates.iter().any(|v| v.as_str().map(|s| re.is_match(s)).unwrap_or(false))
}

fn compile(pattern: &str) -> Result<Regex, FilterError> {
    Regex::new(pattern).map_err(|e| FilterError::InvalidOperatorData(format!("invalid pattern: {}", e)))
}

fn like_to_regex(pattern: &str, case_insensitive: bool) -> String {
    let mut out = String::from(if case_insensitive { "(?is)^" } else { "(?s)^" });
    for c in pattern.chars() {
        match c {
            '%' => out.push_str(".*"),
            '_' => out.push('.'),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out.push('$');
    out
}

/// Numeric-aware equality (`1` equals `1.0`)
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::Array(x), Value::Array(y)) => x.len() == y.len() && x.iter().zip(y).all(|(p, q)| values_equal(p, q)),
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len() && x.iter().all(|(k, v)| y.get(k).map(|w| values_equal(v, w)).unwrap_or(false))
        }
        _ => a == b,
    }
}

fn same_type_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn type_rank(v: Option<&Value>) -> u8 {
    match v {
        None | Some(Value::Null) => 0,
        Some(Value::Number(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Object(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Bool(_)) => 5,
    }
}

/// Total order used for in-memory sorting
pub fn compare_for_sort(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let (ra, rb) = (type_rank(a), type_rank(b));
    if ra != rb {
        return ra.cmp(&rb);
    }
    match (a, b) {
        (Some(x), Some(y)) => same_type_cmp(x, y).unwrap_or_else(|| x.to_string().cmp(&y.to_string())),
        _ => Ordering::Equal,
    }
}

/// Sorts documents in place by the given keys; ties keep insertion order
pub fn sort_documents(docs: &mut [Map<String, Value>], order: &[FilterOrderInfo]) {
    if order.is_empty() {
        return;
    }
    docs.sort_by(|a, b| {
        for info in order {
            let path = info.column.split('.').collect::<Vec<_>>();
            let av = resolve(a, &path).first().copied();
            let bv = resolve(b, &path).first().copied();
            let ord = compare_for_sort(av, bv);
            let ord = match info.sort {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

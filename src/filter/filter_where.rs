use serde_json::{Map, Value};

use super::error::FilterError;
use super::types::{Condition, FilterOp, FilterWhereInfo, SqlParam};

/// Parses query objects into a `Condition` tree and renders that tree as a
/// Postgres predicate over the JSONB `doc` column.
pub struct FilterWhere {
    param_values: Vec<SqlParam>,
    param_index: usize,
}

impl FilterWhere {
    pub fn new(starting_param_index: usize) -> Self {
        Self {
            param_values: vec![],
            param_index: starting_param_index,
        }
    }

    /// Parse a query object. `null` and `{}` both mean "match everything".
    pub fn parse(where_data: &Value) -> Result<Condition, FilterError> {
        match where_data {
            Value::Null => Ok(Condition::And(vec![])),
            Value::Object(obj) => Self::parse_object(obj),
            _ => Err(FilterError::InvalidWhereClause("WHERE must be an object".to_string())),
        }
    }

    /// Render a condition; parameters are numbered after `starting_param_index`.
    pub fn generate(condition: &Condition, starting_param_index: usize) -> Result<(String, Vec<SqlParam>), FilterError> {
        let mut filter_where = Self::new(starting_param_index);
        let sql = filter_where.build_sql(condition)?;
        Ok((sql, filter_where.param_values))
    }

    fn parse_object(obj: &Map<String, Value>) -> Result<Condition, FilterError> {
        let mut conditions = Vec::with_capacity(obj.len());
        for (key, value) in obj {
            if key.starts_with('$') {
                conditions.push(Self::parse_logical_operator(key, value)?);
            } else {
                conditions.push(Self::parse_field_condition(key, value)?);
            }
        }
        Ok(match conditions.len() {
            1 => conditions.remove(0),
            _ => Condition::And(conditions),
        })
    }

    fn parse_logical_operator(op: &str, value: &Value) -> Result<Condition, FilterError> {
        match op {
            "$and" | "$or" | "$nor" => {
                let arr = value
                    .as_array()
                    .ok_or_else(|| FilterError::InvalidOperatorData(format!("{} requires array", op)))?;
                let parts = arr.iter().map(Self::parse).collect::<Result<Vec<_>, _>>()?;
                Ok(match op {
                    "$and" => Condition::And(parts),
                    "$or" => Condition::Or(parts),
                    _ => Condition::Nor(parts),
                })
            }
            "$not" => Ok(Condition::Not(Box::new(Self::parse(value)?))),
            _ => Err(FilterError::UnsupportedOperator(op.to_string())),
        }
    }

    fn parse_field_condition(field: &str, value: &Value) -> Result<Condition, FilterError> {
        // `id` is the public name of the stored `_id`
        let column = if field == "id" { "_id".to_string() } else { field.to_string() };
        Self::validate_path(&column)?;

        match value {
            Value::Object(obj) if !obj.is_empty() && obj.keys().all(|k| k.starts_with('$')) => {
                let mut leaves = Vec::new();
                for (op_key, op_val) in obj {
                    match op_key.as_str() {
                        "$options" => continue,
                        "$not" => {
                            let inner = Self::parse_field_condition(&column, op_val)?;
                            leaves.push(Condition::Not(Box::new(inner)));
                        }
                        "$regex" => {
                            let pattern = op_val
                                .as_str()
                                .ok_or_else(|| FilterError::InvalidOperatorData("$regex requires a string".to_string()))?;
                            let flags = obj.get("$options").and_then(Value::as_str).unwrap_or("");
                            let pattern = if flags.contains('i') { format!("(?i){}", pattern) } else { pattern.to_string() };
                            leaves.push(Condition::Field(FilterWhereInfo {
                                column: column.clone(),
                                operator: FilterOp::Regex,
                                data: Value::String(pattern),
                            }));
                        }
                        other => {
                            let operator = FilterOp::from_key(other)
                                .ok_or_else(|| FilterError::UnsupportedOperator(other.to_string()))?;
                            Self::validate_operator_data(operator, op_val)?;
                            leaves.push(Condition::Field(FilterWhereInfo { column: column.clone(), operator, data: op_val.clone() }));
                        }
                    }
                }
                Ok(match leaves.len() {
                    1 => leaves.remove(0),
                    _ => Condition::And(leaves),
                })
            }
            // A bare list means "any of these values"
            Value::Array(_) => Ok(Condition::Field(FilterWhereInfo { column, operator: FilterOp::In, data: value.clone() })),
            _ => Ok(Condition::Field(FilterWhereInfo { column, operator: FilterOp::Eq, data: value.clone() })),
        }
    }

    fn validate_operator_data(operator: FilterOp, data: &Value) -> Result<(), FilterError> {
        match operator {
            FilterOp::In | FilterOp::NIn if !data.is_array() => {
                Err(FilterError::InvalidOperatorData("$in/$nin require an array".to_string()))
            }
            FilterOp::Between => match data.as_array() {
                Some(values) if values.len() == 2 => Ok(()),
                _ => Err(FilterError::InvalidOperatorData("$between requires array with 2 values".to_string())),
            },
            FilterOp::Size if data.as_i64().is_none() => {
                Err(FilterError::InvalidOperatorData("$size requires an integer".to_string()))
            }
            FilterOp::Exists if !data.is_boolean() => {
                Err(FilterError::InvalidOperatorData("$exists requires a boolean".to_string()))
            }
            FilterOp::Like | FilterOp::ILike if !data.is_string() => {
                Err(FilterError::InvalidOperatorData("$like/$ilike require a string".to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Field paths are embedded into SQL text, so only plain identifiers are allowed
    pub fn validate_path(path: &str) -> Result<(), FilterError> {
        let valid = !path.is_empty()
            && path.split('.').all(|segment| {
                !segment.is_empty() && segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            });
        if valid {
            Ok(())
        } else {
            Err(FilterError::InvalidField(path.to_string()))
        }
    }

    fn build_sql(&mut self, condition: &Condition) -> Result<String, FilterError> {
        match condition {
            Condition::And(parts) => {
                if parts.is_empty() { return Ok("TRUE".to_string()); }
                let sql = parts.iter().map(|p| self.build_sql(p)).collect::<Result<Vec<_>, _>>()?;
                Ok(format!("({})", sql.join(" AND ")))
            }
            Condition::Or(parts) => {
                if parts.is_empty() { return Ok("FALSE".to_string()); }
                let sql = parts.iter().map(|p| self.build_sql(p)).collect::<Result<Vec<_>, _>>()?;
                Ok(format!("({})", sql.join(" OR ")))
            }
            Condition::Nor(parts) => {
                let inner = self.build_sql(&Condition::Or(parts.clone()))?;
                Ok(format!("NOT COALESCE({}, FALSE)", inner))
            }
            Condition::Not(inner) => {
                let inner = self.build_sql(inner)?;
                Ok(format!("NOT COALESCE({}, FALSE)", inner))
            }
            Condition::Field(info) => self.build_sql_condition(info),
        }
    }

    fn build_sql_condition(&mut self, condition: &FilterWhereInfo) -> Result<String, FilterError> {
        let json_expr = Self::json_path(&condition.column);
        let text_expr = Self::text_path(&condition.column);

        match condition.operator {
            FilterOp::Eq => Ok(self.equality(&json_expr, &condition.data)),
            FilterOp::Ne => {
                let eq = self.equality(&json_expr, &condition.data);
                Ok(format!("NOT COALESCE({}, FALSE)", eq))
            }
            FilterOp::Gt => Ok(self.comparison(&json_expr, ">", &condition.data)),
            FilterOp::Gte => Ok(self.comparison(&json_expr, ">=", &condition.data)),
            FilterOp::Lt => Ok(self.comparison(&json_expr, "<", &condition.data)),
            FilterOp::Lte => Ok(self.comparison(&json_expr, "<=", &condition.data)),
            FilterOp::Like | FilterOp::ILike | FilterOp::Regex => {
                let pattern = condition.data.as_str().unwrap_or_default().to_string();
                let op = match condition.operator {
                    FilterOp::Like => "LIKE",
                    FilterOp::ILike => "ILIKE",
                    _ => "~",
                };
                let p = self.param(SqlParam::Text(pattern));
                Ok(format!("(jsonb_typeof({}) = 'string' AND {} {} {})", json_expr, text_expr, op, p))
            }
            FilterOp::In => Ok(self.membership(&json_expr, &condition.data)),
            FilterOp::NIn => {
                let any = self.membership(&json_expr, &condition.data);
                Ok(format!("NOT COALESCE({}, FALSE)", any))
            }
            FilterOp::Between => {
                let values = condition.data.as_array().cloned().unwrap_or_default();
                if values.len() != 2 {
                    return Err(FilterError::InvalidOperatorData("$between requires exactly 2 values".to_string()));
                }
                let low = self.param(SqlParam::Json(values[0].clone()));
                let high = self.param(SqlParam::Json(values[1].clone()));
                Ok(format!(
                    "(jsonb_typeof({e}) = jsonb_typeof({low}) AND {e} BETWEEN {low} AND {high})",
                    e = json_expr, low = low, high = high
                ))
            }
            FilterOp::Size => {
                let size = condition.data.as_i64().unwrap_or(0);
                let p = self.param(SqlParam::Int(size));
                Ok(format!("(jsonb_typeof({e}) = 'array' AND jsonb_array_length({e}) = {p})", e = json_expr, p = p))
            }
            FilterOp::Exists => {
                if condition.data.as_bool().unwrap_or(true) {
                    Ok(format!("({} IS NOT NULL)", json_expr))
                } else {
                    Ok(format!("({} IS NULL)", json_expr))
                }
            }
        }
    }

    /// Equality also matches arrays that contain the value
    fn equality(&mut self, expr: &str, data: &Value) -> String {
        if data.is_null() {
            return format!("({e} IS NULL OR {e} = 'null'::jsonb)", e = expr);
        }
        let p = self.param(SqlParam::Json(data.clone()));
        format!(
            "({e} = {p} OR (jsonb_typeof({e}) = 'array' AND {e} @> jsonb_build_array({p})))",
            e = expr, p = p
        )
    }

    fn comparison(&mut self, expr: &str, op: &str, data: &Value) -> String {
        let p = self.param(SqlParam::Json(data.clone()));
        format!("(jsonb_typeof({e}) = jsonb_typeof({p}) AND {e} {op} {p})", e = expr, p = p, op = op)
    }

    fn membership(&mut self, expr: &str, data: &Value) -> String {
        match data {
            Value::Array(values) => {
                if values.is_empty() { return "FALSE".to_string(); }
                let parts: Vec<String> = values.iter().map(|v| self.equality(expr, v)).collect();
                format!("({})", parts.join(" OR "))
            }
            other => self.equality(expr, other),
        }
    }

    fn json_path(column: &str) -> String {
        format!("(doc #> '{{{}}}')", column.replace('.', ","))
    }

    fn text_path(column: &str) -> String {
        format!("(doc #>> '{{{}}}')", column.replace('.', ","))
    }

    fn param(&mut self, value: SqlParam) -> String {
        self.param_values.push(value);
        self.param_index += 1;
        format!("${}", self.param_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_implicit_equality_and_renames_id() {
        let condition = FilterWhere::parse(&json!({ "id": "65a1b2c3d4e5f60718293a4b" })).unwrap();
        assert_eq!(
            condition,
            Condition::Field(FilterWhereInfo {
                column: "_id".to_string(),
                operator: FilterOp::Eq,
                data: json!("65a1b2c3d4e5f60718293a4b"),
            })
        );
    }

    #[test]
    fn bare_list_becomes_in() {
        let condition = FilterWhere::parse(&json!({ "code": ["A", "B"] })).unwrap();
        match condition {
            Condition::Field(info) => assert_eq!(info.operator, FilterOp::In),
            other => panic!("unexpected condition: {:?}", other),
        }
    }

    #[test]
    fn rejects_unknown_operator() {
        let err = FilterWhere::parse(&json!({ "name": { "$where": "1" } })).unwrap_err();
        assert!(matches!(err, FilterError::UnsupportedOperator(_)));
    }

    #[test]
    fn rejects_unsafe_field_names() {
        let err = FilterWhere::parse(&json!({ "name'}; DROP": 1 })).unwrap_err();
        assert!(matches!(err, FilterError::InvalidField(_)));
    }

    #[test]
    fn generates_numbered_params() {
        let condition = FilterWhere::parse(&json!({
            "isDeleted": false,
            "sequence": { "$gte": 2 },
            "$or": [{ "code": "A" }, { "name": { "$regex": "^cat", "$options": "i" } }]
        }))
        .unwrap();
        let (sql, params) = FilterWhere::generate(&condition, 0).unwrap();
        assert_eq!(params.len(), 4);
        assert!(sql.contains("$4"));
        assert!(sql.contains("(doc #> '{isDeleted}')"));
        assert!(params.contains(&SqlParam::Text("(?i)^cat".to_string())));
    }

    #[test]
    fn empty_in_matches_nothing() {
        let condition = FilterWhere::parse(&json!({ "_id": { "$in": [] } })).unwrap();
        let (sql, params) = FilterWhere::generate(&condition, 0).unwrap();
        assert_eq!(sql, "FALSE");
        assert!(params.is_empty());
    }

    #[test]
    fn nested_paths_render_as_json_paths() {
        let condition = FilterWhere::parse(&json!({ "address.city": "Pune" })).unwrap();
        let (sql, _) = FilterWhere::generate(&condition, 3).unwrap();
        assert!(sql.contains("(doc #> '{address,city}')"));
        assert!(sql.contains("$4"));
    }
}

use serde_json::Value;

use super::error::FilterError;
use super::filter_order::FilterOrder;
use super::filter_where::FilterWhere;
use super::types::{Condition, FilterOrderInfo, SqlParam, SqlResult};

/// Statement builder for one collection table `(id TEXT, doc JSONB)`.
pub struct Filter {
    table_name: String,
    condition: Condition,
    order_data: Vec<FilterOrderInfo>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl Filter {
    pub fn new(table_name: impl Into<String>) -> Result<Self, FilterError> {
        let table_name = table_name.into();
        Self::validate_table_name(&table_name)?;
        Ok(Self {
            table_name,
            condition: Condition::And(vec![]),
            order_data: vec![],
            limit: None,
            offset: None,
        })
    }

    pub fn where_clause(&mut self, conditions: &Value) -> Result<&mut Self, FilterError> {
        self.condition = FilterWhere::parse(conditions)?;
        Ok(self)
    }

    pub fn order(&mut self, order_data: Vec<FilterOrderInfo>) -> &mut Self {
        self.order_data = order_data;
        self
    }

    pub fn limit(&mut self, limit: Option<u64>, offset: Option<u64>) -> &mut Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    pub fn to_sql(&self) -> Result<SqlResult, FilterError> {
        let (where_clause, params) = FilterWhere::generate(&self.condition, 0)?;
        let order_clause = FilterOrder::generate(&self.order_data);
        let limit_clause = self.build_limit_clause();

        let query = [
            format!("SELECT doc FROM \"{}\"", self.table_name),
            format!("WHERE {}", where_clause),
            // Natural order is insertion order
            if order_clause.is_empty() { "ORDER BY seq ASC".to_string() } else { format!("{}, seq ASC", order_clause) },
            limit_clause,
        ]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

        Ok(SqlResult { query, params })
    }

    pub fn to_count_sql(&self) -> Result<SqlResult, FilterError> {
        let (where_clause, params) = FilterWhere::generate(&self.condition, 0)?;
        let query = format!("SELECT COUNT(*) AS count FROM \"{}\" WHERE {}", self.table_name, where_clause);
        Ok(SqlResult { query, params })
    }

    /// Shallow `$set`: top-level keys of `$1` replace the stored ones
    pub fn to_update_sql(&self, set: Value, single: bool) -> Result<SqlResult, FilterError> {
        let (where_clause, mut where_params) = FilterWhere::generate(&self.condition, 1)?;
        let target = self.target_clause(&where_clause, single);
        let query = format!(
            "UPDATE \"{t}\" SET doc = doc || $1 WHERE {target} RETURNING doc",
            t = self.table_name,
            target = target
        );
        let mut params = vec![SqlParam::Json(set)];
        params.append(&mut where_params);
        Ok(SqlResult { query, params })
    }

    pub fn to_delete_sql(&self, single: bool) -> Result<SqlResult, FilterError> {
        let (where_clause, params) = FilterWhere::generate(&self.condition, 0)?;
        let target = self.target_clause(&where_clause, single);
        let query = format!("DELETE FROM \"{}\" WHERE {} RETURNING doc", self.table_name, target);
        Ok(SqlResult { query, params })
    }

    fn target_clause(&self, where_clause: &str, single: bool) -> String {
        if single {
            format!(
                "id IN (SELECT id FROM \"{t}\" WHERE {w} ORDER BY seq ASC LIMIT 1)",
                t = self.table_name,
                w = where_clause
            )
        } else {
            where_clause.to_string()
        }
    }

    pub fn validate_table_name(name: &str) -> Result<(), FilterError> {
        let mut chars = name.chars();
        let valid_start = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
        if !valid_start || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(FilterError::InvalidCollection(format!("Invalid collection name format: {}", name)));
        }
        Ok(())
    }

    fn build_limit_clause(&self) -> String {
        match (self.limit, self.offset) {
            (Some(l), Some(o)) if o > 0 => format!("LIMIT {} OFFSET {}", l, o),
            (Some(l), _) => format!("LIMIT {}", l),
            (None, Some(o)) if o > 0 => format!("OFFSET {}", o),
            _ => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_bad_table_names() {
        assert!(Filter::new("master").is_ok());
        assert!(Filter::new("1master").is_err());
        assert!(Filter::new("master; drop").is_err());
    }

    #[test]
    fn select_with_page() {
        let mut filter = Filter::new("event").unwrap();
        filter.where_clause(&json!({ "isDeleted": false })).unwrap();
        filter.limit(Some(10), Some(20));
        let sql = filter.to_sql().unwrap();
        assert!(sql.query.starts_with("SELECT doc FROM \"event\" WHERE"));
        assert!(sql.query.ends_with("ORDER BY seq ASC LIMIT 10 OFFSET 20"));
        assert_eq!(sql.params.len(), 1);
    }

    #[test]
    fn update_reserves_first_param_for_patch() {
        let mut filter = Filter::new("master").unwrap();
        filter.where_clause(&json!({ "_id": "65a1b2c3d4e5f60718293a4b" })).unwrap();
        let sql = filter.to_update_sql(json!({ "isDeleted": true }), true).unwrap();
        assert!(sql.query.contains("SET doc = doc || $1"));
        assert!(sql.query.contains("$2"));
        assert!(sql.query.contains("LIMIT 1"));
        assert_eq!(sql.params[0], SqlParam::Json(json!({ "isDeleted": true })));
    }

    #[test]
    fn count_without_conditions() {
        let filter = Filter::new("event").unwrap();
        let sql = filter.to_count_sql().unwrap();
        assert_eq!(sql.query, "SELECT COUNT(*) AS count FROM \"event\" WHERE TRUE");
    }
}

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    #[serde(rename = "$eq")] Eq,
    #[serde(rename = "$ne")] Ne,
    #[serde(rename = "$gt")] Gt,
    #[serde(rename = "$gte")] Gte,
    #[serde(rename = "$lt")] Lt,
    #[serde(rename = "$lte")] Lte,

    #[serde(rename = "$like")] Like,
    #[serde(rename = "$ilike")] ILike,
    #[serde(rename = "$regex")] Regex,

    #[serde(rename = "$in")] In,
    #[serde(rename = "$nin")] NIn,

    #[serde(rename = "$between")] Between,
    #[serde(rename = "$size")] Size,
    #[serde(rename = "$exists")] Exists,
}

impl FilterOp {
    pub fn from_key(key: &str) -> Option<Self> {
        Some(match key {
            "$eq" => FilterOp::Eq,
            "$ne" | "$neq" => FilterOp::Ne,
            "$gt" => FilterOp::Gt,
            "$gte" => FilterOp::Gte,
            "$lt" => FilterOp::Lt,
            "$lte" => FilterOp::Lte,
            "$like" => FilterOp::Like,
            "$ilike" => FilterOp::ILike,
            "$regex" => FilterOp::Regex,
            "$in" => FilterOp::In,
            "$nin" => FilterOp::NIn,
            "$between" => FilterOp::Between,
            "$size" => FilterOp::Size,
            "$exists" => FilterOp::Exists,
            _ => return None,
        })
    }
}

/// One field predicate. `column` is a dotted path into the document.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterWhereInfo {
    pub column: String,
    pub operator: FilterOp,
    pub data: Value,
}

impl FilterWhereInfo {
    pub fn path(&self) -> Vec<&str> {
        self.column.split('.').collect()
    }
}

/// Parsed form of a MongoDB-style query object
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Nor(Vec<Condition>),
    Not(Box<Condition>),
    Field(FilterWhereInfo),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterOrderInfo {
    pub column: String,
    pub sort: SortDirection,
}

/// Positional parameter of a generated statement
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Json(Value),
    Text(String),
    Int(i64),
}

#[derive(Debug, Clone)]
pub struct SqlResult {
    pub query: String,
    pub params: Vec<SqlParam>,
}

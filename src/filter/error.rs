use thiserror::Error;

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Invalid collection name: {0}")]
    InvalidCollection(String),

    #[error("Invalid field name: {0}")]
    InvalidField(String),

    #[error("Invalid WHERE clause: {0}")]
    InvalidWhereClause(String),

    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("Invalid operator data: {0}")]
    InvalidOperatorData(String),

    #[error("Invalid sort specification: {0}")]
    InvalidSort(String),
}

pub mod crud;
pub mod dependents;
pub mod user_service;

use thiserror::Error;

use crate::database::DatabaseError;
use crate::filter::FilterError;
use crate::schema::ValidationErrors;

pub use crud::{CrudService, DeletionPolicy, ResourceDef};
pub use dependents::{DeletionReport, DependencyEdge, DependencyError, DependentService, DEPENDENCY_EDGES};
pub use user_service::{NewUser, UserService};

/// Outcome of a rejected service call; each maps onto one response envelope
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Filter/list payload failed its profile
    #[error("{0}")]
    Validation(ValidationErrors),

    /// Create/update payload failed its profile
    #[error("Invalid values in parameters, {0}")]
    InvalidParameters(ValidationErrors),

    #[error("invalid objectId.")]
    InvalidId,

    #[error("bad request: {}", .0.as_deref().unwrap_or("missing parameters"))]
    BadRequest(Option<String>),

    #[error("record not found")]
    NotFound,

    #[error("{0}")]
    Failure(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Dependency(#[from] DependencyError),
}

impl From<FilterError> for ServiceError {
    fn from(err: FilterError) -> Self {
        ServiceError::Validation(ValidationErrors::single("query", err.to_string()))
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

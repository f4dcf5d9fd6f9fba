// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Map, Value};

use crate::database::DatabaseError;
use crate::schema::ValidationErrors;
use crate::services::{DependencyError, ServiceError};

/// HTTP API error; every variant renders as the `{status, message, data}` envelope
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),
    Failure(String),

    // 401 Unauthorized
    Unauthorized(String),

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    RecordNotFound(String),

    // 409 Conflict
    DuplicateKey(String),

    // 422 Unprocessable Entity
    ValidationError {
        message: String,
        field_errors: Option<Map<String, Value>>,
    },

    // 500 Internal Server Error
    InternalServerError(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::Failure(_) => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::Forbidden(_) => 403,
            ApiError::RecordNotFound(_) => 404,
            ApiError::DuplicateKey(_) => 409,
            ApiError::ValidationError { .. } => 422,
            ApiError::InternalServerError(_) => 500,
            ApiError::ServiceUnavailable(_) => 503,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::Failure(msg) => msg,
            ApiError::Unauthorized(msg) => msg,
            ApiError::Forbidden(msg) => msg,
            ApiError::RecordNotFound(msg) => msg,
            ApiError::DuplicateKey(msg) => msg,
            ApiError::ValidationError { message, .. } => message,
            ApiError::InternalServerError(msg) => msg,
            ApiError::ServiceUnavailable(msg) => msg,
        }
    }

    /// Get envelope status for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Failure(_) => "FAILURE",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::RecordNotFound(_) => "RECORD_NOT_FOUND",
            ApiError::DuplicateKey(_) => "DUPLICATE_KEY",
            ApiError::ValidationError { .. } => "VALIDATION_ERROR",
            ApiError::InternalServerError(_) | ApiError::ServiceUnavailable(_) => "SERVER_ERROR",
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        let data = match self {
            ApiError::ValidationError { field_errors: Some(field_errors), .. } => {
                json!({ "fieldErrors": field_errors })
            }
            _ => Value::Null,
        };
        json!({
            "status": self.error_code(),
            "message": self.message(),
            "data": data
        })
    }
}

// Static constructor methods
impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    /// Bad request with the stock message
    pub fn bad_request_default() -> Self {
        Self::bad_request("Request parameters are invalid or missing.")
    }

    pub fn failure(message: impl Into<String>) -> Self {
        ApiError::Failure(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn record_not_found() -> Self {
        ApiError::RecordNotFound("Record not found with specified criteria.".to_string())
    }

    pub fn duplicate_key(message: impl Into<String>) -> Self {
        ApiError::DuplicateKey(message.into())
    }

    pub fn validation_error(message: impl Into<String>, field_errors: Option<Map<String, Value>>) -> Self {
        ApiError::ValidationError {
            message: message.into(),
            field_errors,
        }
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

// Convert other error types to ApiError
impl From<ValidationErrors> for ApiError {
    fn from(err: ValidationErrors) -> Self {
        ApiError::validation_error(err.message(), Some(err.field_errors()))
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::DuplicateKey { collection, field } => {
                tracing::warn!("Duplicate key on {}.{}", collection, field);
                ApiError::duplicate_key(format!("Data duplication found. {} already exists", field))
            }
            DatabaseError::ConfigMissing(key) => {
                tracing::error!("Missing configuration: {}", key);
                ApiError::service_unavailable("Service unavailable.")
            }
            other => {
                tracing::error!("Database error: {}", other);
                ApiError::internal_server_error(other.to_string())
            }
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(errors) => errors.into(),
            ServiceError::InvalidParameters(errors) => ApiError::validation_error(
                format!("Invalid values in parameters, {}", errors.message()),
                Some(errors.field_errors()),
            ),
            ServiceError::InvalidId => ApiError::validation_error("invalid objectId.", None),
            ServiceError::BadRequest(None) => ApiError::bad_request_default(),
            ServiceError::BadRequest(Some(message)) => ApiError::bad_request(message),
            ServiceError::NotFound => ApiError::record_not_found(),
            ServiceError::Failure(message) => ApiError::failure(message),
            ServiceError::Database(db) => db.into(),
            ServiceError::Dependency(DependencyError::Database(db)) => db.into(),
            ServiceError::Dependency(dep) => {
                tracing::warn!("Cascade rejected: {}", dep);
                ApiError::failure(dep.to_string())
            }
        }
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_statuses() {
        let cases = [
            (ApiError::bad_request_default(), 400, "BAD_REQUEST"),
            (ApiError::failure("x"), 400, "FAILURE"),
            (ApiError::record_not_found(), 404, "RECORD_NOT_FOUND"),
            (ApiError::duplicate_key("x"), 409, "DUPLICATE_KEY"),
            (ApiError::validation_error("x", None), 422, "VALIDATION_ERROR"),
            (ApiError::internal_server_error("x"), 500, "SERVER_ERROR"),
            (ApiError::service_unavailable("x"), 503, "SERVER_ERROR"),
        ];
        for (err, code, status) in cases {
            assert_eq!(err.status_code(), code);
            assert_eq!(err.to_json()["status"], json!(status));
        }
    }

    #[test]
    fn validation_error_carries_field_errors() {
        let err: ApiError = ValidationErrors::single("name", "\"name\" must be a string").into();
        let body = err.to_json();
        assert_eq!(body["message"], json!("\"name\" must be a string"));
        assert_eq!(body["data"]["fieldErrors"]["name"], json!("\"name\" must be a string"));
    }

    #[test]
    fn create_validation_is_prefixed() {
        let err: ApiError =
            ServiceError::InvalidParameters(ValidationErrors::single("sequence", "\"sequence\" must be a number")).into();
        assert_eq!(err.message(), "Invalid values in parameters, \"sequence\" must be a number");
        assert_eq!(err.status_code(), 422);
    }

    #[test]
    fn duplicate_key_maps_to_conflict() {
        let err: ApiError = DatabaseError::DuplicateKey { collection: "user".into(), field: "email".into() }.into();
        assert_eq!(err.status_code(), 409);
    }
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::json;

const DEFAULT_MESSAGE: &str = "Your request is successfully executed";

/// Success envelope: `{status: "SUCCESS", message, data}`
#[derive(Debug)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self { data, message: None }
    }

    /// Success with a custom message in place of the stock one
    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            data,
            message: Some(message.into()),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let data_value = match serde_json::to_value(&self.data) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("Failed to serialize response data: {}", e);
                return crate::error::ApiError::internal_server_error("Internal server error.").into_response();
            }
        };

        let envelope = json!({
            "status": "SUCCESS",
            "message": self.message.as_deref().unwrap_or(DEFAULT_MESSAGE),
            "data": data_value
        });

        (StatusCode::OK, Json(envelope)).into_response()
    }
}

pub type ApiResult<T> = Result<ApiResponse<T>, crate::error::ApiError>;

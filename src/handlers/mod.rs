//! Route handlers. Each resource router carries its service as state; the
//! auth, user and permission layers are applied per tier in `app`.

pub mod crud;
pub mod user;

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Request},
};
use serde_json::{json, Value};

use crate::error::ApiError;

/// JSON request body. An empty body reads as `{}`; anything unparsable is a bad request.
#[derive(Debug, Clone)]
pub struct Payload(pub Value);

#[async_trait]
impl<S> FromRequest<S> for Payload
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state).await.map_err(|e| {
            tracing::warn!("Failed to read request body: {}", e);
            ApiError::bad_request(e.body_text())
        })?;
        parse_body(&bytes).map(Payload)
    }
}

fn parse_body(bytes: &[u8]) -> Result<Value, ApiError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(json!({}));
    }
    serde_json::from_slice(bytes).map_err(|e| {
        tracing::debug!("Malformed JSON body: {}", e);
        ApiError::bad_request_default()
    })
}

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use serde_json::Value;

use super::auth::AuthUser;
use crate::error::ApiError;
use crate::services::UserService;

/// Caller's stored account, loaded after the token checks out. The stored
/// role is authoritative over the role claim in the token.
#[derive(Clone, Debug)]
pub struct ValidatedUser {
    pub id: String,
    pub role: Option<String>,
}

/// Rejects tokens whose user no longer exists, is soft-deleted or inactive
pub async fn validate_user_middleware(
    State(users): State<Arc<UserService>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_user = request
        .extensions()
        .get::<AuthUser>()
        .cloned()
        .ok_or_else(|| ApiError::unauthorized("You are not authorized to access the request"))?;

    let user = users.find_active(&auth_user.user_id).await?.ok_or_else(|| {
        tracing::warn!("User validation failed: '{}' not found or inactive", auth_user.user_id);
        ApiError::unauthorized("You are not authorized to access the request")
    })?;

    let field = |key: &str| user.get(key).and_then(Value::as_str).map(str::to_string);
    let validated = ValidatedUser {
        id: auth_user.user_id.clone(),
        role: field("role"),
    };
    if validated.role.as_deref() != Some(auth_user.role.as_str()) {
        tracing::debug!("Token role '{}' differs from stored role {:?} for {}", auth_user.role, validated.role, validated.id);
    }
    tracing::debug!("User validation successful: {}", validated.id);

    request.extensions_mut().insert(validated);
    Ok(next.run(request).await)
}

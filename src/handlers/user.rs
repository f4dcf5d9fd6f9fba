use std::sync::Arc;

use axum::{
    extract::State,
    routing::{get, put},
    Extension, Router,
};
use serde_json::Value;

use super::Payload;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::UserService;

pub fn routes(users: Arc<UserService>) -> Router {
    Router::new()
        .route("/me", get(me))
        .route("/change-password", put(change_password))
        .route("/update-profile", put(update_profile))
        .with_state(users)
}

/// GET /user/me
pub async fn me(State(users): State<Arc<UserService>>, Extension(user): Extension<AuthUser>) -> ApiResult<Value> {
    Ok(ApiResponse::success(users.me(&user.user_id).await?))
}

/// PUT /user/change-password
pub async fn change_password(
    State(users): State<Arc<UserService>>,
    Extension(user): Extension<AuthUser>,
    Payload(body): Payload,
) -> ApiResult<Value> {
    users.change_password(&user.user_id, &body).await?;
    Ok(ApiResponse::with_message(Value::Null, "Password changed successfully"))
}

/// PUT /user/update-profile
pub async fn update_profile(
    State(users): State<Arc<UserService>>,
    Extension(user): Extension<AuthUser>,
    Payload(body): Payload,
) -> ApiResult<Value> {
    Ok(ApiResponse::success(users.update_profile(&user.user_id, &body).await?))
}

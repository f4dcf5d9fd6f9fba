use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use super::validate_user::ValidatedUser;
use crate::error::ApiError;
use crate::types::Platform;

/// Role gate for a route tier, checked against the stored account role
pub async fn permission_middleware(
    State(platform): State<Platform>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<ValidatedUser>()
        .ok_or_else(|| ApiError::unauthorized("You are not authorized to access the request"))?;

    let allowed = user
        .role
        .as_deref()
        .map(|role| platform.allowed_roles().contains(&role))
        .unwrap_or(false);
    if !allowed {
        tracing::warn!("Role {:?} of user {} denied on the {} tier", user.role, user.id, platform);
        return Err(ApiError::forbidden("You do not have permission for this action"));
    }

    Ok(next.run(request).await)
}

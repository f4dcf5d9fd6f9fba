use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::auth::{decode_jwt, Claims};
use crate::error::ApiError;
use crate::types::Platform;

/// Authenticated caller extracted from the bearer token
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: String,
    pub platform: Platform,
    pub role: String,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            platform: claims.platform,
            role: claims.role,
        }
    }
}

/// Validates the bearer token and requires it to be issued for the tier's platform
pub async fn jwt_auth_middleware(
    State(platform): State<Platform>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_jwt_from_headers(&headers).map_err(|msg| {
        tracing::warn!("Rejected request to {}: {}", request.uri().path(), msg);
        ApiError::unauthorized("You are not authorized to access the request")
    })?;

    let claims = decode_jwt(&token).map_err(|e| {
        tracing::warn!("Rejected token: {}", e);
        ApiError::unauthorized("You are not authorized to access the request")
    })?;

    if claims.platform != platform {
        tracing::warn!("Token for platform '{}' used on the {} tier", claims.platform, platform);
        return Err(ApiError::unauthorized("You are not authorized to access the request"));
    }

    request.extensions_mut().insert(AuthUser::from(claims));
    Ok(next.run(request).await)
}

/// Extract JWT token from Authorization header
fn extract_jwt_from_headers(headers: &HeaderMap) -> Result<String, String> {
    let auth_header = headers
        .get("authorization")
        .ok_or_else(|| "Missing Authorization header".to_string())?;

    let auth_str = auth_header
        .to_str()
        .map_err(|_| "Invalid Authorization header format".to_string())?;

    if let Some(token) = auth_str.strip_prefix("Bearer ") {
        if token.trim().is_empty() {
            return Err("Empty JWT token".to_string());
        }
        Ok(token.trim().to_string())
    } else {
        Err("Authorization header must use Bearer token format".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_header_parsing() {
        let mut headers = HeaderMap::new();
        assert!(extract_jwt_from_headers(&headers).is_err());

        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert!(extract_jwt_from_headers(&headers).is_err());

        headers.insert("authorization", HeaderValue::from_static("Bearer  "));
        assert!(extract_jwt_from_headers(&headers).is_err());

        headers.insert("authorization", HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(extract_jwt_from_headers(&headers).unwrap(), "abc.def.ghi");
    }
}

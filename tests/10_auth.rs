mod common;

use anyhow::Result;
use axum::http::{Method, StatusCode};
use serde_json::json;

use common::{assert_envelope, token, TestApp, ADMIN, DEVICE};
use eventmaster_api::database::DocumentStore;
use eventmaster_api::types::Platform;

#[tokio::test]
async fn index_and_health_are_public() -> Result<()> {
    let app = TestApp::new().await?;

    let (status, body) = app.request(Method::GET, "/", None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], json!("eventmaster-api"));

    let (status, body) = app.request(Method::GET, "/health", None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_envelope(&body, "SUCCESS");
    assert_eq!(body["data"]["database"], json!("memory"));
    Ok(())
}

#[tokio::test]
async fn missing_or_garbage_token_is_unauthorized() -> Result<()> {
    let app = TestApp::new().await?;

    let (status, body) = app.request(Method::POST, &format!("{}/event/list", ADMIN), None, Some(json!({}))).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_envelope(&body, "UNAUTHORIZED");

    let (status, _) = app
        .request(Method::POST, &format!("{}/event/list", ADMIN), Some("not.a.token"), Some(json!({})))
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn token_platform_must_match_tier() -> Result<()> {
    let app = TestApp::new().await?;

    let (status, _) = app
        .request(Method::GET, &format!("{}/user/me", ADMIN), Some(&app.device_token), None)
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .request(Method::GET, &format!("{}/user/me", DEVICE), Some(&app.admin_token), None)
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn plain_users_are_forbidden_on_admin_tier() -> Result<()> {
    let app = TestApp::new().await?;
    let user_on_admin = token(&app.device_id, Platform::Admin, "user")?;

    let (status, body) = app
        .request(Method::GET, &format!("{}/user/me", ADMIN), Some(&user_on_admin), None)
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_envelope(&body, "FORBIDDEN");

    // admins may use the device tier
    let admin_on_device = token(&app.admin_id, Platform::Device, "admin")?;
    let (status, _) = app
        .request(Method::GET, &format!("{}/user/me", DEVICE), Some(&admin_on_device), None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn stored_role_overrides_token_role() -> Result<()> {
    let app = TestApp::new().await?;

    // stored role is "user"; the token claims "admin"
    let escalated = token(&app.device_id, Platform::Admin, "admin")?;
    let (status, _) = app
        .request(Method::GET, &format!("{}/user/me", ADMIN), Some(&escalated), None)
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // demoting a stored admin takes effect before the token expires
    let mut set = serde_json::Map::new();
    set.insert("role".to_string(), json!("user"));
    app.store.update_one("user", &json!({ "_id": app.admin_id }), &set).await?;
    let (status, _) = app.admin(Method::GET, "/user/me", None).await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    Ok(())
}

#[tokio::test]
async fn deleted_or_inactive_users_are_rejected() -> Result<()> {
    let app = TestApp::new().await?;

    let mut set = serde_json::Map::new();
    set.insert("isActive".to_string(), json!(false));
    app.store
        .update_one("user", &json!({ "_id": app.device_id }), &set)
        .await?;

    let (status, _) = app.device(Method::GET, "/user/me", None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let stranger = token("65a1b2c3d4e5f60718293a4b", Platform::Admin, "admin")?;
    let (status, _) = app
        .request(Method::GET, &format!("{}/user/me", ADMIN), Some(&stranger), None)
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

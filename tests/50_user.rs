mod common;

use anyhow::Result;
use axum::http::{Method, StatusCode};
use serde_json::json;

use common::{seed_user, TestApp};
use eventmaster_api::auth::verify_password;

#[tokio::test]
async fn me_returns_caller_without_password() -> Result<()> {
    let app = TestApp::new().await?;
    let (status, body) = app.device(Method::GET, "/user/me", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], json!(app.device_id));
    assert_eq!(body["data"]["username"], json!("device"));
    assert!(body["data"].get("password").is_none());
    Ok(())
}

#[tokio::test]
async fn change_password_flow() -> Result<()> {
    let app = TestApp::new().await?;

    let (status, body) = app.device(Method::PUT, "/user/change-password", Some(json!({ "newPassword": "x" }))).await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["message"], json!("Please Provide userId, new Password and Old password"));

    let (status, body) = app
        .device(Method::PUT, "/user/change-password", Some(json!({ "oldPassword": "wrong", "newPassword": "next" })))
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], json!("FAILURE"));

    let (status, body) = app
        .device(Method::PUT, "/user/change-password", Some(json!({ "oldPassword": "device-password", "newPassword": "next" })))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], json!("Password changed successfully"));

    let stored = app.users.find_active(&app.device_id).await?.unwrap_or_default();
    assert!(verify_password("next", stored["password"].as_str().unwrap_or_default()));
    Ok(())
}

#[tokio::test]
async fn update_profile_strips_and_detects_duplicates() -> Result<()> {
    let app = TestApp::new().await?;

    let (status, body) = app
        .admin(Method::PUT, "/user/update-profile", Some(json!({ "name": "Root", "mobileNo": "", "password": "plain" })))
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], json!("Root"));
    assert!(body["data"].get("password").is_none());

    let (status, _) = app.admin(Method::PUT, "/user/update-profile", Some(json!({ "userType": "one" }))).await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    seed_user(&app.users, "carol", "user").await?;
    let (status, body) = app
        .admin(Method::PUT, "/user/update-profile", Some(json!({ "email": "carol@example.com" })))
        .await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["status"], json!("DUPLICATE_KEY"));
    Ok(())
}

#![allow(dead_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use eventmaster_api::app::{app, AppState};
use eventmaster_api::auth::{generate_jwt, Claims};
use eventmaster_api::database::{DocumentStore, MemoryStore};
use eventmaster_api::services::{NewUser, UserService};
use eventmaster_api::types::Platform;

pub const ADMIN: &str = "/admin";
pub const DEVICE: &str = "/device/api/v1";

/// The full router over a fresh in-memory store, with one admin and one
/// device user already seeded
pub struct TestApp {
    pub router: Router,
    pub store: Arc<dyn DocumentStore>,
    pub users: UserService,
    pub admin_id: String,
    pub admin_token: String,
    pub device_id: String,
    pub device_token: String,
}

impl TestApp {
    pub async fn new() -> Result<Self> {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let users = UserService::new(store.clone());

        let admin_id = seed_user(&users, "admin", "admin").await?;
        let device_id = seed_user(&users, "device", "user").await?;
        let admin_token = token(&admin_id, Platform::Admin, "admin")?;
        let device_token = token(&device_id, Platform::Device, "user")?;

        Ok(Self {
            router: app(AppState::new(store.clone())),
            store,
            users,
            admin_id,
            admin_token,
            device_id,
            device_token,
        })
    }

    pub async fn request(&self, method: Method, path: &str, token: Option<&str>, body: Option<Value>) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(serde_json::to_vec(&value)?)
            }
            None => Body::empty(),
        };
        self.send(builder.body(body)?).await
    }

    pub async fn send(&self, request: Request<Body>) -> Result<(StatusCode, Value)> {
        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).with_context(|| format!("non-JSON body: {:?}", bytes))?
        };
        Ok((status, body))
    }

    /// Request on the admin tier as the seeded admin
    pub async fn admin(&self, method: Method, path: &str, body: Option<Value>) -> Result<(StatusCode, Value)> {
        self.request(method, &format!("{}{}", ADMIN, path), Some(&self.admin_token), body).await
    }

    /// Request on the device tier as the seeded device user
    pub async fn device(&self, method: Method, path: &str, body: Option<Value>) -> Result<(StatusCode, Value)> {
        self.request(method, &format!("{}{}", DEVICE, path), Some(&self.device_token), body).await
    }

    /// Create a record on the admin tier and return its id
    pub async fn create(&self, resource: &str, body: Value) -> Result<String> {
        let (status, payload) = self.admin(Method::POST, &format!("/{}/create", resource), Some(body)).await?;
        anyhow::ensure!(status == StatusCode::OK, "create failed: {} {}", status, payload);
        payload["data"]["id"].as_str().map(str::to_string).context("created record has no id")
    }
}

pub async fn seed_user(users: &UserService, username: &str, role: &str) -> Result<String> {
    let created = users
        .create_user(NewUser {
            username: username.to_string(),
            email: format!("{}@example.com", username),
            password: format!("{}-password", username),
            role: role.to_string(),
            name: Some(format!("{} user", username)),
        })
        .await?;
    created["id"].as_str().map(str::to_string).context("seeded user has no id")
}

pub fn token(user_id: &str, platform: Platform, role: &str) -> Result<String> {
    Ok(generate_jwt(&Claims::new(user_id, platform, role))?)
}

pub fn assert_envelope(body: &Value, status: &str) {
    assert_eq!(body["status"], json!(status), "unexpected envelope: {}", body);
    assert!(body.get("message").and_then(Value::as_str).is_some(), "missing message: {}", body);
    assert!(body.get("data").is_some(), "missing data: {}", body);
}

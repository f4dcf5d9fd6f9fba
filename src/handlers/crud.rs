use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{delete, get, post, put},
    Extension, Router,
};
use serde_json::Value;

use super::Payload;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::CrudService;

type Service = State<Arc<CrudService>>;

/// The twelve resource routes, relative to `/<tier>/<resource>`
pub fn routes(service: Arc<CrudService>) -> Router {
    Router::new()
        .route("/create", post(create))
        .route("/addBulk", post(add_bulk))
        .route("/list", post(list))
        .route("/count", post(count))
        .route("/update/:id", put(update))
        .route("/partial-update", put(partial_update))
        .route("/partial-update/:id", put(partial_update))
        .route("/updateBulk", put(update_bulk))
        .route("/softDelete/:id", put(soft_delete))
        .route("/softDeleteMany", put(soft_delete_many))
        .route("/delete/:id", delete(delete_one))
        .route("/deleteMany", post(delete_many))
        .route("/:id", get(get_by_id))
        .with_state(service)
}

/// POST /create
pub async fn create(State(service): Service, Extension(user): Extension<AuthUser>, Payload(body): Payload) -> ApiResult<Value> {
    Ok(ApiResponse::success(service.create(&user.user_id, &body).await?))
}

/// POST /addBulk
pub async fn add_bulk(State(service): Service, Extension(user): Extension<AuthUser>, Payload(body): Payload) -> ApiResult<Value> {
    Ok(ApiResponse::success(service.bulk_create(&user.user_id, &body).await?))
}

/// POST /list
pub async fn list(State(service): Service, Payload(body): Payload) -> ApiResult<Value> {
    Ok(ApiResponse::success(service.list(&body).await?))
}

/// POST /count
pub async fn count(State(service): Service, Payload(body): Payload) -> ApiResult<Value> {
    Ok(ApiResponse::success(service.count(&body).await?))
}

/// GET /:id
pub async fn get_by_id(State(service): Service, Path(id): Path<String>) -> ApiResult<Value> {
    Ok(ApiResponse::success(service.get_by_id(&id).await?))
}

/// PUT /update/:id
pub async fn update(
    State(service): Service,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Payload(body): Payload,
) -> ApiResult<Value> {
    Ok(ApiResponse::success(service.update(&user.user_id, &id, &body).await?))
}

/// PUT /partial-update[/:id]
pub async fn partial_update(
    State(service): Service,
    Extension(user): Extension<AuthUser>,
    id: Option<Path<String>>,
    Payload(body): Payload,
) -> ApiResult<Value> {
    let id = id.map(|Path(id)| id).unwrap_or_default();
    Ok(ApiResponse::success(service.partial_update(&user.user_id, &id, &body).await?))
}

/// PUT /updateBulk
pub async fn update_bulk(State(service): Service, Extension(user): Extension<AuthUser>, Payload(body): Payload) -> ApiResult<Value> {
    Ok(ApiResponse::success(service.bulk_update(&user.user_id, &body).await?))
}

/// PUT /softDelete/:id
pub async fn soft_delete(
    State(service): Service,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> ApiResult<Value> {
    Ok(ApiResponse::success(service.soft_delete(&user.user_id, &id).await?))
}

/// PUT /softDeleteMany
pub async fn soft_delete_many(
    State(service): Service,
    Extension(user): Extension<AuthUser>,
    Payload(body): Payload,
) -> ApiResult<Value> {
    Ok(ApiResponse::success(service.soft_delete_many(&user.user_id, &body).await?))
}

/// DELETE /delete/:id
pub async fn delete_one(State(service): Service, Path(id): Path<String>, Payload(body): Payload) -> ApiResult<Value> {
    Ok(ApiResponse::success(service.delete(&id, &body).await?))
}

/// POST /deleteMany
pub async fn delete_many(State(service): Service, Payload(body): Payload) -> ApiResult<Value> {
    Ok(ApiResponse::success(service.delete_many(&body).await?))
}

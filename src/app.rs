use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::get,
    Router,
};
use serde_json::{json, Value};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::config;
use crate::database::DocumentStore;
use crate::error::ApiError;
use crate::handlers;
use crate::middleware::{jwt_auth_middleware, permission_middleware, validate_user_middleware, ApiResponse, ApiResult};
use crate::services::{CrudService, ResourceDef, UserService};
use crate::types::Platform;

/// Services shared by every request
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub event: Arc<CrudService>,
    pub master: Arc<CrudService>,
    pub users: Arc<UserService>,
}

impl AppState {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        let depth = config().deletion.max_cascade_depth;
        Self {
            event: Arc::new(CrudService::new(ResourceDef::event(), store.clone(), depth)),
            master: Arc::new(CrudService::new(ResourceDef::master(), store.clone(), depth)),
            users: Arc::new(UserService::new(store.clone())),
            store,
        }
    }
}

pub fn app(state: AppState) -> Router {
    let config = config();

    let mut router = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .with_state(state.clone())
        .nest(Platform::Admin.route_prefix(), tier_routes(&state, Platform::Admin))
        .nest(Platform::Device.route_prefix(), tier_routes(&state, Platform::Device))
        .layer(DefaultBodyLimit::max(config.api.max_request_size_bytes));

    if config.security.enable_cors {
        router = router.layer(cors_layer(&config.security.cors_origins));
    }
    if config.api.enable_request_logging {
        router = router.layer(TraceLayer::new_for_http());
    }
    router
}

/// Resource and user routes behind token, user and role checks.
/// Layers run bottom-up: token first, permission last.
fn tier_routes(state: &AppState, platform: Platform) -> Router {
    Router::new()
        .nest("/event", handlers::crud::routes(state.event.clone()))
        .nest("/master", handlers::crud::routes(state.master.clone()))
        .nest("/user", handlers::user::routes(state.users.clone()))
        .layer(from_fn_with_state(platform, permission_middleware))
        .layer(from_fn_with_state(state.users.clone(), validate_user_middleware))
        .layer(from_fn_with_state(platform, jwt_auth_middleware))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);
    if origins.iter().any(|o| o == "*") {
        return base.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    base.allow_origin(AllowOrigin::list(origins))
}

async fn root() -> ApiResult<Value> {
    Ok(ApiResponse::success(json!({
        "name": "eventmaster-api",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Event and Master CRUD API",
        "endpoints": {
            "admin": "/admin/{event,master,user}/* (admin platform token)",
            "device": "/device/api/v1/{event,master,user}/* (device platform token)",
            "health": "/health (public)",
        }
    })))
}

async fn health(State(state): State<AppState>) -> ApiResult<Value> {
    let now = chrono::Utc::now();
    match state.store.ping().await {
        Ok(()) => Ok(ApiResponse::success(json!({
            "status": "ok",
            "timestamp": now,
            "database": state.store.backend_name(),
        }))),
        Err(e) => {
            tracing::error!("Health check failed: {}", e);
            Err(ApiError::service_unavailable("Service unavailable."))
        }
    }
}

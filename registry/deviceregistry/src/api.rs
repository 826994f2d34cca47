//! REST API for the device registry.
//!
//! - GET    /health
//! - GET    /api/v1/devices
//! - POST   /api/v1/devices
//! - GET    /api/v1/devices/:deviceId
//! - PUT    /api/v1/devices/:deviceId
//! - DELETE /api/v1/devices/:deviceId
//! - GET    /api/v1/device-types

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::models::{DeviceFilter, DeviceUpdate, NewDevice};
use crate::service::DeviceService;
use crate::store::StoreError;

pub struct ApiState {
    pub service: Arc<DeviceService>,
    /// Registering identity stamped on direct API registrations.
    pub registered_by: Uuid,
    /// Whether the eventing subsystem came up; the service runs degraded
    /// without it.
    pub events_connected: bool,
}

#[derive(serde::Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(serde::Serialize)]
struct HealthResponse {
    status: String,
    database: String,
    events: String,
}

#[derive(serde::Serialize)]
struct MessageResponse {
    message: String,
}

#[derive(Deserialize)]
struct TypeFilter {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    is_active: Option<bool>,
}

fn store_error(e: StoreError) -> axum::response::Response {
    let (status, message) = match &e {
        StoreError::NotFound(what) => (StatusCode::NOT_FOUND, format!("not found: {what}")),
        StoreError::AlreadyExists(what) => {
            (StatusCode::CONFLICT, format!("already exists: {what}"))
        }
        StoreError::Postgres(_) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    (status, Json(ErrorResponse { error: message })).into_response()
}

async fn health(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        database: "connected".to_string(),
        events: if state.events_connected {
            "connected".to_string()
        } else {
            "disconnected".to_string()
        },
    })
}

async fn list_devices(
    State(state): State<Arc<ApiState>>,
    Query(filter): Query<DeviceFilter>,
) -> impl IntoResponse {
    match state.service.list_devices(&filter).await {
        Ok(devices) => (StatusCode::OK, Json(devices)).into_response(),
        Err(e) => store_error(e),
    }
}

async fn create_device(
    State(state): State<Arc<ApiState>>,
    Json(new): Json<NewDevice>,
) -> impl IntoResponse {
    match state.service.register_device(new, state.registered_by).await {
        Ok(device) => (StatusCode::CREATED, Json(device)).into_response(),
        Err(e) => store_error(e),
    }
}

async fn get_device(
    State(state): State<Arc<ApiState>>,
    Path(device_id): Path<Uuid>,
) -> impl IntoResponse {
    match state.service.get_device(device_id).await {
        Ok(Some(device)) => (StatusCode::OK, Json(device)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "Device not found".to_string(),
            }),
        )
            .into_response(),
        Err(e) => store_error(e),
    }
}

async fn update_device(
    State(state): State<Arc<ApiState>>,
    Path(device_id): Path<Uuid>,
    Json(changes): Json<DeviceUpdate>,
) -> impl IntoResponse {
    match state.service.update_device(device_id, changes).await {
        Ok(device) => (StatusCode::OK, Json(device)).into_response(),
        Err(e) => store_error(e),
    }
}

async fn delete_device(
    State(state): State<Arc<ApiState>>,
    Path(device_id): Path<Uuid>,
) -> impl IntoResponse {
    match state.service.delete_device(device_id).await {
        Ok(()) => (
            StatusCode::OK,
            Json(MessageResponse {
                message: "Device deleted successfully".to_string(),
            }),
        )
            .into_response(),
        Err(e) => store_error(e),
    }
}

async fn list_device_types(
    State(state): State<Arc<ApiState>>,
    Query(filter): Query<TypeFilter>,
) -> impl IntoResponse {
    match state
        .service
        .list_types(filter.category.as_deref(), filter.is_active)
        .await
    {
        Ok(types) => (StatusCode::OK, Json(types)).into_response(),
        Err(e) => store_error(e),
    }
}

pub fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/devices", get(list_devices).post(create_device))
        .route(
            "/api/v1/devices/:deviceId",
            get(get_device).put(update_device).delete(delete_device),
        )
        .route("/api/v1/device-types", get(list_device_types))
        .with_state(state)
}

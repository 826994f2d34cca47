//! REST API for the legacy sensor store.
//!
//! - GET    /health
//! - GET    /api/v1/sensors
//! - POST   /api/v1/sensors
//! - GET    /api/v1/sensors/:id
//! - PUT    /api/v1/sensors/:id
//! - DELETE /api/v1/sensors/:id
//! - PATCH  /api/v1/sensors/:id/value
//! - GET    /api/v1/sensors/temperature/:location
//!
//! Every successful mutation publishes the matching sensor lifecycle
//! event. Publishing is best-effort on this path: the store mutation has
//! already committed, so a publish failure is logged as a warning and the
//! request still succeeds.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch},
    Json, Router,
};
use serde::Deserialize;
use tracing::{debug, warn};

use eventbus::{EventBusError, SensorEventPublisher};

use crate::models::{Sensor, SensorCreate, SensorType, SensorUpdate};
use crate::store::{SensorDb, StoreError};
use crate::temperature::TemperatureClient;

pub struct ApiState {
    pub db: SensorDb,
    pub temperature: TemperatureClient,
    pub publisher: Option<SensorEventPublisher>,
    pub events_connected: bool,
}

impl ApiState {
    fn report_publish(&self, action: &str, sensor_id: i32, result: Option<Result<(), EventBusError>>) {
        match result {
            Some(Ok(())) => {}
            Some(Err(e)) => warn!("failed to publish {action} event for sensor {sensor_id}: {e}"),
            None => debug!("publisher not available, skipping {action} event for sensor {sensor_id}"),
        }
    }
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
struct ValueUpdate {
    value: f64,
    status: String,
}

fn store_error(e: StoreError) -> axum::response::Response {
    let status = match &e {
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::Postgres(_) | StoreError::NoRowReturned => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorResponse { error: e.to_string() })).into_response()
}

/// Overlays a live reading from the temperature API onto a temperature
/// sensor; stored values stand when the lookup fails.
async fn enrich_temperature(state: &ApiState, sensor: &mut Sensor) {
    if sensor.sensor_type != SensorType::Temperature {
        return;
    }
    match state.temperature.by_sensor_id(sensor.id).await {
        Ok(data) => {
            sensor.value = data.value;
            sensor.status = data.status;
            sensor.last_updated = data.timestamp;
        }
        Err(e) => {
            debug!("temperature lookup failed for sensor {}: {e}", sensor.id);
        }
    }
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

async fn list_sensors(State(state): State<Arc<ApiState>>) -> impl IntoResponse {
    match state.db.list().await {
        Ok(mut sensors) => {
            for sensor in &mut sensors {
                enrich_temperature(&state, sensor).await;
            }
            (StatusCode::OK, Json(sensors)).into_response()
        }
        Err(e) => store_error(e),
    }
}

async fn get_sensor(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<i32>,
) -> impl IntoResponse {
    match state.db.get(id).await {
        Ok(mut sensor) => {
            enrich_temperature(&state, &mut sensor).await;
            (StatusCode::OK, Json(sensor)).into_response()
        }
        Err(e) => store_error(e),
    }
}

async fn get_temperature_by_location(
    State(state): State<Arc<ApiState>>,
    Path(location): Path<String>,
) -> impl IntoResponse {
    match state.temperature.by_location(&location).await {
        Ok(data) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "location": data.location,
                "value": data.value,
                "unit": data.unit,
                "status": data.status,
                "timestamp": data.timestamp,
                "description": data.description,
            })),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("failed to fetch temperature data: {e}"),
            }),
        )
            .into_response(),
    }
}

async fn create_sensor(
    State(state): State<Arc<ApiState>>,
    Json(new): Json<SensorCreate>,
) -> impl IntoResponse {
    match state.db.create(new).await {
        Ok(sensor) => {
            let published = match &state.publisher {
                Some(p) => Some(
                    p.created(sensor.id, &sensor.name, sensor.sensor_type.as_str(), &sensor.location)
                        .await,
                ),
                None => None,
            };
            state.report_publish("created", sensor.id, published);

            (StatusCode::CREATED, Json(sensor)).into_response()
        }
        Err(e) => store_error(e),
    }
}

async fn update_sensor(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<i32>,
    Json(changes): Json<SensorUpdate>,
) -> impl IntoResponse {
    match state.db.update(id, changes).await {
        Ok(sensor) => {
            let published = match &state.publisher {
                Some(p) => Some(
                    p.updated(sensor.id, &sensor.name, sensor.sensor_type.as_str(), &sensor.location)
                        .await,
                ),
                None => None,
            };
            state.report_publish("updated", sensor.id, published);

            (StatusCode::OK, Json(sensor)).into_response()
        }
        Err(e) => store_error(e),
    }
}

async fn delete_sensor(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<i32>,
) -> impl IntoResponse {
    // Capture identity before deletion for the event payload.
    let sensor = match state.db.get(id).await {
        Ok(sensor) => sensor,
        Err(e) => return store_error(e),
    };

    match state.db.delete(id).await {
        Ok(()) => {
            let published = match &state.publisher {
                Some(p) => Some(
                    p.deleted(sensor.id, &sensor.name, sensor.sensor_type.as_str(), &sensor.location)
                        .await,
                ),
                None => None,
            };
            state.report_publish("deleted", sensor.id, published);

            (
                StatusCode::OK,
                Json(MessageResponse {
                    message: "Sensor deleted successfully".to_string(),
                }),
            )
                .into_response()
        }
        Err(e) => store_error(e),
    }
}

async fn update_sensor_value(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<i32>,
    Json(req): Json<ValueUpdate>,
) -> impl IntoResponse {
    let sensor = match state.db.get(id).await {
        Ok(sensor) => sensor,
        Err(e) => return store_error(e),
    };

    match state.db.update_value(id, req.value, &req.status).await {
        Ok(()) => {
            let published = match &state.publisher {
                Some(p) => Some(
                    p.value_changed(
                        sensor.id,
                        &sensor.name,
                        sensor.sensor_type.as_str(),
                        &sensor.location,
                        req.value,
                        &req.status,
                    )
                    .await,
                ),
                None => None,
            };
            state.report_publish("value_changed", sensor.id, published);

            (
                StatusCode::OK,
                Json(MessageResponse {
                    message: "Sensor value updated successfully".to_string(),
                }),
            )
                .into_response()
        }
        Err(e) => store_error(e),
    }
}

pub fn create_router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/sensors", get(list_sensors).post(create_sensor))
        .route(
            "/api/v1/sensors/:id",
            get(get_sensor).put(update_sensor).delete(delete_sensor),
        )
        .route("/api/v1/sensors/:id/value", patch(update_sensor_value))
        .route(
            "/api/v1/sensors/temperature/:location",
            get(get_temperature_by_location),
        )
        .with_state(state)
}

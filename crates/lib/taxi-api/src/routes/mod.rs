use std::future::Future;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::routing::{get, post};
use serde_json::{Value, json};
use taxi_core::control::ControlError;
use taxi_core::store::TripStore;

use crate::{AppState, ApiError};

mod imports;
mod statistics;
mod trips;

pub(crate) fn routes<S: TripStore>() -> Router<AppState<S>> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route(
            "/api/v1/trips",
            get(trips::list_trips::<S>).post(trips::create_trip::<S>),
        )
        .route(
            "/api/v1/trips/:id",
            get(trips::get_trip::<S>)
                .put(trips::update_trip::<S>)
                .delete(trips::delete_trip::<S>),
        )
        .route("/api/v1/statistics", get(statistics::statistics::<S>))
        .route("/api/v1/imports", get(imports::list_imports::<S>))
        .route("/api/v1/imports/run", post(imports::run_import::<S>))
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "NYC Taxi Data Pipeline API" }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Awaits a control-plane call under `limit`.
async fn within<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, ControlError>>,
) -> Result<T, ApiError> {
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| ApiError::timeout())?
        .map_err(ApiError::from)
}

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;
use taxi_core::store::TripStore;
use taxi_store::models::{TripFields, TripPage, TripUpdate, YellowTaxiTrip};

use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::{AppState, ApiError};

use super::within;

#[derive(Debug, Deserialize)]
pub(crate) struct TripPageQuery {
    #[serde(default)]
    skip: u32,
    #[serde(default = "default_limit")]
    limit: u32,
}

const fn default_limit() -> u32 {
    100
}

pub(crate) async fn list_trips<S: TripStore>(
    State(state): State<AppState<S>>,
    ApiQuery(query): ApiQuery<TripPageQuery>,
) -> Result<Json<TripPage>, ApiError> {
    let page = within(
        state.request_timeout,
        state.control.list_trips(query.skip, query.limit),
    )
    .await?;
    Ok(Json(page))
}

pub(crate) async fn get_trip<S: TripStore>(
    State(state): State<AppState<S>>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<YellowTaxiTrip>, ApiError> {
    within(state.request_timeout, state.control.get_trip(id))
        .await?
        .map(Json)
        .ok_or_else(ApiError::trip_not_found)
}

pub(crate) async fn create_trip<S: TripStore>(
    State(state): State<AppState<S>>,
    ApiJson(fields): ApiJson<TripFields>,
) -> Result<(StatusCode, Json<YellowTaxiTrip>), ApiError> {
    let trip = within(state.request_timeout, state.control.create_trip(fields)).await?;
    Ok((StatusCode::CREATED, Json(trip)))
}

pub(crate) async fn update_trip<S: TripStore>(
    State(state): State<AppState<S>>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(update): ApiJson<TripUpdate>,
) -> Result<Json<YellowTaxiTrip>, ApiError> {
    within(state.request_timeout, state.control.update_trip(id, update))
        .await?
        .map(Json)
        .ok_or_else(ApiError::trip_not_found)
}

pub(crate) async fn delete_trip<S: TripStore>(
    State(state): State<AppState<S>>,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, ApiError> {
    if within(state.request_timeout, state.control.delete_trip(id)).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::trip_not_found())
    }
}

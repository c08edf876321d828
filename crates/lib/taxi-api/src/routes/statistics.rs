use axum::Json;
use axum::extract::State;
use taxi_core::store::TripStore;
use taxi_store::models::TripStatistics;

use crate::{AppState, ApiError};

use super::within;

pub(crate) async fn statistics<S: TripStore>(
    State(state): State<AppState<S>>,
) -> Result<Json<TripStatistics>, ApiError> {
    let stats = within(state.request_timeout, state.control.statistics()).await?;
    Ok(Json(stats))
}

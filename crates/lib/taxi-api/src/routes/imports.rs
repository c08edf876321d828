use std::path::PathBuf;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::extract::rejection::BytesRejection;
use serde::Deserialize;
use taxi_core::control::{ImportOptions, ImportRunReport};
use taxi_core::store::TripStore;
use taxi_store::models::{ImportLog, ImportMethod};

use crate::extract::ApiQuery;
use crate::{AppState, ApiError};

use super::within;

#[derive(Debug, Deserialize)]
pub(crate) struct ImportLogQuery {
    #[serde(default = "default_limit")]
    limit: u32,
    #[serde(default)]
    offset: u32,
}

const fn default_limit() -> u32 {
    200
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ImportRunRequest {
    data_dir: Option<PathBuf>,
    #[serde(default)]
    dry_run: bool,
    method: Option<ImportMethod>,
    max_files: Option<usize>,
    start_with: Option<String>,
    recursive: Option<bool>,
    batch_size: Option<usize>,
}

pub(crate) async fn list_imports<S: TripStore>(
    State(state): State<AppState<S>>,
    ApiQuery(query): ApiQuery<ImportLogQuery>,
) -> Result<Json<Vec<ImportLog>>, ApiError> {
    let imports = within(
        state.request_timeout,
        state.control.list_imports(query.limit, query.offset),
    )
    .await?;
    Ok(Json(imports))
}

// An empty body runs with every default.
pub(crate) async fn run_import<S: TripStore>(
    State(state): State<AppState<S>>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Json<ImportRunReport>, ApiError> {
    let body = body?;
    let request: ImportRunRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ImportRunRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|err| ApiError::bad_request(format!("invalid import request: {err}")))?
    };

    let batch_size = request.batch_size.unwrap_or(state.batch_size);
    if batch_size == 0 {
        return Err(ApiError::bad_request("batch_size must be greater than zero"));
    }

    let defaults = ImportOptions::default();
    let options = ImportOptions {
        batch_size,
        method: request.method.unwrap_or(defaults.method),
        dry_run: request.dry_run,
        recursive: request.recursive.unwrap_or(defaults.recursive),
        max_files: request.max_files,
        start_with: request.start_with,
    };
    let data_dir = request
        .data_dir
        .unwrap_or_else(|| state.data_dir.as_ref().clone());

    let report = within(
        state.import_timeout,
        state.control.import_directory(&data_dir, &options),
    )
    .await?;
    Ok(Json(report))
}

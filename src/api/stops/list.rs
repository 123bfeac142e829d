use axum::{extract::Query, extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::api::error::{bad_request, ErrorResponse};
use crate::providers::timetables::gtfs::StopInfo;

use super::StopsState;

const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 100;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct StopSearchParams {
    /// Name substring or exact stop code/id to search for (required)
    pub search: Option<String>,
    /// Maximum number of results (default 20, max 100)
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StopSearchResponse {
    /// Whether the static timetable is loaded; when false the stop list
    /// is necessarily empty
    pub timetable_available: bool,
    pub stops: Vec<StopInfo>,
}

/// Search stops by name or code.
#[utoipa::path(
    get,
    path = "/api/stops",
    params(StopSearchParams),
    responses(
        (status = 200, description = "Matching stops", body = StopSearchResponse),
        (status = 400, description = "Missing search term", body = ErrorResponse)
    ),
    tag = "stops"
)]
pub async fn search_stops(
    State(state): State<StopsState>,
    Query(params): Query<StopSearchParams>,
) -> Result<Json<StopSearchResponse>, (StatusCode, Json<ErrorResponse>)> {
    let search = params
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| bad_request("search query parameter is required"))?;

    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);

    let timetable_available = state.timetable.is_available().await;
    let stops = state.timetable.search_stops(search, limit).await;

    Ok(Json(StopSearchResponse {
        timetable_available,
        stops,
    }))
}

use axum::{extract::Query, extract::State, http::StatusCode, Json};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::api::error::{bad_request, not_found, ErrorResponse};
use crate::providers::timetables::gtfs::StopInfo;
use crate::reconcile::{ArrivalsError, ArrivalsQuery, MergedArrival};

use super::ArrivalsState;

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ArrivalsParams {
    /// Stop id to query (required)
    pub stop_id: Option<String>,
    /// Optional route designator filter (e.g. "61A")
    pub route: Option<String>,
    /// Service date as YYYY-MM-DD (default: today)
    pub date: Option<String>,
    /// Include live predictions (default: true)
    pub realtime: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ArrivalsResponse {
    pub stop_id: String,
    /// Stop metadata when the static timetable knows the stop
    pub stop: Option<StopInfo>,
    /// Service date the schedule was computed for (YYYY-MM-DD)
    pub date: String,
    pub arrivals: Vec<MergedArrival>,
    /// Which sources contributed: "schedule", "realtime",
    /// "schedule+realtime", or "none"
    pub sources: String,
    /// Operator-actionable description of a live-feed configuration
    /// problem. The response is still 200: schedule data (if any) is
    /// served regardless.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realtime_error: Option<String>,
    /// Human-readable summary of data availability
    pub message: String,
}

/// Merged upcoming arrivals for a stop.
///
/// Degraded states (timetable missing, live feed down or misconfigured)
/// still answer 200 with the `sources`, `realtime_error`, and `message`
/// fields explaining what was available.
#[utoipa::path(
    get,
    path = "/api/arrivals",
    params(ArrivalsParams),
    responses(
        (status = 200, description = "Merged arrivals for the stop", body = ArrivalsResponse),
        (status = 400, description = "Missing stop_id or malformed date", body = ErrorResponse),
        (status = 404, description = "Stop not found in the static timetable", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "arrivals"
)]
pub async fn get_arrivals(
    State(state): State<ArrivalsState>,
    Query(params): Query<ArrivalsParams>,
) -> Result<Json<ArrivalsResponse>, (StatusCode, Json<ErrorResponse>)> {
    let stop_id = params
        .stop_id
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| bad_request("stop_id query parameter is required"))?
        .to_string();

    let date = match params.date.as_deref().filter(|s| !s.is_empty()) {
        None => None,
        Some(s) => Some(
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map_err(|_| bad_request(format!("Invalid date '{}': expected YYYY-MM-DD", s)))?,
        ),
    };

    let query = ArrivalsQuery {
        stop_id: stop_id.clone(),
        route: params.route.filter(|r| !r.trim().is_empty()),
        date,
        realtime: params.realtime.unwrap_or(true),
    };

    let now = Utc::now().with_timezone(&state.service.timezone());

    match state.service.arrivals_for_stop(&query, now).await {
        Ok(result) => Ok(Json(ArrivalsResponse {
            stop_id,
            stop: result.stop,
            date: result.date.format("%Y-%m-%d").to_string(),
            arrivals: result.arrivals,
            sources: result.sources,
            realtime_error: result.realtime_error,
            message: result.message,
        })),
        Err(e @ ArrivalsError::StopNotFound(_)) => Err(not_found(e.to_string())),
    }
}

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

use crate::providers::realtime::PredictionClient;
use crate::providers::timetables::gtfs::TimetableProvider;

#[derive(Clone)]
pub struct HealthState {
    pub timetable: Arc<TimetableProvider>,
    pub predictions: Arc<PredictionClient>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Whether the service is running
    pub healthy: bool,
    /// Whether the static GTFS timetable has been loaded into memory
    pub timetable_loaded: bool,
    /// Number of stops in the loaded timetable
    pub stop_count: usize,
    /// Number of routes in the loaded timetable
    pub route_count: usize,
    /// Number of trips in the loaded timetable
    pub trip_count: usize,
    /// Whether an API key is configured for the live prediction feed
    pub realtime_configured: bool,
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service health status", body = HealthResponse)
    ),
    tag = "health"
)]
pub async fn health_check(State(state): State<HealthState>) -> Json<HealthResponse> {
    let timetable_loaded = state.timetable.is_available().await;
    let (stop_count, route_count, trip_count) = state.timetable.counts().await;

    Json(HealthResponse {
        healthy: true,
        timetable_loaded,
        stop_count,
        route_count,
        trip_count,
        realtime_configured: state.predictions.is_configured(),
    })
}

pub fn router(timetable: Arc<TimetableProvider>, predictions: Arc<PredictionClient>) -> Router {
    let state = HealthState {
        timetable,
        predictions,
    };
    Router::new()
        .route("/", get(health_check))
        .with_state(state)
}

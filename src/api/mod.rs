pub mod arrivals;
pub mod error;
pub mod health;
pub mod stops;

pub use error::{bad_request, internal_error, not_found, ErrorResponse};

use axum::Router;
use std::sync::Arc;

use crate::providers::realtime::PredictionClient;
use crate::providers::timetables::gtfs::TimetableProvider;
use crate::reconcile::ArrivalsService;

pub fn router(
    service: Arc<ArrivalsService>,
    timetable: Arc<TimetableProvider>,
    predictions: Arc<PredictionClient>,
) -> Router {
    Router::new()
        .nest("/arrivals", arrivals::router(service))
        .nest("/stops", stops::router(timetable.clone()))
        .nest("/health", health::router(timetable, predictions))
}

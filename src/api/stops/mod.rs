mod list;

pub use list::*;

use axum::{routing::get, Router};
use std::sync::Arc;

use crate::providers::timetables::gtfs::TimetableProvider;

#[derive(Clone)]
pub struct StopsState {
    pub timetable: Arc<TimetableProvider>,
}

pub fn router(timetable: Arc<TimetableProvider>) -> Router {
    let state = StopsState { timetable };
    Router::new()
        .route("/", get(search_stops))
        .with_state(state)
}

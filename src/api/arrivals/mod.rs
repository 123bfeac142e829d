mod list;

pub use list::*;

use axum::{routing::get, Router};
use std::sync::Arc;

use crate::reconcile::ArrivalsService;

#[derive(Clone)]
pub struct ArrivalsState {
    pub service: Arc<ArrivalsService>,
}

pub fn router(service: Arc<ArrivalsService>) -> Router {
    let state = ArrivalsState { service };
    Router::new()
        .route("/", get(get_arrivals))
        .with_state(state)
}

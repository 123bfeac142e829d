pub mod api;
mod config;
mod providers;
mod reconcile;

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use config::Config;
use providers::realtime::PredictionClient;
use providers::timetables::gtfs::TimetableProvider;
use reconcile::ArrivalsService;

#[derive(OpenApi)]
#[openapi(
    info(title = "Bus Arrivals API", version = "0.1.0"),
    paths(
        api::arrivals::get_arrivals,
        api::stops::search_stops,
        api::health::health_check,
    ),
    components(schemas(
        api::ErrorResponse,
        api::arrivals::ArrivalsResponse,
        api::stops::StopSearchResponse,
        api::health::HealthResponse,
        providers::timetables::gtfs::StopInfo,
        reconcile::MergedArrival,
        reconcile::Source,
    )),
    tags(
        (name = "arrivals", description = "Merged schedule and real-time arrivals"),
        (name = "stops", description = "Stop search"),
        (name = "health", description = "Service health check")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .init();

    // Load config
    let config = Config::load("config.yaml").expect("Failed to load config");

    // Build CORS layer based on config
    let cors_layer = if config.cors_permissive {
        tracing::warn!("CORS: Permissive mode explicitly enabled (all origins allowed) - DO NOT USE IN PRODUCTION");
        CorsLayer::permissive()
    } else if !config.cors_origins.is_empty() {
        tracing::info!(origins = ?config.cors_origins, "CORS: Restricting to configured origins");
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([axum::http::Method::GET, axum::http::Method::OPTIONS])
            .allow_headers([axum::http::header::CONTENT_TYPE])
    } else {
        panic!("CORS configuration error: Either set 'cors_origins' with allowed origins, or set 'cors_permissive: true' for development");
    };

    // Construct providers
    let timetable = Arc::new(TimetableProvider::new(config.timetable.clone()));
    let predictions = Arc::new(
        PredictionClient::new(&config.realtime).expect("Failed to build prediction client"),
    );
    if !predictions.is_configured() {
        tracing::warn!(
            "No API key for the live prediction feed (realtime.api_key / BUSTIME_API_KEY); \
             arrivals will be schedule-only"
        );
    }

    // Load the static timetable before serving. A missing zip leaves the
    // provider unavailable; a corrupt one is also non-fatal.
    if let Err(e) = timetable.load().await {
        tracing::error!(error = %e, "Failed to load GTFS timetable; continuing without it");
    }

    let service = Arc::new(ArrivalsService::new(timetable.clone(), predictions.clone()));

    // Build the app
    let app = Router::new()
        .route("/", get(root))
        .nest("/api", api::router(service, timetable, predictions))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer);

    // Start server
    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000")
        .await
        .expect("Failed to bind to port 3000");

    tracing::info!("Server running on http://localhost:3000");
    tracing::info!("Swagger UI: http://localhost:3000/swagger-ui");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}

async fn root() -> &'static str {
    "Bus Arrivals API"
}

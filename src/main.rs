mod api;
mod broadcast;
mod catalog;
mod config;
mod geo;
mod tracking;

use std::sync::Arc;

use chrono::Utc;
use sqlx::SqlitePool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use broadcast::{Broadcaster, SubscriberRegistry};
use catalog::CatalogReader;
use config::Config;
use tracking::state::BusStateStore;
use tracking::TrackingPipeline;

#[derive(OpenApi)]
#[openapi(
    info(title = "Live Bus Tracking API", version = "0.1.0"),
    paths(
        api::stations::station_departures,
        api::health::health_check,
    ),
    components(schemas(
        api::ErrorResponse,
        api::stations::StationDeparturesResponse,
        api::stations::DepartureHintDto,
        api::health::HealthResponse,
    )),
    tags(
        (name = "stations", description = "Station-directed real-time queries"),
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
                .unwrap_or_else(|_| "info,tower_http=info,sqlx=warn".into()),
        )
        .init();

    // Load config
    let config = Config::load("config.yaml").expect("Failed to load config");
    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(config.port);

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
            .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
            .allow_headers([axum::http::header::CONTENT_TYPE])
    } else {
        panic!("CORS configuration error: Either set 'cors_origins' with allowed origins, or set 'cors_permissive: true' for development");
    };

    // Initialize SQLite catalog database
    let db_path = std::path::Path::new(&config.database_path);
    if let Some(parent) = db_path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            tracing::warn!("Could not create database directory: {}", e);
        }
    }
    let db_url = format!("sqlite:{}?mode=rwc", config.database_path);
    let pool = SqlitePool::connect(&db_url)
        .await
        .expect("Failed to connect to SQLite database");

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");
    tracing::info!("Database migrations completed");

    // Wire the telemetry pipeline
    let catalog = Arc::new(CatalogReader::new(pool, &config.catalog));
    let store = Arc::new(BusStateStore::new());
    let registry = Arc::new(SubscriberRegistry::new(config.broadcast.queue_capacity));
    let broadcaster = Arc::new(Broadcaster::new(registry.clone(), catalog.clone()));
    let pipeline = Arc::new(TrackingPipeline::new(
        store.clone(),
        catalog.clone(),
        broadcaster,
        config.tracking.clone(),
    ));

    // Evict buses that stopped reporting
    if config.tracking.idle_eviction_secs > 0 {
        let idle_secs = config.tracking.idle_eviction_secs;
        let sweep_store = store.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
            interval.tick().await;
            loop {
                interval.tick().await;
                let cutoff = Utc::now() - chrono::Duration::seconds(idle_secs as i64);
                let evicted = sweep_store.evict_idle(cutoff).await;
                if evicted > 0 {
                    tracing::debug!(evicted, "evicted idle bus states");
                }
            }
        });
    }

    // Build the app
    let app = axum::Router::new()
        .route("/", axum::routing::get(root))
        .nest("/api", api::router(pipeline, store, registry, catalog))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer);

    // Start server
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .unwrap_or_else(|e| panic!("Failed to bind to port {port}: {e}"));

    tracing::info!("Server running on http://localhost:{port}");
    tracing::info!("Swagger UI: http://localhost:{port}/swagger-ui");

    axum::serve(listener, app)
        .await
        .expect("Failed to start server");
}

async fn root() -> &'static str {
    "Live Bus Tracking API"
}

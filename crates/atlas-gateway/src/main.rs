//! The HTTP ingress process (§6). Binds the routes named in §6's
//! "Ingress HTTP" contract and wires them to `atlas-lifecycle` via
//! `AppState`. Out of scope per §1 as an owned subsystem, but this
//! crate ships a reference implementation so the workspace is
//! runnable end to end, the way `atlas-worker` ships a reference
//! worker process.

use std::sync::Arc;
use std::time::Instant;

use axum::http::Method;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use atlas_broadcast::memory::InMemoryBroadcastGateway;
use atlas_broadcast::BroadcastGateway;
use atlas_job_store::JobStore;
use atlas_lifecycle::JobLifecycleManager;
use atlas_model_router::{HttpInferenceBackend, InferenceBackend};
use atlas_queue::QueueGateway;

use atlas_gateway::config::GatewayConfig;
use atlas_gateway::{auth, handlers, AppState};

#[cfg(not(feature = "postgres"))]
fn build_store() -> Arc<dyn JobStore> {
    Arc::new(atlas_job_store::memory::InMemoryJobStore::new())
}

#[cfg(not(feature = "postgres"))]
fn build_queue() -> Arc<dyn QueueGateway> {
    Arc::new(atlas_queue::memory::InMemoryQueueGateway::new())
}

#[cfg(feature = "postgres")]
async fn build_store(database_url: &str) -> Arc<dyn JobStore> {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .connect(database_url)
        .await
        .expect("failed to connect to DATABASE_URL");
    Arc::new(atlas_job_store::postgres::PostgresJobStore::new(pool))
}

#[cfg(feature = "postgres")]
async fn build_queue(database_url: &str) -> Arc<dyn QueueGateway> {
    let pool = sqlx::postgres::PgPoolOptions::new()
        .connect(database_url)
        .await
        .expect("failed to connect to DATABASE_URL");
    Arc::new(atlas_queue::postgres::PostgresQueueGateway::new(pool))
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "atlas_gateway=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = GatewayConfig::parse();

    #[cfg(not(feature = "postgres"))]
    let (store, queue): (Arc<dyn JobStore>, Arc<dyn QueueGateway>) = (build_store(), build_queue());
    #[cfg(feature = "postgres")]
    let (store, queue): (Arc<dyn JobStore>, Arc<dyn QueueGateway>) = (
        build_store(&config.database_url).await,
        build_queue(&config.database_url).await,
    );

    let broadcast: Arc<dyn BroadcastGateway> = Arc::new(InMemoryBroadcastGateway::new());
    let lifecycle = Arc::new(JobLifecycleManager::new(
        store.clone(),
        queue.clone(),
        broadcast.clone(),
    ));
    let backend: Arc<dyn InferenceBackend> = Arc::new(HttpInferenceBackend::from_env(
        config.model_base_url.clone(),
        config.model_api_key.clone(),
    ));

    let state = AppState {
        lifecycle,
        store,
        backend,
        api_key: config.api_key.clone(),
        process_start: Instant::now(),
    };

    // §6 CORS: permissive, pre-flight 200 on OPTIONS — tower-http's
    // `Any` origin/method/header layer gives us exactly that.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/extract", post(handlers::create_extract))
        .route("/api/extract/:job_id", get(handlers::get_job))
        .route("/api/scrape", post(handlers::create_scrape))
        .route("/api/scrape/:job_id", get(handlers::get_job))
        .route("/api/crawl", post(handlers::create_crawl))
        .route("/api/crawl/:job_id", get(handlers::get_job))
        .route("/health", get(handlers::health))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_bearer))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {e}", config.addr));
    info!(addr = %config.addr, "atlas-gateway listening");
    axum::serve(listener, app).await.expect("server error");
}

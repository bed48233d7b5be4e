//! HTTP API gateway for Charmline.
//!
//! Exposes the persona catalog, the chat turn, and stored conversations
//! over REST. Built on Axum.

pub mod api;

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    http::{Method, header},
    response::Json,
    routing::{get, post},
};
use charmline_config::AppConfig;
use charmline_core::store::ConversationStore;
use charmline_engine::ChatEngine;
use charmline_store::Storage;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Shared application state for the gateway.
pub struct GatewayState {
    pub engine: Arc<ChatEngine>,
}

pub type SharedState = Arc<GatewayState>;

/// The long-lived services behind both the gateway and the CLI.
pub struct Services {
    pub engine: Arc<ChatEngine>,
    pub storage: Arc<dyn Storage>,
}

/// Open the store, seed the catalog, and wire the engine.
pub async fn build_services(config: &AppConfig) -> Result<Services, charmline_core::Error> {
    let storage = charmline_store::open(&config.store).await?;

    if let Some(ref path) = config.personas_file {
        charmline_store::seed_catalog(storage.as_ref(), path).await?;
    }

    let router = Arc::new(charmline_providers::build_from_config(config));
    for backend in router.list() {
        if !config.has_api_key(backend) {
            warn!(backend = %backend, "No API key configured; requests to this backend will be rejected");
        }
    }

    let engine = Arc::new(ChatEngine::from_config(
        config,
        router,
        storage.clone(),
        storage.clone(),
    ));

    Ok(Services { engine, storage })
}

/// Build the Axum router with all gateway routes.
///
/// Layers applied:
/// - CORS (any origin, GET/POST, JSON bodies)
/// - Request body size limit (1 MB)
/// - HTTP trace logging
pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .route("/personas", get(api::list_personas))
        .route("/personas/{id}", get(api::get_persona))
        .route("/personas/{id}/chat", post(api::chat))
        .route("/conversations/{id}", get(api::get_conversation))
        .with_state(state)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let services = build_services(&config).await?;
    let state = Arc::new(GatewayState {
        engine: services.engine,
    });
    let app = build_router(state);

    info!(addr = %addr, store = services.storage.name(), "Gateway starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod routes;

use axum::http::HeaderValue;
use axum::routing::get;
use axum::{Json, Router};
use journal_analysis::Analyzer;
use journal_storage::Database;
use std::sync::Arc;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

pub use auth::CurrentUser;
pub use config::ServerConfig;
pub use error::{ApiError, ApiResult};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub analyzer: Arc<Analyzer>,
}

/// Full application router: `/health` plus every API route under `/api`
pub fn build_router(state: AppState, cors_origin: Option<&str>) -> Router {
    let api = Router::new()
        .merge(routes::journal::router())
        .merge(routes::priorities::router())
        .merge(routes::context::router())
        .merge(routes::ai::router());

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api)
        .layer(cors_layer(cors_origin))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    match origin.map(HeaderValue::from_str) {
        Some(Ok(origin)) => layer.allow_origin(origin),
        Some(Err(_)) => {
            warn!("Ignoring invalid CORS origin, allowing any");
            layer.allow_origin(Any)
        }
        None => layer.allow_origin(Any),
    }
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": "journal-insight",
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

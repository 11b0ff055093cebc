use axum::{http::Method, routing::get, Json, Router};
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};

use crate::decisions::DecisionStore;
use crate::ingest::RawPacket;
use crate::nodes::NodeRegistry;

pub mod error;
pub mod routes;

pub use error::AppError;

pub struct AppState {
    pub pool: PgPool,
    pub decision_store: Arc<DecisionStore>,
    pub ingest_tx: mpsc::UnboundedSender<RawPacket>,
    pub nodes: Arc<NodeRegistry>,
}

async fn health_check_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

pub fn create_axum_router(
    pool: PgPool,
    decision_store: Arc<DecisionStore>,
    ingest_tx: mpsc::UnboundedSender<RawPacket>,
    nodes: Arc<NodeRegistry>,
) -> Router {
    let app_state = Arc::new(AppState {
        pool,
        decision_store,
        ingest_tx,
        nodes,
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(vec![Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health_check_handler))
        .nest("/api/ingest", routes::ingest_routes::create_ingest_router())
        .nest(
            "/api/decisions",
            routes::decision_routes::create_decision_router(),
        )
        .nest("/api", routes::reading_routes::create_reading_router())
        .with_state(app_state)
        .layer(cors)
}

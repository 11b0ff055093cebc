use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use std::sync::Arc;
use tracing::debug;

use crate::ingest::RawPacket;
use crate::web::{AppError, AppState};

/// Accepts a raw packet and enqueues it for the pipeline. The handler never
/// touches storage or the decision engine, so a slow database cannot back up
/// into the transport.
async fn ingest_handler(
    State(app_state): State<Arc<AppState>>,
    Json(packet): Json<RawPacket>,
) -> Result<StatusCode, AppError> {
    if packet.node_id.is_empty() {
        return Err(AppError::InvalidInput("node_id must not be empty".to_string()));
    }

    debug!(node_id = %packet.node_id, class = %packet.class, "Packet accepted for processing.");
    app_state
        .ingest_tx
        .send(packet)
        .map_err(|_| AppError::InternalServerError("ingest pipeline is not running".to_string()))?;

    Ok(StatusCode::ACCEPTED)
}

pub fn create_ingest_router() -> Router<Arc<AppState>> {
    Router::new().route("/", post(ingest_handler))
}

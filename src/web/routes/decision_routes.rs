use axum::{extract::State, routing::get, Json, Router};
use std::sync::Arc;
use tracing::info;

use crate::decisions::Decision;
use crate::web::{AppError, AppState};

async fn list_decisions_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Vec<Decision>>, AppError> {
    let decisions = app_state.decision_store.list().await?;
    Ok(Json(decisions))
}

async fn clear_decisions_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let cleared = app_state.decision_store.clear().await?;
    info!(cleared, "Decision store cleared via API.");
    Ok(Json(serde_json::json!({ "cleared": cleared })))
}

pub fn create_decision_router() -> Router<Arc<AppState>> {
    Router::new().route(
        "/",
        get(list_decisions_handler).delete(clear_decisions_handler),
    )
}

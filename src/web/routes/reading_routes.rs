use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::db::models::{NodeStats, StoredRecord};
use crate::db::services::reading_service;
use crate::nodes::NodeLocation;
use crate::web::{AppError, AppState};

#[derive(Deserialize)]
struct LatestParams {
    limit: Option<i64>,
}

#[derive(Deserialize)]
struct HistoricalParams {
    hours: Option<i32>,
}

async fn latest_readings_handler(
    State(app_state): State<Arc<AppState>>,
    Query(params): Query<LatestParams>,
) -> Result<Json<Vec<StoredRecord>>, AppError> {
    let limit = params.limit.unwrap_or(50);
    if !(1..=1000).contains(&limit) {
        return Err(AppError::InvalidInput(
            "limit must be between 1 and 1000".to_string(),
        ));
    }
    let records = reading_service::get_latest_readings(&app_state.pool, limit).await?;
    Ok(Json(records))
}

async fn historical_readings_handler(
    State(app_state): State<Arc<AppState>>,
    Query(params): Query<HistoricalParams>,
) -> Result<Json<Vec<StoredRecord>>, AppError> {
    let hours = params.hours.unwrap_or(24);
    if !(1..=24 * 30).contains(&hours) {
        return Err(AppError::InvalidInput(
            "hours must be between 1 and 720".to_string(),
        ));
    }
    let records = reading_service::get_historical_readings(&app_state.pool, hours).await?;
    Ok(Json(records))
}

async fn node_stats_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Vec<NodeStats>>, AppError> {
    let stats = reading_service::get_node_stats(&app_state.pool).await?;
    Ok(Json(stats))
}

async fn node_locations_handler(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<Vec<NodeLocation>>, AppError> {
    Ok(Json(app_state.nodes.all().into_iter().cloned().collect()))
}

pub fn create_reading_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/latest", get(latest_readings_handler))
        .route("/historical", get(historical_readings_handler))
        .route("/nodes", get(node_stats_handler))
        .route("/nodes/locations", get(node_locations_handler))
}

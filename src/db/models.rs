use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Durable row of `sensor_db`, one per `(node_id, timestamp)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct StoredRecord {
    pub node_id: String,
    pub timestamp: DateTime<Utc>,
    pub temperature: Option<f64>,
    pub relative_humidity: Option<f64>,
    pub soil_moisture: Option<f64>,
    pub lux: Option<f64>,
    pub voltage: Option<f64>,
}

/// Per-node aggregate over the last 24 hours.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NodeStats {
    pub node_id: String,
    pub reading_count: i64,
    pub avg_temperature: Option<f64>,
    pub avg_relative_humidity: Option<f64>,
    pub avg_soil_moisture: Option<f64>,
    pub avg_lux: Option<f64>,
    pub avg_voltage: Option<f64>,
    pub last_seen: Option<DateTime<Utc>>,
}

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, warn};

use crate::db::models::{NodeStats, StoredRecord};
use crate::ingest::CanonicalReading;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

const CREATE_SENSOR_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS sensor_db (
    node_id VARCHAR(32) NOT NULL,
    timestamp TIMESTAMPTZ NOT NULL,
    temperature DOUBLE PRECISION,
    relative_humidity DOUBLE PRECISION,
    soil_moisture DOUBLE PRECISION,
    lux DOUBLE PRECISION,
    voltage DOUBLE PRECISION,
    UNIQUE (node_id, timestamp)
)
"#;

/// Creates the sensor table, then tries to promote it to a TimescaleDB
/// hypertable. The promotion is best effort; a plain Postgres table honors
/// the same upsert contract.
pub async fn init_db(pool: &PgPool) -> Result<(), StorageError> {
    sqlx::query(CREATE_SENSOR_TABLE).execute(pool).await?;
    if let Err(e) =
        sqlx::query("SELECT create_hypertable('sensor_db', 'timestamp', if_not_exists => TRUE)")
            .execute(pool)
            .await
    {
        warn!(error = %e, "TimescaleDB hypertable unavailable; continuing with a plain table.");
    }
    Ok(())
}

/// Metric columns present (non-null) in a reading, in schema order.
fn present_columns(reading: &CanonicalReading) -> Vec<&'static str> {
    let mut columns = Vec::new();
    if reading.temperature.is_some() {
        columns.push("temperature");
    }
    if reading.relative_humidity.is_some() {
        columns.push("relative_humidity");
    }
    if reading.soil_moisture.is_some() {
        columns.push("soil_moisture");
    }
    if reading.lux.is_some() {
        columns.push("lux");
    }
    if reading.voltage.is_some() {
        columns.push("voltage");
    }
    columns
}

/// Builds the merge-on-conflict statement for one reading. Only the columns
/// the reading actually carries appear in the SET clause, so metrics from
/// earlier packets survive; a reading with no metrics degenerates to a
/// timestamp re-affirmation instead of an error.
pub(crate) fn upsert_sql(reading: &CanonicalReading) -> String {
    let columns = present_columns(reading);
    let set_clause = if columns.is_empty() {
        "timestamp = EXCLUDED.timestamp".to_string()
    } else {
        columns
            .iter()
            .map(|col| format!("{col} = EXCLUDED.{col}"))
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!(
        "INSERT INTO sensor_db (node_id, timestamp, temperature, relative_humidity, \
         soil_moisture, lux, voltage) VALUES ($1, $2, $3, $4, $5, $6, $7) \
         ON CONFLICT (node_id, timestamp) DO UPDATE SET {set_clause}"
    )
}

pub async fn save_reading(pool: &PgPool, reading: &CanonicalReading) -> Result<(), StorageError> {
    let sql = upsert_sql(reading);
    sqlx::query(&sql)
        .bind(&reading.node_id)
        .bind(reading.timestamp)
        .bind(reading.temperature)
        .bind(reading.relative_humidity)
        .bind(reading.soil_moisture)
        .bind(reading.lux)
        .bind(reading.voltage)
        .execute(pool)
        .await?;
    debug!(node_id = %reading.node_id, timestamp = %reading.timestamp, "Saved reading.");
    Ok(())
}

pub async fn get_latest_readings(
    pool: &PgPool,
    limit: i64,
) -> Result<Vec<StoredRecord>, StorageError> {
    let records = sqlx::query_as::<_, StoredRecord>(
        "SELECT node_id, timestamp, temperature, relative_humidity, soil_moisture, lux, voltage \
         FROM sensor_db ORDER BY timestamp DESC LIMIT $1",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(records)
}

pub async fn get_historical_readings(
    pool: &PgPool,
    hours: i32,
) -> Result<Vec<StoredRecord>, StorageError> {
    let records = sqlx::query_as::<_, StoredRecord>(
        "SELECT node_id, timestamp, temperature, relative_humidity, soil_moisture, lux, voltage \
         FROM sensor_db WHERE timestamp >= NOW() - ($1 * INTERVAL '1 hour') \
         ORDER BY timestamp ASC",
    )
    .bind(hours)
    .fetch_all(pool)
    .await?;
    Ok(records)
}

pub async fn get_node_stats(pool: &PgPool) -> Result<Vec<NodeStats>, StorageError> {
    let stats = sqlx::query_as::<_, NodeStats>(
        "SELECT node_id, \
                COUNT(*) AS reading_count, \
                AVG(temperature) AS avg_temperature, \
                AVG(relative_humidity) AS avg_relative_humidity, \
                AVG(soil_moisture) AS avg_soil_moisture, \
                AVG(lux) AS avg_lux, \
                AVG(voltage) AS avg_voltage, \
                MAX(timestamp) AS last_seen \
         FROM sensor_db \
         WHERE timestamp >= NOW() - INTERVAL '24 hours' \
         GROUP BY node_id \
         ORDER BY last_seen DESC",
    )
    .fetch_all(pool)
    .await?;
    Ok(stats)
}

/// Write seam for the pipeline; fakes stand in for Postgres in tests.
#[async_trait]
pub trait ReadingStore: Send + Sync {
    async fn save(&self, reading: &CanonicalReading) -> Result<(), StorageError>;
}

/// Postgres-backed reading store relying on the database's atomic upsert
/// for cross-process conflict resolution.
pub struct PgReadingStore {
    pool: PgPool,
}

impl PgReadingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReadingStore for PgReadingStore {
    async fn save(&self, reading: &CanonicalReading) -> Result<(), StorageError> {
        save_reading(&self.pool, reading).await
    }
}

use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::db::services::reading_service::ReadingStore;
use crate::decisions::store::{DecisionStore, SaveOutcome};
use crate::decisions::ThresholdEngine;
use crate::ingest::{normalize, CanonicalReading, RawPacket};
use crate::nodes::NodeRegistry;
use crate::weather::service::ForecastProvider;

/// The single consumer of the ingress queue. Each packet is normalized once
/// and then follows two independent paths: durable persistence into the
/// reading store, and threshold evaluation into the decision store. A
/// failure on either path never blocks the other, and never stops the loop.
pub struct Pipeline {
    reading_store: Arc<dyn ReadingStore>,
    decision_store: Arc<DecisionStore>,
    engine: ThresholdEngine,
    weather: Arc<dyn ForecastProvider>,
    nodes: Arc<NodeRegistry>,
}

impl Pipeline {
    pub fn new(
        reading_store: Arc<dyn ReadingStore>,
        decision_store: Arc<DecisionStore>,
        engine: ThresholdEngine,
        weather: Arc<dyn ForecastProvider>,
        nodes: Arc<NodeRegistry>,
    ) -> Self {
        Self {
            reading_store,
            decision_store,
            engine,
            weather,
            nodes,
        }
    }

    /// Runs until the ingress channel closes or the stop signal flips. An
    /// in-flight packet always finishes processing before the loop exits.
    pub async fn run(
        self,
        mut packets: mpsc::UnboundedReceiver<RawPacket>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("Telemetry pipeline started.");
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                packet = packets.recv() => {
                    match packet {
                        Some(raw) => self.process(raw).await,
                        None => {
                            info!("Ingress channel closed.");
                            break;
                        }
                    }
                }
            }
        }
        info!("Telemetry pipeline stopped.");
    }

    async fn process(&self, raw: RawPacket) {
        let Some(reading) = normalize(&raw) else {
            return;
        };

        if let Err(e) = self.reading_store.save(&reading).await {
            warn!(
                node_id = %reading.node_id,
                error = %e,
                "Failed to persist reading; continuing."
            );
        }

        self.evaluate(&reading).await;
    }

    async fn evaluate(&self, reading: &CanonicalReading) {
        // The forecast only ever gates watering, so skip the lookup when the
        // reading carries no soil moisture.
        let forecast = if reading.soil_moisture.is_some() {
            match self.nodes.get(&reading.node_id) {
                Some(node) => self.weather.forecast_for(node).await,
                None => None,
            }
        } else {
            None
        };

        let decisions = match self.engine.analyze(reading, forecast.as_ref()) {
            Ok(decisions) => decisions,
            Err(e) => {
                error!(
                    node_id = %reading.node_id,
                    error = %e,
                    "Decision construction failed; check threshold configuration."
                );
                return;
            }
        };

        let Some(best) = ThresholdEngine::select_best(decisions) else {
            debug!(node_id = %reading.node_id, "No monitored metrics in reading.");
            return;
        };

        match self.decision_store.save(best.clone()).await {
            Ok(SaveOutcome::Replaced) => {
                info!(
                    node_id = %best.node_id,
                    action = ?best.action,
                    severity = ?best.severity,
                    confidence = best.confidence,
                    "Decision updated: {}", best.decision_text
                );
            }
            Ok(SaveOutcome::Refreshed) => {
                debug!(node_id = %best.node_id, "Decision unchanged; timestamp advanced.");
            }
            Err(e) => {
                warn!(
                    node_id = %best.node_id,
                    error = %e,
                    "Failed to persist decision; continuing."
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::services::reading_service::StorageError;
    use crate::decisions::{ActionType, DecisionRules, ThresholdConfig};
    use crate::nodes::NodeLocation;
    use crate::weather::models::WeatherForecast;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use tempfile::TempDir;

    struct FakeReadingStore {
        saved: StdMutex<Vec<CanonicalReading>>,
        fail: bool,
    }

    impl FakeReadingStore {
        fn new(fail: bool) -> Self {
            Self {
                saved: StdMutex::new(Vec::new()),
                fail,
            }
        }
    }

    #[async_trait]
    impl ReadingStore for FakeReadingStore {
        async fn save(&self, reading: &CanonicalReading) -> Result<(), StorageError> {
            if self.fail {
                return Err(StorageError::Database(sqlx::Error::PoolClosed));
            }
            self.saved.lock().unwrap().push(reading.clone());
            Ok(())
        }
    }

    struct FakeForecastProvider {
        forecast: Option<WeatherForecast>,
    }

    #[async_trait]
    impl ForecastProvider for FakeForecastProvider {
        async fn forecast_for(&self, _node: &NodeLocation) -> Option<WeatherForecast> {
            self.forecast.clone()
        }
    }

    fn rainy_forecast() -> WeatherForecast {
        WeatherForecast {
            node_id: "!a".to_string(),
            location_name: "Bed".to_string(),
            lat: 51.5,
            lon: -0.1,
            forecast_hours: 24,
            precipitation_expected: true,
            precipitation_probability: 0.9,
            precipitation_amount_mm: 8.0,
            precipitation_types: vec!["Rain".to_string()],
            temperature_avg: Some(12.0),
            description: "Rain expected in next 24h (8.0mm, 90% prob)".to_string(),
        }
    }

    fn pipeline_with(
        dir: &TempDir,
        reading_store: Arc<FakeReadingStore>,
        forecast: Option<WeatherForecast>,
    ) -> (Pipeline, Arc<DecisionStore>) {
        let decision_store = Arc::new(DecisionStore::new(dir.path().join("decisions.json")));
        let engine =
            ThresholdEngine::new(ThresholdConfig::default(), DecisionRules::default()).unwrap();
        let nodes = Arc::new(
            NodeRegistry::from_entries(vec![NodeLocation {
                node_id: "!a".to_string(),
                name: "Bed".to_string(),
                lat: 51.5,
                lon: -0.1,
            }])
            .unwrap(),
        );
        let pipeline = Pipeline::new(
            reading_store,
            decision_store.clone(),
            engine,
            Arc::new(FakeForecastProvider { forecast }),
            nodes,
        );
        (pipeline, decision_store)
    }

    fn soil_packet(node_id: &str, soil_moisture: f64) -> RawPacket {
        let mut payload = HashMap::new();
        payload.insert("soilMoisture".to_string(), Some(soil_moisture));
        RawPacket {
            node_id: node_id.to_string(),
            class: "environment".to_string(),
            payload,
            received_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn packet_flows_to_both_stores() {
        let dir = TempDir::new().unwrap();
        let readings = Arc::new(FakeReadingStore::new(false));
        let (pipeline, decisions) = pipeline_with(&dir, readings.clone(), None);

        pipeline.process(soil_packet("!a", 5.0)).await;

        assert_eq!(readings.saved.lock().unwrap().len(), 1);
        let stored = decisions.list().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].action, ActionType::WaterImmediately);
    }

    #[tokio::test]
    async fn storage_failure_does_not_block_decision_path() {
        let dir = TempDir::new().unwrap();
        let readings = Arc::new(FakeReadingStore::new(true));
        let (pipeline, decisions) = pipeline_with(&dir, readings, None);

        pipeline.process(soil_packet("!a", 5.0)).await;

        let stored = decisions.list().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].action, ActionType::WaterImmediately);
    }

    #[tokio::test]
    async fn rain_forecast_gates_the_persisted_decision() {
        let dir = TempDir::new().unwrap();
        let readings = Arc::new(FakeReadingStore::new(false));
        let (pipeline, decisions) = pipeline_with(&dir, readings, Some(rainy_forecast()));

        pipeline.process(soil_packet("!a", 5.0)).await;

        let stored = decisions.list().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].action, ActionType::None);
        assert_eq!(
            stored[0].context.get("weather_skip"),
            Some(&serde_json::json!(true))
        );
    }

    #[tokio::test]
    async fn unknown_packet_class_is_dropped_entirely() {
        let dir = TempDir::new().unwrap();
        let readings = Arc::new(FakeReadingStore::new(false));
        let (pipeline, decisions) = pipeline_with(&dir, readings.clone(), None);

        let mut packet = soil_packet("!a", 5.0);
        packet.class = "acoustic".to_string();
        pipeline.process(packet).await;

        assert!(readings.saved.lock().unwrap().is_empty());
        assert!(decisions.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn repeated_identical_state_only_refreshes() {
        let dir = TempDir::new().unwrap();
        let readings = Arc::new(FakeReadingStore::new(false));
        let (pipeline, decisions) = pipeline_with(&dir, readings, None);

        pipeline.process(soil_packet("!a", 5.0)).await;
        pipeline.process(soil_packet("!a", 5.0)).await;

        let stored = decisions.list().await.unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn stop_signal_ends_the_loop() {
        let dir = TempDir::new().unwrap();
        let readings = Arc::new(FakeReadingStore::new(false));
        let (pipeline, _decisions) = pipeline_with(&dir, readings, None);

        let (_packet_tx, packet_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(pipeline.run(packet_rx, shutdown_rx));
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}

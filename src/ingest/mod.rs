use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// A packet as delivered by the ingress boundary: the transport has already
/// resolved the sender and split the telemetry into a flat payload map plus a
/// class tag. Payload keys use the transport's wire names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawPacket {
    pub node_id: String,
    pub class: String,
    #[serde(default)]
    pub payload: HashMap<String, Option<f64>>,
    #[serde(default = "Utc::now")]
    pub received_at: DateTime<Utc>,
}

/// The closed set of telemetry shapes a node can report. Nodes send
/// environment and power metrics in separate packets, so each variant carries
/// only its own metric subset.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryPacket {
    Environment(EnvironmentMetrics),
    Power(PowerMetrics),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EnvironmentMetrics {
    pub temperature: Option<f64>,
    pub relative_humidity: Option<f64>,
    pub soil_moisture: Option<f64>,
    pub lux: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PowerMetrics {
    pub voltage: Option<f64>,
}

impl TelemetryPacket {
    /// Classifies a raw packet into one of the known telemetry shapes.
    /// Unknown class tags yield `None`; they are ignored, never propagated.
    pub fn classify(raw: &RawPacket) -> Option<TelemetryPacket> {
        let metric = |key: &str| raw.payload.get(key).copied().flatten();
        match raw.class.as_str() {
            "environment" => Some(TelemetryPacket::Environment(EnvironmentMetrics {
                temperature: metric("temperature"),
                relative_humidity: metric("relativeHumidity"),
                soil_moisture: metric("soilMoisture"),
                lux: metric("lux"),
            })),
            "power" => Some(TelemetryPacket::Power(PowerMetrics {
                voltage: metric("ch1Voltage"),
            })),
            _ => None,
        }
    }
}

/// A normalized, sparse metric snapshot for one node at one instant.
/// Identity is `(node_id, timestamp)`; metrics missing from the originating
/// packet stay `None` and are never defaulted to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalReading {
    pub node_id: String,
    pub timestamp: DateTime<Utc>,
    pub temperature: Option<f64>,
    pub relative_humidity: Option<f64>,
    pub soil_moisture: Option<f64>,
    pub lux: Option<f64>,
    pub voltage: Option<f64>,
}

impl CanonicalReading {
    pub fn empty(node_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            node_id: node_id.into(),
            timestamp,
            temperature: None,
            relative_humidity: None,
            soil_moisture: None,
            lux: None,
            voltage: None,
        }
    }

    /// True when at least one metric is present.
    pub fn has_metrics(&self) -> bool {
        self.temperature.is_some()
            || self.relative_humidity.is_some()
            || self.soil_moisture.is_some()
            || self.lux.is_some()
            || self.voltage.is_some()
    }
}

/// Converts a raw packet into a canonical reading. Returns `None` for
/// packets that cannot be attributed (empty node id) or whose class is not a
/// known telemetry shape.
pub fn normalize(raw: &RawPacket) -> Option<CanonicalReading> {
    if raw.node_id.is_empty() {
        debug!(class = %raw.class, "Dropping packet without a node id.");
        return None;
    }

    let Some(packet) = TelemetryPacket::classify(raw) else {
        debug!(node_id = %raw.node_id, class = %raw.class, "Dropping packet with unknown class.");
        return None;
    };

    let mut reading = CanonicalReading::empty(raw.node_id.clone(), raw.received_at);
    match packet {
        TelemetryPacket::Environment(env) => {
            reading.temperature = env.temperature;
            reading.relative_humidity = env.relative_humidity;
            reading.soil_moisture = env.soil_moisture;
            reading.lux = env.lux;
        }
        TelemetryPacket::Power(power) => {
            reading.voltage = power.voltage;
        }
    }
    Some(reading)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(class: &str, entries: &[(&str, Option<f64>)]) -> RawPacket {
        RawPacket {
            node_id: "!512397a3".to_string(),
            class: class.to_string(),
            payload: entries
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
            received_at: Utc::now(),
        }
    }

    #[test]
    fn environment_packet_maps_wire_names() {
        let packet = raw(
            "environment",
            &[
                ("temperature", Some(21.5)),
                ("relativeHumidity", Some(55.0)),
                ("soilMoisture", Some(33.0)),
                ("lux", Some(1200.0)),
            ],
        );
        let reading = normalize(&packet).unwrap();
        assert_eq!(reading.temperature, Some(21.5));
        assert_eq!(reading.relative_humidity, Some(55.0));
        assert_eq!(reading.soil_moisture, Some(33.0));
        assert_eq!(reading.lux, Some(1200.0));
        assert_eq!(reading.voltage, None);
    }

    #[test]
    fn power_packet_maps_channel_voltage() {
        let packet = raw("power", &[("ch1Voltage", Some(3.7))]);
        let reading = normalize(&packet).unwrap();
        assert_eq!(reading.voltage, Some(3.7));
        assert_eq!(reading.temperature, None);
        assert_eq!(reading.soil_moisture, None);
    }

    #[test]
    fn missing_payload_keys_stay_absent() {
        let packet = raw("environment", &[("temperature", Some(18.0))]);
        let reading = normalize(&packet).unwrap();
        assert_eq!(reading.temperature, Some(18.0));
        assert_eq!(reading.relative_humidity, None);
        assert_eq!(reading.soil_moisture, None);
        assert_eq!(reading.lux, None);
    }

    #[test]
    fn explicit_null_values_stay_absent() {
        let packet = raw("power", &[("ch1Voltage", None)]);
        let reading = normalize(&packet).unwrap();
        assert_eq!(reading.voltage, None);
        assert!(!reading.has_metrics());
    }

    #[test]
    fn unknown_class_is_rejected() {
        let packet = raw("airquality", &[("pm25", Some(12.0))]);
        assert!(normalize(&packet).is_none());
    }

    #[test]
    fn empty_node_id_is_rejected() {
        let mut packet = raw("environment", &[("temperature", Some(18.0))]);
        packet.node_id = String::new();
        assert!(normalize(&packet).is_none());
    }
}

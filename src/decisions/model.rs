use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::ingest::CanonicalReading;

#[derive(Debug, Error)]
pub enum DecisionError {
    #[error("confidence must be between 0 and 1, got {0}")]
    ConfidenceOutOfRange(f64),
}

/// Ordinal urgency of a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
    Info,
    Normal,
}

impl Severity {
    pub fn weight(self) -> u32 {
        match self {
            Severity::Critical => 100,
            Severity::Warning => 50,
            Severity::Info => 10,
            Severity::Normal => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    // Soil moisture actions
    WaterImmediately,
    WaterNeeded,
    ReduceWatering,

    // Voltage/power actions
    ChargeBatteryUrgent,
    ChargeBattery,
    CheckSolarPanel,

    // Monitoring actions
    Monitor,
    None,
}

impl ActionType {
    /// Actions that add water. `ReduceWatering` is deliberately excluded:
    /// the weather gate and the environmental modifiers only apply when the
    /// plan is to water.
    pub fn is_watering(self) -> bool {
        matches!(self, ActionType::WaterImmediately | ActionType::WaterNeeded)
    }
}

/// All metric values known at decision time.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub temperature: Option<f64>,
    pub relative_humidity: Option<f64>,
    pub soil_moisture: Option<f64>,
    pub lux: Option<f64>,
    pub voltage: Option<f64>,
}

impl From<&CanonicalReading> for MetricSnapshot {
    fn from(reading: &CanonicalReading) -> Self {
        Self {
            temperature: reading.temperature,
            relative_humidity: reading.relative_humidity,
            soil_moisture: reading.soil_moisture,
            lux: reading.lux,
            voltage: reading.voltage,
        }
    }
}

/// Output of the threshold engine: what to do for one node, how urgent it
/// is, and the evidence behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub node_id: String,
    pub timestamp: DateTime<Utc>,
    pub decision_text: String,
    pub action: ActionType,
    pub severity: Severity,
    pub confidence: f64,
    pub primary_metric: String,
    #[serde(default)]
    pub primary_value: Option<f64>,
    #[serde(default)]
    pub threshold_crossed: Option<String>,
    #[serde(default)]
    pub context: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub metrics: MetricSnapshot,
}

impl Decision {
    /// Enforces the confidence invariant. A violation here is a
    /// configuration or modifier-arithmetic bug, not bad input.
    pub fn validated(self) -> Result<Decision, DecisionError> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(DecisionError::ConfidenceOutOfRange(self.confidence));
        }
        Ok(self)
    }

    /// Ranking key when several decisions compete.
    pub fn priority(&self) -> f64 {
        f64::from(self.severity.weight()) * self.confidence
    }

    pub fn is_actionable(&self) -> bool {
        self.action != ActionType::None
            && matches!(self.severity, Severity::Critical | Severity::Warning)
    }

    /// Material equality: every field except the timestamp. Two decisions
    /// that agree here are the same state, just observed at different times.
    pub fn same_outcome(&self, other: &Decision) -> bool {
        self.node_id == other.node_id
            && self.decision_text == other.decision_text
            && self.action == other.action
            && self.severity == other.severity
            && self.confidence == other.confidence
            && self.primary_metric == other.primary_metric
            && self.primary_value == other.primary_value
            && self.threshold_crossed == other.threshold_crossed
            && self.context == other.context
            && self.metrics == other.metrics
    }
}

use serde_json::json;
use std::collections::BTreeMap;

use crate::decisions::model::{ActionType, Decision, DecisionError, MetricSnapshot, Severity};
use crate::decisions::thresholds::{DecisionRules, ThresholdConfig, ThresholdConfigError};
use crate::ingest::CanonicalReading;
use crate::weather::models::WeatherForecast;

/// Threshold-based decision engine. Two metric families produce actionable
/// decisions: watering (soil moisture) and charging (voltage). The other
/// metrics, and an optional weather forecast, adjust urgency and confidence.
pub struct ThresholdEngine {
    thresholds: ThresholdConfig,
    rules: DecisionRules,
}

const CONFIDENCE_CAP: f64 = 0.99;
const COLD_CONFIDENCE_FLOOR: f64 = 0.70;

impl ThresholdEngine {
    pub fn new(
        thresholds: ThresholdConfig,
        rules: DecisionRules,
    ) -> Result<Self, ThresholdConfigError> {
        thresholds.validate()?;
        rules.validate()?;
        Ok(Self { thresholds, rules })
    }

    /// Evaluates a reading, producing at most one decision per metric family
    /// present in it: watering first, then charging. Families whose driving
    /// metric sits in the optimal band still yield a NORMAL/none decision.
    pub fn analyze(
        &self,
        reading: &CanonicalReading,
        forecast: Option<&WeatherForecast>,
    ) -> Result<Vec<Decision>, DecisionError> {
        let mut decisions = Vec::new();
        if let Some(decision) = self.analyze_watering(reading, forecast)? {
            decisions.push(decision);
        }
        if let Some(decision) = self.analyze_charging(reading)? {
            decisions.push(decision);
        }
        Ok(decisions)
    }

    /// Derived view over `analyze`: the single highest-priority decision.
    /// Stable sort keeps the family order (watering before charging) on ties.
    pub fn select_best(mut decisions: Vec<Decision>) -> Option<Decision> {
        decisions.sort_by(|a, b| {
            b.priority()
                .partial_cmp(&a.priority())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        decisions.into_iter().next()
    }

    fn should_skip_watering(&self, forecast: &WeatherForecast) -> bool {
        if !forecast.precipitation_expected {
            return false;
        }
        (forecast.has_rain() && self.rules.skip_watering_if_rain_expected)
            || (forecast.has_snow() && self.rules.skip_watering_if_snow_expected)
    }

    fn analyze_watering(
        &self,
        reading: &CanonicalReading,
        forecast: Option<&WeatherForecast>,
    ) -> Result<Option<Decision>, DecisionError> {
        let Some(soil_moisture) = reading.soil_moisture else {
            return Ok(None);
        };

        let t = &self.thresholds.soil_moisture;
        let (text, action, severity, base_confidence, threshold_crossed) =
            if soil_moisture < t.critical_low {
                (
                    "Critical: Soil moisture extremely low",
                    ActionType::WaterImmediately,
                    Severity::Critical,
                    0.95,
                    Some("critical_low"),
                )
            } else if soil_moisture < t.low {
                (
                    "Low soil moisture detected",
                    ActionType::WaterNeeded,
                    Severity::Warning,
                    0.85,
                    Some("low"),
                )
            } else if soil_moisture > t.high {
                (
                    "Soil moisture high - reduce watering",
                    ActionType::ReduceWatering,
                    Severity::Warning,
                    0.80,
                    Some("high"),
                )
            } else {
                (
                    "Soil moisture within optimal range",
                    ActionType::None,
                    Severity::Normal,
                    0.95,
                    None,
                )
            };

        let mut decision_text = text.to_string();
        let mut confidence = base_confidence;
        let mut context: BTreeMap<String, serde_json::Value> = BTreeMap::new();

        // Precipitation gate: takes precedence over every modifier and
        // replaces the decision outright.
        if action.is_watering() {
            if let Some(forecast) = forecast {
                if self.should_skip_watering(forecast) {
                    context.insert("weather_skip".to_string(), json!(true));
                    context.insert(
                        "weather_description".to_string(),
                        json!(forecast.description),
                    );
                    let decision = Decision {
                        node_id: reading.node_id.clone(),
                        timestamp: reading.timestamp,
                        decision_text: format!("Watering postponed - {}", forecast.description),
                        action: ActionType::None,
                        severity: Severity::Normal,
                        confidence: base_confidence,
                        primary_metric: "soil_moisture".to_string(),
                        primary_value: Some(soil_moisture),
                        threshold_crossed: threshold_crossed.map(str::to_string),
                        context,
                        metrics: MetricSnapshot::from(reading),
                    };
                    return decision.validated().map(Some);
                }
            }
        }

        if action.is_watering() {
            if let Some(temp) = reading.temperature {
                let tt = &self.thresholds.temperature;
                if temp > tt.very_hot {
                    decision_text.push_str(&format!(
                        " (very hot conditions: {temp:.1}\u{b0}C increasing evaporation)"
                    ));
                    confidence = (confidence + 0.05).min(CONFIDENCE_CAP);
                    context.insert("temperature_factor".to_string(), json!("very_hot"));
                } else if temp > tt.hot {
                    decision_text.push_str(&format!(" (hot conditions: {temp:.1}\u{b0}C)"));
                    confidence = (confidence + 0.03).min(CONFIDENCE_CAP);
                    context.insert("temperature_factor".to_string(), json!("hot"));
                } else if temp < tt.cold {
                    // Cold weather slows evaporation; lower the urgency.
                    confidence = (confidence - 0.05).max(COLD_CONFIDENCE_FLOOR);
                    context.insert("temperature_factor".to_string(), json!("cold"));
                }
            }

            if let Some(humidity) = reading.relative_humidity {
                if humidity < self.thresholds.relative_humidity.dry {
                    decision_text.push_str(&format!(" (dry air: {humidity:.1}% RH)"));
                    confidence = (confidence + 0.04).min(CONFIDENCE_CAP);
                    context.insert("humidity_factor".to_string(), json!("dry"));
                }
            }

            if let Some(lux) = reading.lux {
                if lux > self.thresholds.lux.bright {
                    decision_text.push_str(" (bright sun increasing evaporation)");
                    confidence = (confidence + 0.03).min(CONFIDENCE_CAP);
                    context.insert("light_factor".to_string(), json!("bright"));
                }
            }

            // Precipitation below the skip policy still argues against
            // watering; scale the confidence down instead of gating.
            if let Some(forecast) = forecast {
                if forecast.precipitation_expected {
                    let reduction =
                        if forecast.precipitation_amount_mm > self.rules.heavy_precipitation_mm {
                            self.rules.confidence_reduction_heavy_rain
                        } else {
                            self.rules.confidence_reduction_light_rain
                        };
                    let multiplier = 1.0 - reduction;
                    if multiplier < 1.0 {
                        confidence *= multiplier;
                        decision_text.push_str(&format!(
                            " (precipitation expected: {:.1}mm)",
                            forecast.precipitation_amount_mm
                        ));
                        context.insert("confidence_adjustment".to_string(), json!(multiplier));
                    }
                }
            }
        }

        let decision = Decision {
            node_id: reading.node_id.clone(),
            timestamp: reading.timestamp,
            decision_text,
            action,
            severity,
            confidence,
            primary_metric: "soil_moisture".to_string(),
            primary_value: Some(soil_moisture),
            threshold_crossed: threshold_crossed.map(str::to_string),
            context,
            metrics: MetricSnapshot::from(reading),
        };
        decision.validated().map(Some)
    }

    fn analyze_charging(
        &self,
        reading: &CanonicalReading,
    ) -> Result<Option<Decision>, DecisionError> {
        let Some(voltage) = reading.voltage else {
            return Ok(None);
        };

        let t = &self.thresholds.voltage;
        let (text, base_action, severity, base_confidence, threshold_crossed) =
            if voltage < t.critical_low {
                (
                    "Critical: Battery voltage critically low",
                    ActionType::ChargeBatteryUrgent,
                    Severity::Critical,
                    0.98,
                    Some("critical_low"),
                )
            } else if voltage < t.low {
                (
                    "Low battery voltage",
                    ActionType::ChargeBattery,
                    Severity::Warning,
                    0.90,
                    Some("low"),
                )
            } else {
                (
                    "Battery voltage within optimal range",
                    ActionType::None,
                    Severity::Normal,
                    0.95,
                    None,
                )
            };

        let mut decision_text = text.to_string();
        let mut confidence: f64 = base_confidence;
        let mut action = base_action;
        let mut context: BTreeMap<String, serde_json::Value> = BTreeMap::new();

        if base_action != ActionType::None {
            if let Some(lux) = reading.lux {
                let lt = &self.thresholds.lux;
                if lux < lt.dark {
                    decision_text.push_str(" (no sunlight - check solar panel positioning)");
                    confidence = (confidence + 0.02).min(CONFIDENCE_CAP);
                    context.insert("light_factor".to_string(), json!("dark"));
                    context.insert("charging_capacity".to_string(), json!("none"));
                } else if lux < lt.low_light {
                    decision_text.push_str(" (low light - limited solar charging)");
                    context.insert("light_factor".to_string(), json!("low"));
                    context.insert("charging_capacity".to_string(), json!("limited"));
                } else if lux > lt.bright {
                    // Ample light yet low voltage points at the panel, not
                    // the energy budget.
                    decision_text.push_str(" (good sunlight available - check solar panel)");
                    action = ActionType::CheckSolarPanel;
                    context.insert("light_factor".to_string(), json!("bright"));
                    context.insert("charging_capacity".to_string(), json!("full"));
                }
            }
        }

        let decision = Decision {
            node_id: reading.node_id.clone(),
            timestamp: reading.timestamp,
            decision_text,
            action,
            severity,
            confidence,
            primary_metric: "voltage".to_string(),
            primary_value: Some(voltage),
            threshold_crossed: threshold_crossed.map(str::to_string),
            context,
            metrics: MetricSnapshot::from(reading),
        };
        decision.validated().map(Some)
    }
}

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ThresholdConfigError {
    #[error("threshold breakpoints for {metric} must be strictly increasing: {detail}")]
    Ordering {
        metric: &'static str,
        detail: String,
    },
    #[error("decision rule {rule} must be between 0 and 1, got {value}")]
    RuleOutOfRange { rule: &'static str, value: f64 },
    #[error("heavy_precipitation_mm must be non-negative, got {0}")]
    NegativePrecipitationBoundary(f64),
}

/// Named breakpoints per metric family. Loaded once; replaced wholesale on
/// reconfiguration, never merged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub soil_moisture: SoilMoistureThresholds,
    pub voltage: VoltageThresholds,
    pub temperature: TemperatureThresholds,
    pub relative_humidity: HumidityThresholds,
    pub lux: LuxThresholds,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            soil_moisture: SoilMoistureThresholds::default(),
            voltage: VoltageThresholds::default(),
            temperature: TemperatureThresholds::default(),
            relative_humidity: HumidityThresholds::default(),
            lux: LuxThresholds::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SoilMoistureThresholds {
    pub critical_low: f64,
    pub low: f64,
    pub optimal_min: f64,
    pub optimal_max: f64,
    pub high: f64,
}

impl Default for SoilMoistureThresholds {
    fn default() -> Self {
        Self {
            critical_low: 10.0,
            low: 20.0,
            optimal_min: 25.0,
            optimal_max: 40.0,
            high: 45.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VoltageThresholds {
    pub critical_low: f64,
    pub low: f64,
    pub optimal_min: f64,
    pub optimal_max: f64,
}

impl Default for VoltageThresholds {
    fn default() -> Self {
        Self {
            critical_low: 2.8,
            low: 3.0,
            optimal_min: 3.2,
            optimal_max: 4.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemperatureThresholds {
    pub cold: f64,
    pub optimal: f64,
    pub hot: f64,
    pub very_hot: f64,
}

impl Default for TemperatureThresholds {
    fn default() -> Self {
        Self {
            cold: 10.0,
            optimal: 20.0,
            hot: 30.0,
            very_hot: 35.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HumidityThresholds {
    pub dry: f64,
    pub optimal: f64,
    pub humid: f64,
}

impl Default for HumidityThresholds {
    fn default() -> Self {
        Self {
            dry: 40.0,
            optimal: 60.0,
            humid: 80.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LuxThresholds {
    pub dark: f64,
    pub low_light: f64,
    pub moderate: f64,
    pub bright: f64,
}

impl Default for LuxThresholds {
    fn default() -> Self {
        Self {
            dark: 100.0,
            low_light: 1000.0,
            moderate: 5000.0,
            bright: 15000.0,
        }
    }
}

fn check_ascending(
    metric: &'static str,
    named: &[(&str, f64)],
) -> Result<(), ThresholdConfigError> {
    for pair in named.windows(2) {
        let (lo_name, lo) = pair[0];
        let (hi_name, hi) = pair[1];
        if lo >= hi {
            return Err(ThresholdConfigError::Ordering {
                metric,
                detail: format!("{lo_name} ({lo}) >= {hi_name} ({hi})"),
            });
        }
    }
    Ok(())
}

impl ThresholdConfig {
    /// Rejects breakpoint sets that are not strictly increasing. Called at
    /// engine construction; never mid-stream.
    pub fn validate(&self) -> Result<(), ThresholdConfigError> {
        let s = &self.soil_moisture;
        check_ascending(
            "soil_moisture",
            &[
                ("critical_low", s.critical_low),
                ("low", s.low),
                ("optimal_min", s.optimal_min),
                ("optimal_max", s.optimal_max),
                ("high", s.high),
            ],
        )?;
        let v = &self.voltage;
        check_ascending(
            "voltage",
            &[
                ("critical_low", v.critical_low),
                ("low", v.low),
                ("optimal_min", v.optimal_min),
                ("optimal_max", v.optimal_max),
            ],
        )?;
        let t = &self.temperature;
        check_ascending(
            "temperature",
            &[
                ("cold", t.cold),
                ("optimal", t.optimal),
                ("hot", t.hot),
                ("very_hot", t.very_hot),
            ],
        )?;
        let h = &self.relative_humidity;
        check_ascending(
            "relative_humidity",
            &[("dry", h.dry), ("optimal", h.optimal), ("humid", h.humid)],
        )?;
        let l = &self.lux;
        check_ascending(
            "lux",
            &[
                ("dark", l.dark),
                ("low_light", l.low_light),
                ("moderate", l.moderate),
                ("bright", l.bright),
            ],
        )?;
        Ok(())
    }
}

/// Weather-driven adjustment rules for watering decisions. The boundary
/// between light and heavy precipitation is configurable rather than baked
/// in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionRules {
    pub skip_watering_if_rain_expected: bool,
    pub skip_watering_if_snow_expected: bool,
    pub confidence_reduction_heavy_rain: f64,
    pub confidence_reduction_light_rain: f64,
    pub heavy_precipitation_mm: f64,
}

impl Default for DecisionRules {
    fn default() -> Self {
        Self {
            skip_watering_if_rain_expected: true,
            skip_watering_if_snow_expected: true,
            confidence_reduction_heavy_rain: 0.7,
            confidence_reduction_light_rain: 0.3,
            heavy_precipitation_mm: 5.0,
        }
    }
}

impl DecisionRules {
    pub fn validate(&self) -> Result<(), ThresholdConfigError> {
        for (rule, value) in [
            (
                "confidence_reduction_heavy_rain",
                self.confidence_reduction_heavy_rain,
            ),
            (
                "confidence_reduction_light_rain",
                self.confidence_reduction_light_rain,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ThresholdConfigError::RuleOutOfRange { rule, value });
            }
        }
        if self.heavy_precipitation_mm < 0.0 {
            return Err(ThresholdConfigError::NegativePrecipitationBoundary(
                self.heavy_precipitation_mm,
            ));
        }
        Ok(())
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reduced forecast for one node's location over the configured window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherForecast {
    pub node_id: String,
    pub location_name: String,
    pub lat: f64,
    pub lon: f64,
    pub forecast_hours: u32,
    pub precipitation_expected: bool,
    pub precipitation_probability: f64,
    pub precipitation_amount_mm: f64,
    pub precipitation_types: Vec<String>,
    pub temperature_avg: Option<f64>,
    pub description: String,
}

impl WeatherForecast {
    pub fn has_rain(&self) -> bool {
        self.precipitation_types
            .iter()
            .any(|t| t == "Rain" || t == "Drizzle")
    }

    pub fn has_snow(&self) -> bool {
        self.precipitation_types.iter().any(|t| t == "Snow")
    }
}

/// A cached forecast together with the instant it was fetched. The fetch
/// time, not last access, drives both TTL expiry and capacity eviction.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastEntry {
    pub forecast: WeatherForecast,
    pub fetched_at: DateTime<Utc>,
}

impl ForecastEntry {
    pub fn new(forecast: WeatherForecast, fetched_at: DateTime<Utc>) -> Self {
        Self {
            forecast,
            fetched_at,
        }
    }
}

// Wire shapes of the provider's 5-day/3-hour forecast response, reduced to
// the fields the parser consumes.

#[derive(Debug, Deserialize)]
pub struct ProviderForecastResponse {
    #[serde(default)]
    pub list: Vec<ProviderForecastSlot>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProviderForecastSlot {
    #[serde(default)]
    pub dt: i64,
    #[serde(default)]
    pub pop: f64,
    #[serde(default)]
    pub rain: Option<PrecipitationVolume>,
    #[serde(default)]
    pub snow: Option<PrecipitationVolume>,
    #[serde(default)]
    pub weather: Vec<ProviderCondition>,
    #[serde(default)]
    pub main: Option<ProviderSlotMain>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PrecipitationVolume {
    /// Accumulation over the 3-hour forecast slot, in millimetres.
    #[serde(rename = "3h", default)]
    pub three_hours: f64,
}

#[derive(Debug, Deserialize)]
pub struct ProviderCondition {
    #[serde(default)]
    pub main: String,
}

#[derive(Debug, Deserialize)]
pub struct ProviderSlotMain {
    #[serde(default)]
    pub temp: Option<f64>,
}

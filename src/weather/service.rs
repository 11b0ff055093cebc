use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::nodes::NodeLocation;
use crate::weather::cache::ForecastCache;
use crate::weather::models::{ForecastEntry, ProviderForecastResponse, WeatherForecast};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout_seconds: u64,
    pub hours_ahead: u32,
    pub precipitation_threshold_mm: f64,
    pub precipitation_types: Vec<String>,
    pub cache_enabled: bool,
    pub cache_duration_minutes: i64,
    pub cache_max_entries: usize,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openweathermap.org/data/2.5".to_string(),
            timeout_seconds: 10,
            hours_ahead: 24,
            precipitation_threshold_mm: 1.0,
            precipitation_types: vec![
                "Rain".to_string(),
                "Drizzle".to_string(),
                "Snow".to_string(),
            ],
            cache_enabled: true,
            cache_duration_minutes: 30,
            cache_max_entries: 100,
        }
    }
}

/// Boundary to the weather collaborator. Returning `None` means "no
/// forecast"; callers degrade gracefully and the precipitation gate fails
/// open.
#[async_trait]
pub trait ForecastProvider: Send + Sync {
    async fn forecast_for(&self, node: &NodeLocation) -> Option<WeatherForecast>;
}

/// Forecast fetcher over an OpenWeatherMap-compatible 5-day/3-hour API,
/// fronted by the TTL/capacity-bounded cache.
pub struct WeatherService {
    config: WeatherConfig,
    client: reqwest::Client,
    cache: Option<ForecastCache>,
}

impl WeatherService {
    pub fn new(config: WeatherConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()?;
        let cache = config.cache_enabled.then(|| {
            ForecastCache::new(
                Duration::minutes(config.cache_duration_minutes),
                config.cache_max_entries,
            )
        });
        Ok(Self {
            config,
            client,
            cache,
        })
    }

    async fn fetch_from_api(&self, node: &NodeLocation) -> Option<WeatherForecast> {
        if self.config.api_key.is_empty() {
            debug!(node_id = %node.node_id, "No weather API key configured; skipping forecast.");
            return None;
        }

        let url = format!("{}/forecast", self.config.base_url);
        let params = [
            ("lat", node.lat.to_string()),
            ("lon", node.lon.to_string()),
            ("appid", self.config.api_key.clone()),
            ("units", "metric".to_string()),
        ];

        let response = match self.client.get(&url).query(&params).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(node_id = %node.node_id, error = %e, "Weather API request failed.");
                return None;
            }
        };
        let response = match response.error_for_status() {
            Ok(response) => response,
            Err(e) => {
                warn!(node_id = %node.node_id, error = %e, "Weather API returned an error status.");
                return None;
            }
        };
        let data: ProviderForecastResponse = match response.json().await {
            Ok(data) => data,
            Err(e) => {
                warn!(node_id = %node.node_id, error = %e, "Failed to decode weather API response.");
                return None;
            }
        };

        parse_forecast(&self.config, node, &data, Utc::now())
    }
}

#[async_trait]
impl ForecastProvider for WeatherService {
    async fn forecast_for(&self, node: &NodeLocation) -> Option<WeatherForecast> {
        if let Some(cache) = &self.cache {
            if let Some(entry) = cache.get(&node.node_id).await {
                return Some(entry.forecast);
            }
        }

        let forecast = self.fetch_from_api(node).await?;

        if let Some(cache) = &self.cache {
            cache
                .put(
                    &node.node_id,
                    ForecastEntry::new(forecast.clone(), Utc::now()),
                )
                .await;
        }
        Some(forecast)
    }
}

/// Reduces a raw provider response to the forecast shape the engine
/// consumes: precipitation accumulated over the configured window, the
/// maximum probability seen, and the matching condition types.
pub(crate) fn parse_forecast(
    config: &WeatherConfig,
    node: &NodeLocation,
    data: &ProviderForecastResponse,
    now: DateTime<Utc>,
) -> Option<WeatherForecast> {
    if data.list.is_empty() {
        return None;
    }

    let cutoff = now + Duration::hours(i64::from(config.hours_ahead));
    let mut total_precip_mm = 0.0;
    let mut max_precip_prob: f64 = 0.0;
    let mut found_types: Vec<String> = Vec::new();
    let mut temps = Vec::new();

    for slot in &data.list {
        let Some(slot_time) = DateTime::<Utc>::from_timestamp(slot.dt, 0) else {
            continue;
        };
        if slot_time > cutoff {
            break;
        }

        let rain_mm = slot.rain.as_ref().map_or(0.0, |r| r.three_hours);
        let snow_mm = slot.snow.as_ref().map_or(0.0, |s| s.three_hours);
        total_precip_mm += rain_mm + snow_mm;
        max_precip_prob = max_precip_prob.max(slot.pop);

        for condition in &slot.weather {
            if config.precipitation_types.contains(&condition.main)
                && !found_types.contains(&condition.main)
            {
                found_types.push(condition.main.clone());
            }
        }

        if let Some(temp) = slot.main.as_ref().and_then(|m| m.temp) {
            temps.push(temp);
        }
    }

    found_types.sort();

    let precipitation_expected = total_precip_mm >= config.precipitation_threshold_mm
        || max_precip_prob > 0.5
        || !found_types.is_empty();

    let temperature_avg = if temps.is_empty() {
        None
    } else {
        Some(temps.iter().sum::<f64>() / temps.len() as f64)
    };

    let hours = config.hours_ahead;
    let description = if precipitation_expected {
        let kinds = if found_types.is_empty() {
            "precipitation".to_string()
        } else {
            found_types.join(", ")
        };
        format!(
            "{kinds} expected in next {hours}h ({total_precip_mm:.1}mm, {:.0}% prob)",
            max_precip_prob * 100.0
        )
    } else {
        format!("No significant precipitation expected in next {hours}h")
    };

    Some(WeatherForecast {
        node_id: node.node_id.clone(),
        location_name: node.name.clone(),
        lat: node.lat,
        lon: node.lon,
        forecast_hours: hours,
        precipitation_expected,
        precipitation_probability: max_precip_prob,
        precipitation_amount_mm: total_precip_mm,
        precipitation_types: found_types,
        temperature_avg,
        description,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node() -> NodeLocation {
        NodeLocation {
            node_id: "!512397a3".to_string(),
            name: "South bed".to_string(),
            lat: 51.5,
            lon: -0.1,
        }
    }

    fn response(slots: serde_json::Value) -> ProviderForecastResponse {
        serde_json::from_value(json!({ "list": slots })).unwrap()
    }

    #[test]
    fn accumulates_precipitation_within_window() {
        let now = Utc::now();
        let data = response(json!([
            {
                "dt": now.timestamp() + 3600,
                "pop": 0.3,
                "rain": { "3h": 2.5 },
                "weather": [{ "main": "Rain" }],
                "main": { "temp": 15.0 }
            },
            {
                "dt": now.timestamp() + 7200,
                "pop": 0.8,
                "snow": { "3h": 1.0 },
                "weather": [{ "main": "Snow" }],
                "main": { "temp": 1.0 }
            }
        ]));

        let forecast = parse_forecast(&WeatherConfig::default(), &node(), &data, now).unwrap();
        assert!(forecast.precipitation_expected);
        assert!((forecast.precipitation_amount_mm - 3.5).abs() < 1e-9);
        assert!((forecast.precipitation_probability - 0.8).abs() < 1e-9);
        assert_eq!(forecast.precipitation_types, vec!["Rain", "Snow"]);
        assert_eq!(forecast.temperature_avg, Some(8.0));
    }

    #[test]
    fn slots_beyond_window_are_ignored() {
        let now = Utc::now();
        let beyond = now.timestamp() + i64::from(WeatherConfig::default().hours_ahead) * 3600 + 3600;
        let data = response(json!([
            {
                "dt": beyond,
                "pop": 0.9,
                "rain": { "3h": 10.0 },
                "weather": [{ "main": "Rain" }]
            }
        ]));

        let forecast = parse_forecast(&WeatherConfig::default(), &node(), &data, now).unwrap();
        assert!(!forecast.precipitation_expected);
        assert_eq!(forecast.precipitation_amount_mm, 0.0);
        assert!(forecast.precipitation_types.is_empty());
    }

    #[test]
    fn high_probability_alone_implies_precipitation() {
        let now = Utc::now();
        let data = response(json!([
            { "dt": now.timestamp() + 3600, "pop": 0.6, "weather": [] }
        ]));
        let forecast = parse_forecast(&WeatherConfig::default(), &node(), &data, now).unwrap();
        assert!(forecast.precipitation_expected);
        assert_eq!(forecast.precipitation_amount_mm, 0.0);
    }

    #[test]
    fn clear_window_is_not_precipitation() {
        let now = Utc::now();
        let data = response(json!([
            {
                "dt": now.timestamp() + 3600,
                "pop": 0.1,
                "weather": [{ "main": "Clear" }],
                "main": { "temp": 22.0 }
            }
        ]));
        let forecast = parse_forecast(&WeatherConfig::default(), &node(), &data, now).unwrap();
        assert!(!forecast.precipitation_expected);
        assert!(forecast.description.contains("No significant precipitation"));
    }

    #[test]
    fn empty_forecast_list_yields_none() {
        let data = response(json!([]));
        assert!(parse_forecast(&WeatherConfig::default(), &node(), &data, Utc::now()).is_none());
    }

    #[test]
    fn condition_types_outside_policy_are_ignored() {
        let now = Utc::now();
        let config = WeatherConfig {
            precipitation_types: vec!["Rain".to_string()],
            ..WeatherConfig::default()
        };
        let data = response(json!([
            { "dt": now.timestamp() + 3600, "pop": 0.2, "weather": [{ "main": "Snow" }] }
        ]));
        let forecast = parse_forecast(&config, &node(), &data, now).unwrap();
        assert!(forecast.precipitation_types.is_empty());
        assert!(!forecast.precipitation_expected);
    }
}

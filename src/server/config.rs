use serde::Deserialize;
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::decisions::thresholds::{DecisionRules, ThresholdConfig, ThresholdConfigError};
use crate::weather::service::WeatherConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("failed to load config from environment: {0}")]
    Env(String),
    #[error("{0} is required")]
    Missing(&'static str),
    #[error(transparent)]
    Thresholds(#[from] ThresholdConfigError),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub listen_addr: String,
    pub data_dir: String,
    pub nodes_file: String,
    pub thresholds: ThresholdConfig,
    pub rules: DecisionRules,
    pub weather: WeatherConfig,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialAppConfig {
    database_url: Option<String>,
    listen_addr: Option<String>,
    data_dir: Option<String>,
    nodes_file: Option<String>,
    weather_api_key: Option<String>,
    #[serde(default)]
    thresholds: Option<ThresholdConfig>,
    #[serde(default)]
    rules: Option<DecisionRules>,
    #[serde(default)]
    weather: Option<WeatherConfig>,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_nodes_file() -> String {
    "config/nodes.json".to_string()
}

impl AppConfig {
    /// Loads configuration by layering: TOML file (optional), then
    /// environment variables on top. Threshold and rule sections are
    /// validated here so an invalid setup never reaches the stream.
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        // 1. Load from file (optional)
        let file_config: PartialAppConfig = if let Some(path_str) = config_path {
            let path = Path::new(path_str);
            if path.exists() {
                let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path_str.to_string(),
                    source,
                })?;
                toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                    path: path_str.to_string(),
                    source,
                })?
            } else {
                PartialAppConfig::default()
            }
        } else {
            PartialAppConfig::default()
        };

        // 2. Load from environment variables
        let env_config: PartialAppConfig =
            envy::from_env().map_err(|e| ConfigError::Env(e.to_string()))?;

        // 3. Merge: environment overrides file
        let mut weather = env_config
            .weather
            .or(file_config.weather)
            .unwrap_or_default();
        if let Some(api_key) = env_config.weather_api_key.or(file_config.weather_api_key) {
            weather.api_key = api_key;
        }

        let config = AppConfig {
            database_url: env_config
                .database_url
                .or(file_config.database_url)
                .ok_or(ConfigError::Missing("DATABASE_URL"))?,
            listen_addr: env_config
                .listen_addr
                .or(file_config.listen_addr)
                .unwrap_or_else(default_listen_addr),
            data_dir: env_config
                .data_dir
                .or(file_config.data_dir)
                .unwrap_or_else(default_data_dir),
            nodes_file: env_config
                .nodes_file
                .or(file_config.nodes_file)
                .unwrap_or_else(default_nodes_file),
            thresholds: env_config
                .thresholds
                .or(file_config.thresholds)
                .unwrap_or_default(),
            rules: env_config.rules.or(file_config.rules).unwrap_or_default(),
            weather,
        };

        config.thresholds.validate()?;
        config.rules.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_sections_parse_with_partial_overrides() {
        let partial: PartialAppConfig = toml::from_str(
            r#"
database_url = "postgresql://localhost/sensor_db"
listen_addr = "127.0.0.1:9090"

[thresholds.soil_moisture]
critical_low = 12.0

[rules]
heavy_precipitation_mm = 4.0

[weather]
api_key = "abc123"
hours_ahead = 12
"#,
        )
        .unwrap();

        assert_eq!(
            partial.database_url.as_deref(),
            Some("postgresql://localhost/sensor_db")
        );
        let thresholds = partial.thresholds.unwrap();
        assert_eq!(thresholds.soil_moisture.critical_low, 12.0);
        assert_eq!(thresholds.soil_moisture.low, 20.0);
        let rules = partial.rules.unwrap();
        assert_eq!(rules.heavy_precipitation_mm, 4.0);
        assert!(rules.skip_watering_if_rain_expected);
        let weather = partial.weather.unwrap();
        assert_eq!(weather.api_key, "abc123");
        assert_eq!(weather.hours_ahead, 12);
        assert_eq!(weather.timeout_seconds, 10);
    }
}

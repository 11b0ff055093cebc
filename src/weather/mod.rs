pub mod cache;
pub mod models;
pub mod service;

pub use cache::ForecastCache;
pub use models::{ForecastEntry, WeatherForecast};
pub use service::{ForecastProvider, WeatherConfig, WeatherService};

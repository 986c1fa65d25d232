//! Core library for the weather lookup service.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - Abstraction over the upstream weather provider (OpenWeather)
//! - Forecast aggregation into daily summaries
//! - The lookup orchestrator producing a [`WeatherReport`]
//!
//! It is used by `weather-server`, but can also be reused by other binaries or services.

pub mod config;
pub mod forecast;
pub mod lookup;
pub mod model;
pub mod provider;

pub use config::{Config, CredentialFingerprint, ForecastConfig, ProviderConfig, ServerConfig};
pub use forecast::{ForecastSample, aggregate_daily};
pub use lookup::{LookupError, UpstreamStage, WeatherService};
pub use model::{
    CityLookup, Coordinates, CurrentConditions, ForecastDay, LookupRequest, Units, WeatherReport,
};
pub use provider::{OpenWeatherProvider, ProviderError, WeatherProvider};

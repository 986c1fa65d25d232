use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Debug;
use thiserror::Error;

use crate::{
    forecast::ForecastSample,
    model::{CityLookup, Coordinates, CurrentConditions, Units},
};

pub mod openweather;

pub use openweather::OpenWeatherProvider;

/// Placeholder substituted for the credential in any URL we echo or log.
pub const REDACTED: &str = "[hidden]";

/// Failure of a single provider call. Every variant carries the request URL
/// with the credential already replaced by [`REDACTED`]; response bodies are
/// scrubbed of the credential the same way.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request to {request_url} failed: {source}")]
    Transport {
        request_url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("provider returned status {status} for {request_url}")]
    Status {
        status: u16,
        body: String,
        request_url: String,
    },

    #[error("failed to decode provider response from {request_url}: {source}")]
    Decode {
        status: u16,
        request_url: String,
        body: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ProviderError {
    pub fn request_url(&self) -> &str {
        match self {
            ProviderError::Transport { request_url, .. }
            | ProviderError::Status { request_url, .. }
            | ProviderError::Decode { request_url, .. } => request_url,
        }
    }

    /// Upstream HTTP status, if a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Status { status, .. } | ProviderError::Decode { status, .. } => {
                Some(*status)
            }
            ProviderError::Transport { .. } => None,
        }
    }

    /// Upstream body as JSON when it parses, else as a plain string. For
    /// transport failures the error text is used instead.
    pub fn details(&self) -> Value {
        match self {
            ProviderError::Status { body, .. } | ProviderError::Decode { body, .. } => {
                serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.clone()))
            }
            ProviderError::Transport { source, .. } => Value::String(source.to_string()),
        }
    }
}

/// The three read operations the orchestrator needs from a weather provider.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    /// Resolve a city name to coordinates and a display name.
    async fn current_by_name(&self, city: &str) -> Result<CityLookup, ProviderError>;

    async fn current_by_coords(
        &self,
        coords: Coordinates,
        units: Units,
    ) -> Result<CurrentConditions, ProviderError>;

    /// 3-hour interval forecast samples, in provider order.
    async fn forecast_by_coords(
        &self,
        coords: Coordinates,
        units: Units,
    ) -> Result<Vec<ForecastSample>, ProviderError>;
}

//! Sequencing of provider calls into a single [`WeatherReport`].

use chrono::{NaiveDate, Utc};
use std::{fmt, sync::Arc};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::{
    config::{Config, ForecastConfig},
    forecast::{aggregate_daily, placeholder_days},
    model::{CurrentConditions, LookupRequest, WeatherReport},
    provider::{OpenWeatherProvider, ProviderError, WeatherProvider},
};

/// Which mandatory provider call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamStage {
    CityLookup,
    WeatherData,
}

impl UpstreamStage {
    pub fn message(&self) -> &'static str {
        match self {
            UpstreamStage::CityLookup => "City lookup failed",
            UpstreamStage::WeatherData => "Weather data lookup failed",
        }
    }
}

impl fmt::Display for UpstreamStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("City is required")]
    MissingCity,

    #[error("Units must be 'metric' or 'imperial'")]
    InvalidUnits(String),

    #[error("Could not find coordinates for city")]
    NotFound { city: String },

    #[error("{stage}")]
    Upstream {
        stage: UpstreamStage,
        #[source]
        source: ProviderError,
    },
}

/// Resolves a city, fetches current conditions and the optional forecast.
#[derive(Debug, Clone)]
pub struct WeatherService {
    provider: Arc<dyn WeatherProvider>,
    forecast: ForecastConfig,
}

impl WeatherService {
    pub fn new(provider: Arc<dyn WeatherProvider>, forecast: ForecastConfig) -> Self {
        Self { provider, forecast }
    }

    /// Service backed by OpenWeather, with the credential taken from `config`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let provider = OpenWeatherProvider::from_config(&config.provider)?;
        Ok(Self::new(Arc::new(provider), config.forecast.clone()))
    }

    pub async fn lookup(&self, request: &LookupRequest) -> Result<WeatherReport, LookupError> {
        self.lookup_on(request, Utc::now().date_naive()).await
    }

    /// Same as [`lookup`](Self::lookup) with an explicit "today".
    #[instrument(skip(self, request), fields(city = %request.city, units = %request.units))]
    pub async fn lookup_on(
        &self,
        request: &LookupRequest,
        today: NaiveDate,
    ) -> Result<WeatherReport, LookupError> {
        let city = self
            .provider
            .current_by_name(&request.city)
            .await
            .map_err(|source| match source {
                // A success status with an unreadable body carries no coordinates.
                ProviderError::Decode { .. } => LookupError::NotFound {
                    city: request.city.clone(),
                },
                source => LookupError::Upstream {
                    stage: UpstreamStage::CityLookup,
                    source,
                },
            })?;

        let coords = city.coordinates.ok_or_else(|| LookupError::NotFound {
            city: request.city.clone(),
        })?;
        let location = city.location_label(&request.city);

        let current = match self.provider.current_by_coords(coords, request.units).await {
            Ok(current) => current,
            // Success status, unreadable body: every field is unknown.
            Err(err @ ProviderError::Decode { .. }) => {
                warn!(error = %err, "current conditions unreadable, reporting nulls");
                CurrentConditions::default()
            }
            Err(source) => {
                return Err(LookupError::Upstream {
                    stage: UpstreamStage::WeatherData,
                    source,
                });
            }
        };

        let samples = if self.forecast.enabled {
            match self.provider.forecast_by_coords(coords, request.units).await {
                Ok(samples) => samples,
                Err(err) => {
                    warn!(error = %err, "forecast unavailable, continuing without it");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let mut forecast = aggregate_daily(&samples, today, self.forecast.days);
        if forecast.is_empty() && self.forecast.placeholder_when_empty {
            forecast = placeholder_days(&current, today, self.forecast.days);
        }

        info!(%location, forecast_days = forecast.len(), "lookup complete");

        Ok(WeatherReport {
            location,
            date: today,
            current,
            forecast,
        })
    }
}

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Number;
use std::{fmt, str::FromStr};

use crate::lookup::LookupError;

/// Measurement system forwarded to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Metric,
    Imperial,
}

impl Units {
    pub fn as_str(&self) -> &'static str {
        match self {
            Units::Metric => "metric",
            Units::Imperial => "imperial",
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Units {
    type Err = LookupError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "metric" => Ok(Units::Metric),
            "imperial" => Ok(Units::Imperial),
            _ => Err(LookupError::InvalidUnits(value.to_string())),
        }
    }
}

/// A validated lookup: non-blank city plus unit system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRequest {
    pub city: String,
    pub units: Units,
}

impl LookupRequest {
    /// Validate raw query values. Units default to metric when absent or blank.
    pub fn parse(city: Option<&str>, units: Option<&str>) -> Result<Self, LookupError> {
        let city = city
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(LookupError::MissingCity)?;

        let units = match units.filter(|u| !u.trim().is_empty()) {
            Some(raw) => raw.parse()?,
            None => Units::default(),
        };

        Ok(Self { city: city.to_string(), units })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Result of resolving a city name. Coordinates stay optional so the caller
/// decides what a payload without them means.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CityLookup {
    pub coordinates: Option<Coordinates>,
    pub name: Option<String>,
    pub country: Option<String>,
}

impl CityLookup {
    /// "Name, CC" when a country is known, falling back to `requested` when
    /// the provider did not report a name.
    pub fn location_label(&self, requested: &str) -> String {
        let name = self
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(requested);

        match self.country.as_deref().filter(|c| !c.is_empty()) {
            Some(country) => format!("{name}, {country}"),
            None => name.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Wind {
    pub speed: Option<f64>,
    pub deg: Option<Number>,
}

/// Current conditions. Every field is `null` in JSON when the provider
/// omitted it; numeric readings keep the provider's own representation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    pub icon: Option<String>,
    pub temp: Option<f64>,
    pub feels_like: Option<f64>,
    pub description: Option<String>,
    pub wind: Wind,
    pub humidity: Option<Number>,
    pub visibility: Option<Number>,
    pub pressure: Option<Number>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastDay {
    pub date: NaiveDate,
    pub icon: Option<String>,
    pub temp_min: f64,
    pub temp_max: f64,
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub placeholder: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub location: String,
    pub date: NaiveDate,
    pub current: CurrentConditions,
    pub forecast: Vec<ForecastDay>,
}

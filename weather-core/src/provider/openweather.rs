use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Url};
use serde::{Deserialize, Deserializer, de::DeserializeOwned};
use serde_json::{Number, Value};
use std::time::Duration;
use tracing::{debug, warn};

use crate::{
    config::ProviderConfig,
    forecast::ForecastSample,
    model::{CityLookup, Coordinates, CurrentConditions, Units, Wind},
};

use super::{ProviderError, REDACTED, WeatherProvider};

pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";

const CURRENT_PATH: &str = "/data/2.5/weather";
const FORECAST_PATH: &str = "/data/2.5/forecast";

#[derive(Clone)]
pub struct OpenWeatherProvider {
    api_key: String,
    base_url: String,
    http: Client,
}

impl std::fmt::Debug for OpenWeatherProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenWeatherProvider")
            .field("api_key", &REDACTED)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl OpenWeatherProvider {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: String, base_url: &str) -> Self {
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            http: Client::new(),
        }
    }

    /// Build a provider from configuration, applying the optional client timeout.
    pub fn from_config(config: &ProviderConfig) -> anyhow::Result<Self> {
        let mut builder = Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            api_key: config.api_key.clone().unwrap_or_default(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http: builder.build()?,
        })
    }

    /// URL as shown to callers: same query, credential replaced.
    fn display_url(&self, path: &str, params: &[(&str, String)]) -> String {
        let raw = format!("{}{}", self.base_url, path);
        let base = Url::parse_with_params(&raw, params)
            .map(|u| u.to_string())
            .unwrap_or(raw);
        let sep = if base.contains('?') { '&' } else { '?' };
        format!("{base}{sep}appid={REDACTED}")
    }

    /// Remove every occurrence of the credential from an upstream body.
    fn scrub(&self, body: String) -> String {
        if self.api_key.is_empty() || !body.contains(&self.api_key) {
            return body;
        }
        body.replace(&self.api_key, REDACTED)
    }

    /// Successful status and credential-free body, or the failure.
    async fn fetch(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<(u16, String), ProviderError> {
        let request_url = self.display_url(path, params);
        debug!(url = %request_url, "calling OpenWeather");

        let res = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .query(params)
            .query(&[("appid", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| ProviderError::Transport {
                request_url: request_url.clone(),
                source: e.without_url(),
            })?;

        let status = res.status();
        let body = res.text().await.map_err(|e| ProviderError::Transport {
            request_url: request_url.clone(),
            source: e.without_url(),
        })?;
        let body = self.scrub(body);

        if !status.is_success() {
            warn!(
                url = %request_url,
                status = status.as_u16(),
                body = %truncate_body(&body),
                "OpenWeather request failed"
            );
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
                request_url,
            });
        }

        Ok((status.as_u16(), body))
    }

    fn decode<T: DeserializeOwned>(
        status: u16,
        request_url: String,
        body: String,
    ) -> Result<T, ProviderError> {
        serde_json::from_str(&body).map_err(|source| ProviderError::Decode {
            status,
            request_url,
            body,
            source,
        })
    }

    fn coord_params(coords: Coordinates, units: Units) -> Vec<(&'static str, String)> {
        vec![
            ("lat", coords.latitude.to_string()),
            ("lon", coords.longitude.to_string()),
            ("units", units.as_str().to_string()),
        ]
    }
}

/// Decode a field as `Some` only when it has the expected shape; anything
/// else (including `null`) becomes `None`.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

#[derive(Debug, Deserialize)]
struct OwCoord {
    #[serde(default, deserialize_with = "lenient")]
    lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    lon: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwSys {
    #[serde(default, deserialize_with = "lenient")]
    country: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    #[serde(default, deserialize_with = "lenient")]
    icon: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OwMain {
    #[serde(default, deserialize_with = "lenient")]
    temp: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    feels_like: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    temp_min: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    temp_max: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    humidity: Option<Number>,
    #[serde(default, deserialize_with = "lenient")]
    pressure: Option<Number>,
}

#[derive(Debug, Deserialize)]
struct OwWind {
    #[serde(default, deserialize_with = "lenient")]
    speed: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    deg: Option<Number>,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    #[serde(default, deserialize_with = "lenient")]
    coord: Option<OwCoord>,
    #[serde(default, deserialize_with = "lenient")]
    name: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    sys: Option<OwSys>,
    #[serde(default, deserialize_with = "lenient")]
    weather: Option<Vec<OwWeather>>,
    #[serde(default, deserialize_with = "lenient")]
    main: Option<OwMain>,
    #[serde(default, deserialize_with = "lenient")]
    wind: Option<OwWind>,
    #[serde(default, deserialize_with = "lenient")]
    visibility: Option<Number>,
}

impl OwCurrentResponse {
    fn first_weather(&self) -> Option<&OwWeather> {
        self.weather.as_ref().and_then(|w| w.first())
    }

    fn into_current(self) -> CurrentConditions {
        let (icon, description) = match self.first_weather() {
            Some(w) => (w.icon.clone(), w.description.clone()),
            None => (None, None),
        };
        let main = self.main.as_ref();

        CurrentConditions {
            icon,
            temp: main.and_then(|m| m.temp),
            feels_like: main.and_then(|m| m.feels_like),
            description,
            wind: Wind {
                speed: self.wind.as_ref().and_then(|w| w.speed),
                deg: self.wind.as_ref().and_then(|w| w.deg.clone()),
            },
            humidity: main.and_then(|m| m.humidity.clone()),
            visibility: self.visibility,
            pressure: main.and_then(|m| m.pressure.clone()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OwForecastEntry {
    #[serde(default, deserialize_with = "lenient")]
    dt: Option<i64>,
    #[serde(default, deserialize_with = "lenient")]
    main: Option<OwMain>,
    #[serde(default, deserialize_with = "lenient")]
    weather: Option<Vec<OwWeather>>,
}

impl OwForecastEntry {
    fn into_sample(self) -> Option<ForecastSample> {
        let timestamp = DateTime::<Utc>::from_timestamp(self.dt?, 0)?;
        let main = self.main?;
        let first = self.weather.and_then(|w| w.into_iter().next());

        Some(ForecastSample {
            timestamp,
            temp_min: main.temp_min?,
            temp_max: main.temp_max?,
            icon: first.as_ref().and_then(|w| w.icon.clone()),
            description: first.and_then(|w| w.description),
        })
    }
}

#[derive(Debug, Deserialize)]
struct OwForecastResponse {
    #[serde(default, deserialize_with = "lenient")]
    list: Option<Vec<Value>>,
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    async fn current_by_name(&self, city: &str) -> Result<CityLookup, ProviderError> {
        let params = [("q", city.to_string())];
        let (status, body) = self.fetch(CURRENT_PATH, &params).await?;
        let parsed: OwCurrentResponse =
            Self::decode(status, self.display_url(CURRENT_PATH, &params), body)?;

        let coordinates = parsed.coord.as_ref().and_then(|c| {
            Some(Coordinates {
                latitude: c.lat?,
                longitude: c.lon?,
            })
        });

        Ok(CityLookup {
            coordinates,
            name: parsed.name,
            country: parsed.sys.and_then(|s| s.country),
        })
    }

    async fn current_by_coords(
        &self,
        coords: Coordinates,
        units: Units,
    ) -> Result<CurrentConditions, ProviderError> {
        let params = Self::coord_params(coords, units);
        let (status, body) = self.fetch(CURRENT_PATH, &params).await?;
        let parsed: OwCurrentResponse =
            Self::decode(status, self.display_url(CURRENT_PATH, &params), body)?;

        Ok(parsed.into_current())
    }

    async fn forecast_by_coords(
        &self,
        coords: Coordinates,
        units: Units,
    ) -> Result<Vec<ForecastSample>, ProviderError> {
        let params = Self::coord_params(coords, units);
        let (status, body) = self.fetch(FORECAST_PATH, &params).await?;
        let parsed: OwForecastResponse =
            Self::decode(status, self.display_url(FORECAST_PATH, &params), body)?;

        // Entries are decoded one by one so a malformed sample is dropped
        // instead of discarding the whole list.
        let samples = parsed
            .list
            .unwrap_or_default()
            .into_iter()
            .filter_map(|v| serde_json::from_value::<OwForecastEntry>(v).ok())
            .filter_map(OwForecastEntry::into_sample)
            .collect();

        Ok(samples)
    }
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const KEY: &str = "s3cr3t-key-0123456789";

    fn provider(server: &MockServer) -> OpenWeatherProvider {
        OpenWeatherProvider::with_base_url(KEY.to_string(), &server.uri())
    }

    fn coords() -> Coordinates {
        Coordinates {
            latitude: 51.51,
            longitude: -0.13,
        }
    }

    #[tokio::test]
    async fn resolves_city_with_credential() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .and(query_param("q", "London"))
            .and(query_param("appid", KEY))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "coord": {"lon": -0.13, "lat": 51.51},
                "name": "London",
                "sys": {"country": "GB"}
            })))
            .mount(&server)
            .await;

        let lookup = provider(&server).current_by_name("London").await.unwrap();

        assert_eq!(lookup.coordinates, Some(coords()));
        assert_eq!(lookup.location_label("London"), "London, GB");
    }

    #[tokio::test]
    async fn missing_coordinates_are_not_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"coord": {"lat": 10.0}})),
            )
            .mount(&server)
            .await;

        let lookup = provider(&server).current_by_name("Nowhere").await.unwrap();
        assert_eq!(lookup.coordinates, None);
    }

    #[tokio::test]
    async fn non_success_status_is_redacted() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(json!({"cod": 401, "message": "Invalid API key"})),
            )
            .mount(&server)
            .await;

        let err = provider(&server).current_by_name("Paris").await.unwrap_err();

        assert_eq!(err.status(), Some(401));
        assert_eq!(err.details()["message"], "Invalid API key");
        assert!(!err.request_url().contains(KEY));
        assert!(err.request_url().contains("q=Paris"));
        assert!(err.request_url().ends_with("appid=[hidden]"));
        assert!(!err.to_string().contains(KEY));
    }

    #[tokio::test]
    async fn transport_error_hides_credential() {
        // Nothing listens on port 1.
        let provider = OpenWeatherProvider::with_base_url(KEY.to_string(), "http://127.0.0.1:1");
        let err = provider.current_by_name("Paris").await.unwrap_err();

        assert!(matches!(err, ProviderError::Transport { .. }));
        assert_eq!(err.status(), None);
        assert!(!err.to_string().contains(KEY));
        assert!(!err.details().to_string().contains(KEY));
    }

    #[tokio::test]
    async fn current_fields_pass_through_or_null() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .and(query_param("lat", "51.51"))
            .and(query_param("units", "imperial"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "weather": [{"icon": "04d", "description": "broken clouds"}],
                "main": {"temp": 61.2, "feels_like": "warm", "humidity": 72},
                "wind": {"speed": 9.1},
                "visibility": 10000
            })))
            .mount(&server)
            .await;

        let current = provider(&server)
            .current_by_coords(coords(), Units::Imperial)
            .await
            .unwrap();

        assert_eq!(current.icon.as_deref(), Some("04d"));
        assert_eq!(current.temp, Some(61.2));
        assert_eq!(current.feels_like, None);
        assert_eq!(current.humidity, Some(Number::from(72)));
        assert_eq!(current.wind.speed, Some(9.1));
        assert_eq!(current.wind.deg, None);
        assert_eq!(current.visibility, Some(Number::from(10000)));
        assert_eq!(current.pressure, None);
    }

    #[tokio::test]
    async fn fractional_readings_are_kept() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "main": {"temp": 12.0, "humidity": 72.5, "pressure": 1013.25},
                "wind": {"speed": 3.0, "deg": 240.5},
                "visibility": 9999.9
            })))
            .mount(&server)
            .await;

        let current = provider(&server)
            .current_by_coords(coords(), Units::Metric)
            .await
            .unwrap();

        let value = serde_json::to_value(&current).unwrap();
        assert_eq!(value["humidity"], json!(72.5));
        assert_eq!(value["pressure"], json!(1013.25));
        assert_eq!(value["visibility"], json!(9999.9));
        assert_eq!(value["wind"], json!({"speed": 3.0, "deg": 240.5}));
    }

    #[tokio::test]
    async fn echoed_credential_is_scrubbed_from_body() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .respond_with(ResponseTemplate::new(400).set_body_string(format!(
                "bad request: /data/2.5/weather?q=Paris&appid={KEY}"
            )))
            .mount(&server)
            .await;

        let err = provider(&server).current_by_name("Paris").await.unwrap_err();

        assert_eq!(err.status(), Some(400));
        assert_eq!(
            err.details(),
            json!("bad request: /data/2.5/weather?q=Paris&appid=[hidden]")
        );
        assert!(!format!("{err:?}").contains(KEY));
    }

    #[tokio::test]
    async fn forecast_skips_unusable_entries() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/forecast"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "list": [
                    {
                        "dt": 1714622400,
                        "main": {"temp_min": 11.0, "temp_max": 14.5},
                        "weather": [{"icon": "10d", "description": "light rain"}]
                    },
                    {"dt": 1714633200, "main": {"temp_min": 9.0}},
                    {"main": {"temp_min": 1.0, "temp_max": 2.0}},
                    "garbage",
                    {"dt": 1714644000, "main": {"temp_min": 8.0, "temp_max": 12.0}}
                ]
            })))
            .mount(&server)
            .await;

        let samples = provider(&server)
            .forecast_by_coords(coords(), Units::Metric)
            .await
            .unwrap();

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].timestamp.timestamp(), 1714622400);
        assert_eq!(samples[0].icon.as_deref(), Some("10d"));
        assert_eq!(samples[1].icon, None);
        assert_eq!(samples[1].temp_max, 12.0);
    }

    #[tokio::test]
    async fn non_json_body_is_decode_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/data/2.5/weather"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let err = provider(&server).current_by_name("Paris").await.unwrap_err();
        assert!(matches!(err, ProviderError::Decode { status: 200, .. }));
        assert_eq!(err.details(), json!("<html>oops</html>"));
    }

    #[test]
    fn debug_output_hides_key() {
        let provider = OpenWeatherProvider::new(KEY.to_string());
        assert!(!format!("{provider:?}").contains(KEY));
    }

    #[test]
    fn truncate_body_respects_char_boundaries() {
        let long = "é".repeat(300);
        let truncated = truncate_body(&long);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncated.chars().count(), 203);
        assert_eq!(truncate_body("short"), "short");
    }
}

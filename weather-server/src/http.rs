//! HTTP surface: `/weather`, `/health` and `/env-test`, served both at the
//! root and under `/api`.

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Query, Request, State},
    http::{
        HeaderValue, Method, StatusCode,
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
            ACCESS_CONTROL_ALLOW_ORIGIN,
        },
    },
    middleware::{Next, from_fn, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{Instrument, error, info, info_span, warn};
use weather_core::{
    Config, CredentialFingerprint, LookupError, LookupRequest, WeatherReport, WeatherService,
};

#[derive(Debug, Clone)]
pub struct AppState {
    service: WeatherService,
    fingerprint: CredentialFingerprint,
    cors_allow_origin: HeaderValue,
}

impl AppState {
    pub fn new(
        service: WeatherService,
        fingerprint: CredentialFingerprint,
        cors_allow_origin: HeaderValue,
    ) -> Self {
        Self {
            service,
            fingerprint,
            cors_allow_origin,
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let service = WeatherService::from_config(config)?;
        let origin = HeaderValue::from_str(&config.server.cors_allow_origin)
            .with_context(|| format!("Invalid CORS origin: {}", config.server.cors_allow_origin))?;

        Ok(Self::new(
            service,
            config.provider.credential_fingerprint(),
            origin,
        ))
    }
}

pub fn build_router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/weather", get(weather))
        .route("/health", get(health))
        .route("/env-test", get(env_test));

    Router::new()
        .merge(routes.clone())
        .nest("/api", routes)
        .layer(from_fn_with_state(state.clone(), cors))
        .layer(from_fn(request_tracing))
        .with_state(state)
}

/// Serve until Ctrl-C.
pub async fn serve(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    let app = build_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for shutdown signal");
            }
            info!("shutdown requested");
        })
        .await
        .context("HTTP server failed")
}

#[derive(Debug, Deserialize)]
struct WeatherQuery {
    city: Option<String>,
    units: Option<String>,
}

async fn weather(
    State(state): State<AppState>,
    Query(query): Query<WeatherQuery>,
) -> Result<Json<WeatherReport>, ApiError> {
    let request = LookupRequest::parse(query.city.as_deref(), query.units.as_deref())?;
    let report = state.service.lookup(&request).await?;
    Ok(Json(report))
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn env_test(State(state): State<AppState>) -> Json<CredentialFingerprint> {
    Json(state.fingerprint.clone())
}

/// Status and JSON body for a failed lookup.
pub fn error_payload(err: &LookupError) -> (StatusCode, Value) {
    match err {
        LookupError::MissingCity => (StatusCode::BAD_REQUEST, json!({"error": err.to_string()})),
        LookupError::InvalidUnits(units) => (
            StatusCode::BAD_REQUEST,
            json!({"error": err.to_string(), "units": units}),
        ),
        LookupError::NotFound { city } => (
            StatusCode::NOT_FOUND,
            json!({"error": err.to_string(), "city": city}),
        ),
        LookupError::Upstream { stage, source } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({
                "error": stage.message(),
                "status": source.status(),
                "details": source.details(),
                "request_url": source.request_url(),
            }),
        ),
    }
}

#[derive(Debug)]
struct ApiError(LookupError);

impl From<LookupError> for ApiError {
    fn from(err: LookupError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = error_payload(&self.0);
        if status.is_server_error() {
            let cause = std::error::Error::source(&self.0).map(|e| e.to_string());
            error!(error = %self.0, cause = ?cause, "lookup failed");
        } else {
            warn!(error = %self.0, status = status.as_u16(), "lookup rejected");
        }
        (status, Json(body)).into_response()
    }
}

async fn cors(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };

    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, state.cors_allow_origin.clone());
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Accept, Content-Type"),
    );
    response
}

async fn request_tracing(request: Request, next: Next) -> Response {
    let span = info_span!(
        "http.request",
        method = %request.method(),
        route = %request.uri().path(),
    );
    let started = Instant::now();

    let response = next.run(request).instrument(span.clone()).await;

    span.in_scope(|| {
        info!(
            status = response.status().as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request finished"
        );
    });
    response
}

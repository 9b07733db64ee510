use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use base64::Engine;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::{
    cache::TtlCache,
    config::Config,
    metrics::{Metrics, MetricsSnapshot},
    resolver::{forecast_key, normalize_zip, pollen_key, CachedResolver, Resource},
    upstream::{
        normalize::PollenNormalizer,
        types::{ForecastRecord, PollenReport},
        ForecastProvider, PollenProvider, UpstreamError,
    },
};

// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub forecast_client: Arc<dyn ForecastProvider>,
    pub pollen_client: Arc<dyn PollenProvider>,
    pub pollen_normalizer: Arc<dyn PollenNormalizer>,
    pub forecasts: Arc<CachedResolver<ForecastRecord>>,
    pub pollen: Arc<CachedResolver<PollenReport>>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        forecast_client: Arc<dyn ForecastProvider>,
        pollen_client: Arc<dyn PollenProvider>,
    ) -> Self {
        let metrics = Arc::new(Metrics::new());

        let forecasts = CachedResolver::new(
            Resource::Forecast,
            TtlCache::new(config.cache_ttl),
            metrics.counters(Resource::Forecast),
            config.upstream_timeout,
        );
        let pollen = CachedResolver::new(
            Resource::Pollen,
            TtlCache::new(config.cache_ttl),
            metrics.counters(Resource::Pollen),
            config.upstream_timeout,
        );

        Self {
            pollen_normalizer: Arc::from(config.pollen_format.normalizer()),
            config,
            forecast_client,
            pollen_client,
            forecasts: Arc::new(forecasts),
            pollen: Arc::new(pollen),
            metrics,
        }
    }

    /// Start the purge sweep of every cache. The handles are aborted at shutdown.
    pub fn spawn_purgers(&self) -> Vec<JoinHandle<()>> {
        vec![
            self.forecasts.spawn_purger(self.config.purge_interval),
            self.pollen.spawn_purger(self.config.purge_interval),
        ]
    }

    fn cache_entries(&self, resource: Resource) -> usize {
        match resource {
            Resource::Forecast => self.forecasts.cache().len(),
            Resource::Pollen => self.pollen.cache().len(),
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error("expected coordinates as {{lat}},{{long}}, got {0:?}")]
    BadCoordinates(String),
    #[error("Unauthorized")]
    Unauthorized,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::Upstream(err) => {
                tracing::error!(parse_error = err.is_parse(), "Upstream request failed: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
            }
            AppError::BadCoordinates(_) => (StatusCode::BAD_REQUEST, self.to_string()).into_response(),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, "Basic realm=\"debug\"")],
                self.to_string(),
            )
                .into_response(),
        }
    }
}

impl IntoResponse for PollenReport {
    fn into_response(self) -> Response {
        match self {
            PollenReport::Normalized(info) => Json(info).into_response(),
            PollenReport::Passthrough(text) => {
                ([(header::CONTENT_TYPE, "application/json")], text).into_response()
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
}

// Route handlers
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

pub async fn get_forecast(
    State(state): State<AppState>,
    Path(coords): Path<String>,
) -> Result<Json<ForecastRecord>, AppError> {
    let (lat, lon) = split_coordinates(&coords).ok_or_else(|| AppError::BadCoordinates(coords.clone()))?;
    let key = forecast_key(lat, lon);

    let client = &state.forecast_client;
    let record = state
        .forecasts
        .resolve(&key, move || async move { client.forecast(lat, lon).await })
        .await?;

    Ok(Json(record))
}

pub async fn get_pollen(
    State(state): State<AppState>,
    Path(zip): Path<String>,
) -> Result<PollenReport, AppError> {
    let zip = normalize_zip(&zip);
    let key = pollen_key(&zip);

    let client = &state.pollen_client;
    let normalizer = &state.pollen_normalizer;
    let zip = zip.as_str();
    let report = state
        .pollen
        .resolve(&key, move || async move {
            let body = client.pollen(zip).await?;
            normalizer.normalize(&body)
        })
        .await?;

    Ok(report)
}

pub async fn debug_vars(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<MetricsSnapshot>, AppError> {
    if let Some((user, password)) = state.config.debug_credentials() {
        if !basic_auth_matches(&headers, user, password) {
            tracing::warn!("Rejected /debug/vars request with missing or wrong credentials");
            return Err(AppError::Unauthorized);
        }
    }

    Ok(Json(state.metrics.snapshot(|resource| state.cache_entries(resource))))
}

/// Split `"{lat},{long}"`. Values are not validated beyond being present;
/// the provider gets them as they came in.
fn split_coordinates(coords: &str) -> Option<(&str, &str)> {
    let (lat, lon) = coords.split_once(',')?;
    let (lat, lon) = (lat.trim(), lon.trim());
    if lat.is_empty() || lon.is_empty() {
        return None;
    }
    Some((lat, lon))
}

fn basic_auth_matches(headers: &HeaderMap, user: &str, password: &str) -> bool {
    let Some(encoded) = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Basic "))
    else {
        return false;
    };

    let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(encoded.trim()) else {
        return false;
    };

    match std::str::from_utf8(&decoded).ok().and_then(|pair| pair.split_once(':')) {
        Some((given_user, given_password)) => given_user == user && given_password == password,
        None => false,
    }
}

/// `*` mirrors the caller's origin, which is what allows credentials to be
/// combined with "any origin".
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|origin| origin == "*") {
        AllowOrigin::mirror_request()
    } else {
        AllowOrigin::list(origins.iter().filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        }))
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::HEAD, Method::POST])
        .allow_credentials(true)
}

// Create the router
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.allowed_origins);

    Router::new()
        .route("/health", get(health))
        .route("/forecast/:coords", get(get_forecast))
        .route("/pollen/:zip", get(get_pollen))
        .route("/debug/vars", get(debug_vars))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

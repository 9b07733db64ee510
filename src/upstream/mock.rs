use super::normalize::PollenFormat;
use super::types::{ForecastRecord, PollenEntry};
use super::{ForecastProvider, PollenProvider, UpstreamError};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

enum Canned<T> {
    Generated,
    Fixed(T),
    Fail(String),
}

/// In-process stand-in for the forecast provider. Counts every call.
pub struct MockForecastProvider {
    response: Canned<ForecastRecord>,
    delay: Duration,
    calls: AtomicUsize,
}

impl Default for MockForecastProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockForecastProvider {
    /// Generates a plausible 48-hour forecast for whatever location is asked.
    pub fn new() -> Self {
        Self::with(Canned::Generated)
    }

    pub fn fixed(record: ForecastRecord) -> Self {
        Self::with(Canned::Fixed(record))
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self::with(Canned::Fail(message.into()))
    }

    fn with(response: Canned<ForecastRecord>) -> Self {
        Self {
            response,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ForecastProvider for MockForecastProvider {
    async fn forecast(&self, lat: &str, lon: &str) -> Result<ForecastRecord, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match &self.response {
            Canned::Fixed(record) => Ok(record.clone()),
            Canned::Fail(message) => Err(UpstreamError::ApiError(message.clone())),
            Canned::Generated => {
                let (Ok(lat), Ok(lon)) = (lat.parse::<f64>(), lon.parse::<f64>()) else {
                    return Err(UpstreamError::ApiError(
                        "HTTP 400 Bad Request: The given location is invalid.".to_string(),
                    ));
                };
                Ok(generate_forecast(lat, lon))
            }
        }
    }
}

fn generate_forecast(lat: f64, lon: f64) -> ForecastRecord {
    let now = Utc::now();

    let hourly: Vec<Value> = (0..48)
        .map(|hour| {
            let temperature = 68.0 + 9.0 * (hour as f64 * 0.26).sin(); // Diurnal swing
            let humidity = (0.6 + 0.2 * (hour as f64 * 0.13).cos()).clamp(0.3, 0.9);
            let precip_probability = if hour % 8 == 0 { 0.3 } else { 0.05 };
            let summary = if precip_probability > 0.2 { "Light Rain" } else { "Partly Cloudy" };

            json!({
                "time": (now + ChronoDuration::hours(hour)).timestamp(),
                "summary": summary,
                "temperature": temperature,
                "humidity": humidity,
                "windSpeed": 2.0 + 6.0 * fastrand::f64(),
                "cloudCover": 0.2 + 0.5 * fastrand::f64(),
                "precipProbability": precip_probability,
            })
        })
        .collect();

    let currently = hourly.first().cloned().unwrap_or(Value::Null);

    ForecastRecord(json!({
        "latitude": lat,
        "longitude": lon,
        "timezone": "UTC",
        "offset": 0,
        "currently": currently,
        "hourly": {
            "summary": "Mock forecast",
            "data": hourly,
        },
    }))
}

/// In-process stand-in for the pollen provider. Counts every call.
pub struct MockPollenProvider {
    response: Canned<Vec<u8>>,
    format: PollenFormat,
    calls: AtomicUsize,
}

impl MockPollenProvider {
    /// Generates a body in the shape `format` expects.
    pub fn new(format: PollenFormat) -> Self {
        Self {
            response: Canned::Generated,
            format,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_body(body: impl Into<Vec<u8>>) -> Self {
        Self {
            response: Canned::Fixed(body.into()),
            format: PollenFormat::default(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            response: Canned::Fail(message.into()),
            format: PollenFormat::default(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PollenProvider for MockPollenProvider {
    async fn pollen(&self, zip: &str) -> Result<Vec<u8>, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        match &self.response {
            Canned::Fixed(body) => Ok(body.clone()),
            Canned::Fail(message) => Err(UpstreamError::ApiError(message.clone())),
            Canned::Generated => generate_pollen_body(zip, self.format),
        }
    }
}

fn generate_pollen_body(zip: &str, format: PollenFormat) -> Result<Vec<u8>, UpstreamError> {
    let base = 2.0 + 8.0 * fastrand::f64();
    let entry = PollenEntry {
        city: format!("Mock City {}", zip),
        state: "GA".to_string(),
        predominant_pollen: "Tree".to_string(),
        today: base,
        tomorrow: (base + 0.8).min(12.0),
        two_days: (base + 1.1).min(12.0),
        three_days: (base - 0.4).max(0.0),
    };

    match format {
        PollenFormat::Structured => Ok(serde_json::to_vec(&json!({ "results": [entry] }))?),
        PollenFormat::Raw => {
            // The raw provider ships its document as a quoted, escaped string
            let document = serde_json::to_string(&entry)?;
            Ok(serde_json::to_vec(&document)?)
        }
    }
}

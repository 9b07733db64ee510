pub mod darksky;
pub mod mock;
pub mod normalize;
pub mod pollen;
pub mod types;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use types::ForecastRecord;

#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("API error: {0}")]
    ApiError(String),
    #[error("Upstream call timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("JSON parsing failed: {0}")]
    JsonParsing(#[from] serde_json::Error),
    #[error("Malformed response: {0}")]
    Malformed(String),
    #[error("No pollen data returned for the requested location")]
    NoData,
}

impl UpstreamError {
    /// True when the provider answered but the body could not be used;
    /// false for transport, status and deadline failures.
    pub fn is_parse(&self) -> bool {
        matches!(
            self,
            UpstreamError::JsonParsing(_) | UpstreamError::Malformed(_) | UpstreamError::NoData
        )
    }
}

#[async_trait]
pub trait ForecastProvider: Send + Sync {
    async fn forecast(&self, lat: &str, lon: &str) -> Result<ForecastRecord, UpstreamError>;
}

/// Returns the provider's body untouched; shaping it is the normalizer's job.
#[async_trait]
pub trait PollenProvider: Send + Sync {
    async fn pollen(&self, zip: &str) -> Result<Vec<u8>, UpstreamError>;
}

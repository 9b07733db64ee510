use super::{PollenProvider, UpstreamError};
use crate::config::Config;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, REFERER};
use reqwest::Client;

/// Pollen forecast API: `GET {base}/{zip}`, body returned as-is.
pub struct PollenApiClient {
    client: Client,
    base_url: String,
}

impl PollenApiClient {
    pub fn new(config: &Config) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .user_agent(concat!("weather-pollen-proxy/", env!("CARGO_PKG_VERSION")))
            .timeout(config.upstream_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.pollen_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn pollen_url(&self, zip: &str) -> String {
        format!("{}/{}", self.base_url, urlencoding::encode(zip))
    }
}

#[async_trait]
impl PollenProvider for PollenApiClient {
    async fn pollen(&self, zip: &str) -> Result<Vec<u8>, UpstreamError> {
        let url = self.pollen_url(zip);
        tracing::debug!(zip, "Fetching pollen forecast from upstream");

        // Some pollen services refuse requests without a referer
        let response = self
            .client
            .get(&url)
            .header(ACCEPT, "application/json")
            .header(REFERER, &self.base_url)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(UpstreamError::ApiError(format!("HTTP {}: {}", status, error_text)));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

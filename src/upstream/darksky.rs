use super::types::ForecastRecord;
use super::{ForecastProvider, UpstreamError};
use crate::config::Config;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

/// Timeframe value that asks for the current forecast (no time segment).
const TIMEFRAME_NOW: &str = "now";

/// Dark Sky style forecast API: `{base}/{key}/{lat},{lon}[,{time}]?units=`.
pub struct DarkSkyClient {
    client: Client,
    base_url: String,
    api_key: String,
    units: String,
    timeframe: String,
}

impl DarkSkyClient {
    pub fn new(config: &Config) -> Result<Self, UpstreamError> {
        let client = Client::builder()
            .user_agent(concat!("weather-pollen-proxy/", env!("CARGO_PKG_VERSION")))
            .timeout(config.upstream_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: config.forecast_base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            units: config.units.clone(),
            timeframe: config.timeframe.clone(),
        })
    }

    fn forecast_url(&self, lat: &str, lon: &str) -> String {
        let mut url = format!(
            "{}/{}/{},{}",
            self.base_url,
            urlencoding::encode(&self.api_key),
            urlencoding::encode(lat),
            urlencoding::encode(lon)
        );
        if self.timeframe != TIMEFRAME_NOW {
            url.push(',');
            url.push_str(&urlencoding::encode(&self.timeframe));
        }
        url
    }
}

#[async_trait]
impl ForecastProvider for DarkSkyClient {
    async fn forecast(&self, lat: &str, lon: &str) -> Result<ForecastRecord, UpstreamError> {
        let url = self.forecast_url(lat, lon);
        tracing::debug!(lat, lon, units = %self.units, "Fetching forecast from upstream");

        let response = self
            .client
            .get(&url)
            .query(&[("units", self.units.as_str())])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(UpstreamError::ApiError(format!("HTTP {}: {}", status, error_text)));
        }

        let body = response.bytes().await?;
        let record: Value = serde_json::from_slice(&body)?;
        Ok(ForecastRecord(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_with(timeframe: &str) -> DarkSkyClient {
        let config = Config {
            forecast_base_url: "https://forecast.example.com/forecast/".to_string(),
            api_key: "secret".to_string(),
            timeframe: timeframe.to_string(),
            ..Config::default()
        };
        DarkSkyClient::new(&config).unwrap()
    }

    #[test]
    fn test_forecast_url_for_now() {
        let client = client_with("now");
        assert_eq!(
            client.forecast_url("33.7", "-84.4"),
            "https://forecast.example.com/forecast/secret/33.7,-84.4"
        );
    }

    #[test]
    fn test_forecast_url_with_time_machine_request() {
        let client = client_with("1700000000");
        assert_eq!(
            client.forecast_url("33.7", "-84.4"),
            "https://forecast.example.com/forecast/secret/33.7,-84.4,1700000000"
        );
    }

    #[test]
    fn test_path_segments_are_encoded() {
        let client = client_with("now");
        assert_eq!(
            client.forecast_url("33.7/x", "-84.4"),
            "https://forecast.example.com/forecast/secret/33.7%2Fx,-84.4"
        );
    }
}

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Forecast provider response, kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ForecastRecord(pub Value);

/// Flattened pollen forecast for one location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PollenInfo {
    pub city: String,
    pub state: String,
    pub predominant_pollen: String,
    /// Today, tomorrow, +2 days, +3 days.
    pub pollen_count: [f64; 4],
}

/// What the pollen cache stores: a normalized record, or JSON text forwarded
/// as-is by the raw-text normalizer.
#[derive(Debug, Clone, PartialEq)]
pub enum PollenReport {
    Normalized(PollenInfo),
    Passthrough(String),
}

/// Envelope of the structured pollen provider.
#[derive(Debug, Clone, Deserialize)]
pub struct PollenEnvelope {
    pub results: Vec<PollenEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollenEntry {
    pub city: String,
    pub state: String,
    pub predominant_pollen: String,
    pub today: f64,
    pub tomorrow: f64,
    pub two_days: f64,
    pub three_days: f64,
}

impl From<PollenEntry> for PollenInfo {
    fn from(entry: PollenEntry) -> Self {
        Self {
            city: entry.city,
            state: entry.state,
            predominant_pollen: entry.predominant_pollen,
            pollen_count: [entry.today, entry.tomorrow, entry.two_days, entry.three_days],
        }
    }
}

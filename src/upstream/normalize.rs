//! Pollen provider payload normalization.
//!
//! Providers disagree on shape: one answers with a structured JSON envelope,
//! the other with a JSON document wrapped in an extra pair of delimiters and
//! escaped quotes. Both are handled behind [`PollenNormalizer`] so the
//! request handler never cares which one is configured.

use super::types::{PollenEnvelope, PollenInfo, PollenReport};
use super::UpstreamError;
use serde::de::IgnoredAny;
use std::fmt;
use std::str::FromStr;

pub trait PollenNormalizer: Send + Sync {
    fn normalize(&self, body: &[u8]) -> Result<PollenReport, UpstreamError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PollenFormat {
    #[default]
    Structured,
    Raw,
}

impl PollenFormat {
    pub fn normalizer(self) -> Box<dyn PollenNormalizer> {
        match self {
            PollenFormat::Structured => Box::new(StructuredNormalizer),
            PollenFormat::Raw => Box::new(RawTextNormalizer),
        }
    }
}

impl FromStr for PollenFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "structured" => Ok(PollenFormat::Structured),
            "raw" => Ok(PollenFormat::Raw),
            other => Err(format!("unknown pollen format '{}', expected 'structured' or 'raw'", other)),
        }
    }
}

impl fmt::Display for PollenFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollenFormat::Structured => f.write_str("structured"),
            PollenFormat::Raw => f.write_str("raw"),
        }
    }
}

/// Takes the first entry of `{"results": [...]}`.
pub struct StructuredNormalizer;

impl PollenNormalizer for StructuredNormalizer {
    fn normalize(&self, body: &[u8]) -> Result<PollenReport, UpstreamError> {
        let envelope: PollenEnvelope = serde_json::from_slice(body)?;
        let entry = envelope
            .results
            .into_iter()
            .next()
            .ok_or(UpstreamError::NoData)?;

        Ok(PollenReport::Normalized(PollenInfo::from(entry)))
    }
}

/// Strips the outer delimiter pair and unescapes `\"`. The result has to be
/// valid JSON, otherwise the response is rejected instead of forwarded.
pub struct RawTextNormalizer;

impl PollenNormalizer for RawTextNormalizer {
    fn normalize(&self, body: &[u8]) -> Result<PollenReport, UpstreamError> {
        let text = std::str::from_utf8(body)
            .map_err(|e| UpstreamError::Malformed(format!("pollen body is not UTF-8: {}", e)))?;

        let mut chars = text.chars();
        if chars.next().is_none() || chars.next_back().is_none() {
            return Err(UpstreamError::Malformed(format!(
                "pollen body too short to strip delimiters: {:?}",
                text
            )));
        }

        let unescaped = chars.as_str().replace("\\\"", "\"");
        serde_json::from_str::<IgnoredAny>(&unescaped)?;

        Ok(PollenReport::Passthrough(unescaped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_takes_first_entry() {
        let body = br#"{"results":[
            {"city":"Atlanta","state":"GA","predominantPollen":"Tree",
             "today":1.0,"tomorrow":2.0,"twoDays":3.0,"threeDays":4.0},
            {"city":"Macon","state":"GA","predominantPollen":"Grass",
             "today":9.0,"tomorrow":9.0,"twoDays":9.0,"threeDays":9.0}
        ]}"#;

        let report = StructuredNormalizer.normalize(body).unwrap();
        let PollenReport::Normalized(info) = report else {
            panic!("expected a normalized report");
        };

        assert_eq!(info.city, "Atlanta");
        assert_eq!(info.pollen_count, [1.0, 2.0, 3.0, 4.0]);

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "City": "Atlanta",
                "State": "GA",
                "PredominantPollen": "Tree",
                "PollenCount": [1.0, 2.0, 3.0, 4.0]
            })
        );
    }

    #[test]
    fn test_structured_empty_results_is_no_data() {
        let err = StructuredNormalizer.normalize(br#"{"results":[]}"#).unwrap_err();
        assert!(matches!(err, UpstreamError::NoData));
        assert!(err.is_parse());
    }

    #[test]
    fn test_structured_malformed_envelope() {
        let err = StructuredNormalizer.normalize(br#"{"location":"30022"}"#).unwrap_err();
        assert!(matches!(err, UpstreamError::JsonParsing(_)));

        let err = StructuredNormalizer.normalize(b"<html>").unwrap_err();
        assert!(matches!(err, UpstreamError::JsonParsing(_)));
    }

    #[test]
    fn test_raw_strips_delimiters_and_unescapes() {
        let report = RawTextNormalizer.normalize(br#""{\"a\":1}""#).unwrap();
        assert_eq!(report, PollenReport::Passthrough(r#"{"a":1}"#.to_string()));
    }

    #[test]
    fn test_raw_rejects_text_that_is_not_json_after_stripping() {
        let err = RawTextNormalizer.normalize(b"{\"a\":1}").unwrap_err();
        assert!(err.is_parse());

        let err = RawTextNormalizer.normalize(b"x").unwrap_err();
        assert!(matches!(err, UpstreamError::Malformed(_)));

        let err = RawTextNormalizer.normalize(&[0xff, 0xfe, 0xfd]).unwrap_err();
        assert!(matches!(err, UpstreamError::Malformed(_)));
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("structured".parse::<PollenFormat>(), Ok(PollenFormat::Structured));
        assert_eq!(" RAW ".parse::<PollenFormat>(), Ok(PollenFormat::Raw));
        assert!("xml".parse::<PollenFormat>().is_err());
        assert_eq!(PollenFormat::Raw.to_string(), "raw");
    }
}

use clap::Parser;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::upstream::normalize::PollenFormat;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {name}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Command-line flags. Every flag has an environment variable counterpart
/// that wins when both are present.
#[derive(Parser, Debug, Clone)]
#[command(name = "weather-pollen-proxy", version, about = "Caching proxy for forecast and pollen APIs")]
pub struct Args {
    /// The port to listen on
    #[arg(long, default_value_t = 3000)]
    pub port: u16,

    /// Forecast provider API key
    #[arg(long = "apikey", default_value = "ReplaceWithYourKey")]
    pub api_key: String,

    /// Comma-separated list of allowed CORS origins
    #[arg(long, default_value = "*")]
    pub allowed_origins: String,

    /// Username guarding /debug/vars
    #[arg(long)]
    pub debug_user: Option<String>,

    /// Password guarding /debug/vars
    #[arg(long)]
    pub debug_password: Option<String>,

    #[arg(long, default_value = "https://api.darksky.net/forecast")]
    pub forecast_base_url: String,

    /// Forecast units passed to the provider
    #[arg(long, default_value = "auto")]
    pub units: String,

    /// "now" or a unix timestamp
    #[arg(long, default_value = "now")]
    pub timeframe: String,

    #[arg(long, default_value = "https://www.pollen.com/api/forecast/current/pollen")]
    pub pollen_base_url: String,

    /// "structured" or "raw"
    #[arg(long, default_value = "structured")]
    pub pollen_format: String,

    #[arg(long, default_value_t = 300)]
    pub cache_ttl_secs: u64,

    #[arg(long, default_value_t = 30)]
    pub purge_interval_secs: u64,

    #[arg(long, default_value_t = 10)]
    pub upstream_timeout_secs: u64,

    /// Serve generated data instead of calling the real providers
    #[arg(long)]
    pub mock_upstream: bool,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub api_key: String,
    pub allowed_origins: Vec<String>,
    pub debug_user: Option<String>,
    pub debug_password: Option<String>,
    pub forecast_base_url: String,
    pub units: String,
    pub timeframe: String,
    pub pollen_base_url: String,
    pub pollen_format: PollenFormat,
    pub cache_ttl: Duration,
    pub purge_interval: Duration,
    pub upstream_timeout: Duration,
    pub mock_upstream: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: 3000,
            api_key: "ReplaceWithYourKey".to_string(),
            allowed_origins: vec!["*".to_string()],
            debug_user: None,
            debug_password: None,
            forecast_base_url: "https://api.darksky.net/forecast".to_string(),
            units: "auto".to_string(),
            timeframe: "now".to_string(),
            pollen_base_url: "https://www.pollen.com/api/forecast/current/pollen".to_string(),
            pollen_format: PollenFormat::Structured,
            cache_ttl: Duration::from_secs(5 * 60),
            purge_interval: Duration::from_secs(30),
            upstream_timeout: Duration::from_secs(10),
            mock_upstream: false,
        }
    }
}

impl Config {
    /// Parse flags from the process arguments, then apply the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::resolve(Args::parse(), |name| env::var(name).ok())
    }

    pub fn resolve(args: Args, env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let string = |name: &str, flag: String| env(name).unwrap_or(flag);
        let optional = |name: &str, flag: Option<String>| env(name).or(flag).filter(|v| !v.is_empty());

        let port = parse_env(&env, "PORT", args.port)?;
        let allowed_origins = split_origins(&string("ALLOWED_ORIGINS", args.allowed_origins));
        let pollen_format = parse_value("POLLEN_FORMAT", string("POLLEN_FORMAT", args.pollen_format))?;
        let cache_ttl = seconds("CACHE_TTL_SECS", parse_env(&env, "CACHE_TTL_SECS", args.cache_ttl_secs)?)?;
        let purge_interval = seconds(
            "CACHE_PURGE_INTERVAL_SECS",
            parse_env(&env, "CACHE_PURGE_INTERVAL_SECS", args.purge_interval_secs)?,
        )?;
        let upstream_timeout = seconds(
            "UPSTREAM_TIMEOUT_SECS",
            parse_env(&env, "UPSTREAM_TIMEOUT_SECS", args.upstream_timeout_secs)?,
        )?;
        let mock_upstream = match env("MOCK_UPSTREAM") {
            Some(value) => parse_bool("MOCK_UPSTREAM", &value)?,
            None => args.mock_upstream,
        };

        Ok(Config {
            port,
            api_key: string("FORECAST_API_KEY", args.api_key),
            allowed_origins,
            debug_user: optional("DEBUG_USER", args.debug_user),
            debug_password: optional("DEBUG_PASSWORD", args.debug_password),
            forecast_base_url: string("FORECAST_BASE_URL", args.forecast_base_url),
            units: string("FORECAST_UNITS", args.units),
            timeframe: string("FORECAST_TIMEFRAME", args.timeframe),
            pollen_base_url: string("POLLEN_BASE_URL", args.pollen_base_url),
            pollen_format,
            cache_ttl,
            purge_interval,
            upstream_timeout,
            mock_upstream,
        })
    }

    /// Basic auth credentials for `/debug/vars`, when both halves are set.
    pub fn debug_credentials(&self) -> Option<(&str, &str)> {
        match (&self.debug_user, &self.debug_password) {
            (Some(user), Some(password)) => Some((user.as_str(), password.as_str())),
            _ => None,
        }
    }
}

fn parse_env<T>(env: &impl Fn(&str) -> Option<String>, name: &'static str, flag: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env(name) {
        Some(value) => parse_value(name, value),
        None => Ok(flag),
    }
}

fn parse_value<T>(name: &'static str, value: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let parsed = value.trim().parse::<T>();
    parsed.map_err(|e| ConfigError::Invalid {
        name,
        reason: e.to_string(),
        value,
    })
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}

fn seconds(name: &'static str, secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::Invalid {
            name,
            value: secs.to_string(),
            reason: "must be at least one second".to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["weather-pollen-proxy"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::resolve(args(&[]), env_of(&[])).unwrap();

        assert_eq!(config.port, 3000);
        assert_eq!(config.api_key, "ReplaceWithYourKey");
        assert_eq!(config.allowed_origins, vec!["*"]);
        assert_eq!(config.pollen_format, PollenFormat::Structured);
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
        assert_eq!(config.purge_interval, Duration::from_secs(30));
        assert!(config.debug_credentials().is_none());
        assert!(!config.mock_upstream);
    }

    #[test]
    fn test_flags_are_used_without_env() {
        let config = Config::resolve(
            args(&["--port", "8080", "--apikey", "k", "--allowed-origins", "https://a.example, https://b.example"]),
            env_of(&[]),
        )
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.api_key, "k");
        assert_eq!(config.allowed_origins, vec!["https://a.example", "https://b.example"]);
    }

    #[test]
    fn test_env_takes_precedence_over_flags() {
        let config = Config::resolve(
            args(&["--port", "8080", "--apikey", "from-flag", "--pollen-format", "structured"]),
            env_of(&[
                ("PORT", "9090"),
                ("FORECAST_API_KEY", "from-env"),
                ("POLLEN_FORMAT", "raw"),
                ("DEBUG_USER", "ops"),
                ("DEBUG_PASSWORD", "hunter2"),
                ("MOCK_UPSTREAM", "true"),
            ]),
        )
        .unwrap();

        assert_eq!(config.port, 9090);
        assert_eq!(config.api_key, "from-env");
        assert_eq!(config.pollen_format, PollenFormat::Raw);
        assert_eq!(config.debug_credentials(), Some(("ops", "hunter2")));
        assert!(config.mock_upstream);
    }

    #[test]
    fn test_non_numeric_port_is_rejected() {
        let err = Config::resolve(args(&[]), env_of(&[("PORT", "eighty")])).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn test_zero_durations_and_unknown_format_are_rejected() {
        assert!(Config::resolve(args(&[]), env_of(&[("CACHE_TTL_SECS", "0")])).is_err());
        assert!(Config::resolve(args(&[]), env_of(&[("UPSTREAM_TIMEOUT_SECS", "-1")])).is_err());
        assert!(Config::resolve(args(&[]), env_of(&[("POLLEN_FORMAT", "xml")])).is_err());
        assert!(Config::resolve(args(&[]), env_of(&[("MOCK_UPSTREAM", "maybe")])).is_err());
    }

    #[test]
    fn test_half_configured_debug_credentials_disable_gate() {
        let config = Config::resolve(args(&["--debug-user", "ops"]), env_of(&[])).unwrap();
        assert!(config.debug_credentials().is_none());
    }
}

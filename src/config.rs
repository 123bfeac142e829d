use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Allowed CORS origins. Required unless cors_permissive is true.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Explicitly allow all origins (development only). Defaults to false.
    #[serde(default)]
    pub cors_permissive: bool,
    /// Static GTFS timetable configuration
    #[serde(default)]
    pub timetable: TimetableConfig,
    /// Real-time prediction feed configuration
    #[serde(default)]
    pub realtime: RealtimeConfig,
}

/// Configuration for the static GTFS timetable
#[derive(Debug, Clone, Deserialize)]
pub struct TimetableConfig {
    /// Path to the GTFS zip file (default: "data/gtfs.zip").
    /// The file may legitimately be absent; the service then runs
    /// realtime-only.
    #[serde(default = "TimetableConfig::default_gtfs_path")]
    pub gtfs_path: String,
    /// IANA timezone the timetable's clock times are expressed in
    /// (default: "America/New_York")
    #[serde(default = "TimetableConfig::default_timezone")]
    pub timezone: String,
    /// Display window in minutes: only arrivals within [now, now + window]
    /// are returned (default: 120)
    #[serde(default = "TimetableConfig::default_window_minutes")]
    pub window_minutes: i64,
}

impl Default for TimetableConfig {
    fn default() -> Self {
        Self {
            gtfs_path: Self::default_gtfs_path(),
            timezone: Self::default_timezone(),
            window_minutes: Self::default_window_minutes(),
        }
    }
}

impl TimetableConfig {
    fn default_gtfs_path() -> String {
        "data/gtfs.zip".to_string()
    }
    fn default_timezone() -> String {
        "America/New_York".to_string()
    }
    fn default_window_minutes() -> i64 {
        120
    }

    /// Parse the configured timezone, falling back to UTC with a warning.
    pub fn parsed_timezone(&self) -> chrono_tz::Tz {
        self.timezone.parse().unwrap_or_else(|_| {
            tracing::warn!(timezone = %self.timezone, "Unknown timezone in config, falling back to UTC");
            chrono_tz::UTC
        })
    }
}

/// Configuration for the real-time prediction API
#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    /// Base URL of the BusTime-style prediction API
    #[serde(default = "RealtimeConfig::default_base_url")]
    pub base_url: String,
    /// API key for the prediction feed. Falls back to the BUSTIME_API_KEY
    /// environment variable when not set here.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Hard timeout for a single prediction request in seconds (default: 5)
    #[serde(default = "RealtimeConfig::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            api_key: None,
            timeout_secs: Self::default_timeout_secs(),
        }
    }
}

impl RealtimeConfig {
    fn default_base_url() -> String {
        "https://truetime.portauthority.org/bustime/api/v3".to_string()
    }
    fn default_timeout_secs() -> u64 {
        5
    }

    /// Resolve the API key from config or the BUSTIME_API_KEY env var.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("BUSTIME_API_KEY").ok().filter(|k| !k.is_empty()))
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;

        serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse config: {0}")]
    ParseError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_sections() {
        let config: Config = serde_yaml::from_str("cors_permissive: true").unwrap();
        assert!(config.cors_permissive);
        assert_eq!(config.timetable.window_minutes, 120);
        assert_eq!(config.realtime.timeout_secs, 5);
        assert!(config.realtime.api_key.is_none());
    }

    #[test]
    fn parsed_timezone_falls_back_to_utc() {
        let tt = TimetableConfig {
            timezone: "Not/AZone".into(),
            ..Default::default()
        };
        assert_eq!(tt.parsed_timezone(), chrono_tz::UTC);

        let tt = TimetableConfig {
            timezone: "America/New_York".into(),
            ..Default::default()
        };
        assert_eq!(tt.parsed_timezone(), chrono_tz::America::New_York);
    }

    #[test]
    fn empty_api_key_counts_as_missing() {
        let rt = RealtimeConfig {
            api_key: Some(String::new()),
            ..Default::default()
        };
        // env fallback may or may not be set in the test environment; only
        // assert that the empty string itself is rejected
        if std::env::var("BUSTIME_API_KEY").is_err() {
            assert!(rt.resolved_api_key().is_none());
        }
    }
}

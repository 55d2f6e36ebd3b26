use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// TCP port for the HTTP+WS listener. The PORT env var overrides this.
    #[serde(default = "Config::default_port")]
    pub port: u16,
    /// Path of the SQLite catalog database.
    #[serde(default = "Config::default_database_path")]
    pub database_path: String,
    /// Allowed CORS origins. Required unless cors_permissive is true.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Explicitly allow all origins (development only). Defaults to false.
    #[serde(default)]
    pub cors_permissive: bool,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;

        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    fn default_port() -> u16 {
        3000
    }
    fn default_database_path() -> String {
        "database/transit.db".to_string()
    }
}

/// Tuning for the per-bus telemetry pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackingConfig {
    /// Samples retained per bus (default: 5)
    #[serde(default = "TrackingConfig::default_history_size")]
    pub history_size: usize,
    /// Minimum history length before direction matching runs (default: 3)
    #[serde(default = "TrackingConfig::default_min_signals_for_direction")]
    pub min_signals_for_direction: usize,
    /// Segments shorter than this are GPS noise and carry no bearing (default: 1.0)
    #[serde(default = "TrackingConfig::default_min_movement_threshold_meters")]
    pub min_movement_threshold_meters: f64,
    /// Maximum angular deviation for a subline segment to count as a
    /// direction match (default: 45.0)
    #[serde(default = "TrackingConfig::default_direction_match_threshold_degrees")]
    pub direction_match_threshold_degrees: f64,
    /// Offset added to an estimated arrival to get the estimated departure
    /// (default: 30)
    #[serde(default = "TrackingConfig::default_stop_departure_offset_secs")]
    pub stop_departure_offset_secs: u64,
    /// Bus states idle for longer than this are evicted; 0 disables eviction
    /// (default: 900)
    #[serde(default = "TrackingConfig::default_idle_eviction_secs")]
    pub idle_eviction_secs: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            history_size: Self::default_history_size(),
            min_signals_for_direction: Self::default_min_signals_for_direction(),
            min_movement_threshold_meters: Self::default_min_movement_threshold_meters(),
            direction_match_threshold_degrees: Self::default_direction_match_threshold_degrees(),
            stop_departure_offset_secs: Self::default_stop_departure_offset_secs(),
            idle_eviction_secs: Self::default_idle_eviction_secs(),
        }
    }
}

impl TrackingConfig {
    fn default_history_size() -> usize {
        5
    }
    fn default_min_signals_for_direction() -> usize {
        3
    }
    fn default_min_movement_threshold_meters() -> f64 {
        1.0
    }
    fn default_direction_match_threshold_degrees() -> f64 {
        45.0
    }
    fn default_stop_departure_offset_secs() -> u64 {
        30
    }
    fn default_idle_eviction_secs() -> u64 {
        900
    }
}

/// Catalog reader cache and deadline settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    /// Cache time-to-live for subline lookups in seconds (default: 300).
    /// Operators publish sublines infrequently; minutes of staleness only
    /// degrades matching accuracy.
    #[serde(default = "CatalogConfig::default_ttl_secs")]
    pub ttl_secs: u64,
    /// Deadline for a single catalog query in seconds (default: 2)
    #[serde(default = "CatalogConfig::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            ttl_secs: Self::default_ttl_secs(),
            timeout_secs: Self::default_timeout_secs(),
        }
    }
}

impl CatalogConfig {
    fn default_ttl_secs() -> u64 {
        300
    }
    fn default_timeout_secs() -> u64 {
        2
    }
}

/// Subscriber fan-out settings.
#[derive(Debug, Clone, Deserialize)]
pub struct BroadcastConfig {
    /// Bounded queue depth per subscriber connection; a full queue drops the
    /// subscriber rather than blocking the pipeline (default: 64)
    #[serde(default = "BroadcastConfig::default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            queue_capacity: Self::default_queue_capacity(),
        }
    }
}

impl BroadcastConfig {
    fn default_queue_capacity() -> usize {
        64
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to parse config: {0}")]
    ParseError(String),
}

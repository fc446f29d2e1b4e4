//! Service configuration.
//!
//! Loaded from TOML. Every section is optional and falls back to defaults, so
//! an empty file runs a fully simulated controller with no remote endpoints.
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8080"
//!
//! [controller]
//! tick_interval_ms = 2000
//! auto_mode = true
//!
//! [thresholds]
//! lux_target = 10000.0
//! visibility_limit = 30.0
//! motion_timeout_ms = 5000
//!
//! [remote]
//! url = "http://192.168.0.136:3000/api"
//!
//! [cloud]
//! url = "https://example-rtdb.firebaseio.com"
//! collection = "sensors"
//! batch_size = 200
//! max_concurrent_pushes = 8
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use streetlight_core::SimulationConfig;
use streetlight_types::{RuleThresholds, ValueError};

/// Shortest accepted tick period.
pub const MIN_TICK_INTERVAL_MS: u64 = 100;
/// Longest accepted tick period (1 hour).
pub const MAX_TICK_INTERVAL_MS: u64 = 3_600_000;
/// Upper bound for the recent-log view.
pub const MAX_LOG_LIMIT: u32 = 500;

/// Service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server settings.
    pub server: ServerConfig,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Control loop settings.
    pub controller: ControllerConfig,
    /// Rule thresholds applied at start-up.
    pub thresholds: ThresholdsConfig,
    /// Fallback sensor simulation.
    pub simulation: SimulationConfig,
    /// Remote sensor and device endpoint.
    pub remote: RemoteConfig,
    /// Cloud store for synchronization.
    pub cloud: CloudConfig,
}

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return any errors.
    ///
    /// All sections are checked and every problem is reported, not just the
    /// first one.
    ///
    /// # Example
    ///
    /// ```
    /// use streetlight_service::Config;
    ///
    /// let config = Config::default();
    /// config.validate().expect("Default config should be valid");
    /// ```
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        errors.extend(self.server.validate());
        errors.extend(self.storage.validate());
        errors.extend(self.controller.validate());
        errors.extend(self.thresholds.validate());
        errors.extend(validate_simulation(&self.simulation));
        errors.extend(self.remote.validate());
        errors.extend(self.cloud.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:8080").
    pub bind: String,
    /// Capacity of the tick event channel. Slow subscribers lose the
    /// oldest events once it fills.
    pub broadcast_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            broadcast_buffer: 100,
        }
    }
}

impl ServerConfig {
    /// Validate server configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if let Err(message) = validate_bind(&self.bind) {
            errors.push(ValidationError::new("server.bind", message));
        }
        if self.broadcast_buffer == 0 {
            errors.push(ValidationError::new(
                "server.broadcast_buffer",
                "broadcast buffer must be at least 1",
            ));
        }

        errors
    }
}

/// Check a `host:port` bind address.
pub(crate) fn validate_bind(bind: &str) -> Result<(), String> {
    if bind.is_empty() {
        return Err("bind address cannot be empty".to_string());
    }
    let Some((_, port)) = bind.rsplit_once(':') else {
        return Err(format!(
            "invalid bind address '{}': expected format 'host:port'",
            bind
        ));
    };
    match port.parse::<u16>() {
        Ok(0) => Err("port cannot be 0".to_string()),
        Ok(_) => Ok(()),
        Err(_) => Err(format!("invalid port '{}': must be a number 1-65535", port)),
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file path.
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: streetlight_store::default_db_path(),
        }
    }
}

impl StorageConfig {
    /// Validate storage configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "storage.path",
                "database path cannot be empty",
            ));
        }

        errors
    }
}

/// Control loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Tick period in milliseconds.
    pub tick_interval_ms: u64,
    /// Whether the rule engine drives the lamp at start-up.
    pub auto_mode: bool,
    /// Half-width of the "stable" band for trend classification, in lux.
    pub trend_band: f64,
    /// Number of stored readings kept in the recent-log view.
    pub log_limit: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 2000,
            auto_mode: true,
            trend_band: streetlight_core::DEFAULT_TREND_BAND,
            log_limit: 50,
        }
    }
}

impl ControllerConfig {
    /// The tick period.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Validate controller configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.tick_interval_ms < MIN_TICK_INTERVAL_MS {
            errors.push(ValidationError::new(
                "controller.tick_interval_ms",
                format!(
                    "tick interval {} is too short (minimum {} ms)",
                    self.tick_interval_ms, MIN_TICK_INTERVAL_MS
                ),
            ));
        } else if self.tick_interval_ms > MAX_TICK_INTERVAL_MS {
            errors.push(ValidationError::new(
                "controller.tick_interval_ms",
                format!(
                    "tick interval {} is too long (maximum {} ms / 1 hour)",
                    self.tick_interval_ms, MAX_TICK_INTERVAL_MS
                ),
            ));
        }

        if !self.trend_band.is_finite() || self.trend_band < 0.0 {
            errors.push(ValidationError::new(
                "controller.trend_band",
                format!("trend band {} must be a finite, non-negative number", self.trend_band),
            ));
        }

        if self.log_limit == 0 || self.log_limit > MAX_LOG_LIMIT {
            errors.push(ValidationError::new(
                "controller.log_limit",
                format!("log limit {} must be in 1-{}", self.log_limit, MAX_LOG_LIMIT),
            ));
        }

        errors
    }
}

/// Rule thresholds as written in the config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdsConfig {
    /// Illuminance at or above which the LED is switched off.
    pub lux_target: f64,
    /// Visibility below which the fog lights turn on.
    pub visibility_limit: f64,
    /// How long the lamp stays at full brightness after motion.
    pub motion_timeout_ms: u64,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self::from(RuleThresholds::default())
    }
}

impl From<RuleThresholds> for ThresholdsConfig {
    fn from(thresholds: RuleThresholds) -> Self {
        Self {
            lux_target: thresholds.lux_target(),
            visibility_limit: thresholds.visibility_limit(),
            motion_timeout_ms: u64::try_from(thresholds.motion_timeout().as_millis())
                .unwrap_or(u64::MAX),
        }
    }
}

impl ThresholdsConfig {
    /// Build validated rule thresholds.
    pub fn to_thresholds(&self) -> Result<RuleThresholds, ValueError> {
        RuleThresholds::new(
            self.lux_target,
            self.visibility_limit,
            Duration::from_millis(self.motion_timeout_ms),
        )
    }

    /// Validate threshold configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        match self.to_thresholds() {
            Ok(_) => Vec::new(),
            Err(e @ ValueError::VisibilityLimit(_)) => {
                vec![ValidationError::new("thresholds.visibility_limit", e.to_string())]
            }
            Err(e) => vec![ValidationError::new("thresholds.lux_target", e.to_string())],
        }
    }
}

fn validate_simulation(config: &SimulationConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    for (field, value) in [
        ("simulation.lux_step", config.lux_step),
        ("simulation.visibility_step", config.visibility_step),
    ] {
        if !value.is_finite() || value < 0.0 {
            errors.push(ValidationError::new(
                field,
                format!("step {} must be a finite, non-negative number", value),
            ));
        }
    }

    if !(0.0..=1.0).contains(&config.motion_probability) {
        errors.push(ValidationError::new(
            "simulation.motion_probability",
            format!(
                "probability {} must be between 0 and 1",
                config.motion_probability
            ),
        ));
    }

    errors
}

/// Remote sensor/device endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the endpoint (e.g., "http://localhost:3000/api").
    /// Without it every reading is simulated.
    pub url: Option<String>,
    /// Timeout for sensor reads in milliseconds.
    pub sensor_timeout_ms: u64,
    /// Timeout for device-state requests in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: None,
            sensor_timeout_ms: 1000,
            request_timeout_ms: 5000,
        }
    }
}

impl RemoteConfig {
    /// Validate remote configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if let Some(url) = &self.url {
            errors.extend(validate_url("remote.url", url));
        }
        if self.sensor_timeout_ms == 0 {
            errors.push(ValidationError::new(
                "remote.sensor_timeout_ms",
                "timeout must be greater than 0",
            ));
        }
        if self.request_timeout_ms == 0 {
            errors.push(ValidationError::new(
                "remote.request_timeout_ms",
                "timeout must be greater than 0",
            ));
        }

        errors
    }
}

/// Cloud store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    /// Base URL of the realtime database. Without it, sync is disabled.
    pub url: Option<String>,
    /// Collection path records are appended under.
    pub collection: String,
    /// Optional auth token appended as `?auth=`.
    pub auth: Option<String>,
    /// Push timeout in milliseconds.
    pub timeout_ms: u64,
    /// URL probed for reachability before each sync. Defaults to `url`.
    pub probe_url: Option<String>,
    /// Most unsynced readings pushed by one sync pass.
    pub batch_size: u32,
    /// Most pushes in flight at once.
    pub max_concurrent_pushes: usize,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            url: None,
            collection: "sensors".to_string(),
            auth: None,
            timeout_ms: 10_000,
            probe_url: None,
            batch_size: crate::sync::DEFAULT_BATCH_SIZE,
            max_concurrent_pushes: crate::sync::DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

impl CloudConfig {
    /// The URL to probe for reachability, if sync is configured.
    pub fn effective_probe_url(&self) -> Option<&str> {
        self.probe_url.as_deref().or(self.url.as_deref())
    }

    /// Validate cloud configuration.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if let Some(url) = &self.url {
            errors.extend(validate_url("cloud.url", url));
        }
        if let Some(url) = &self.probe_url {
            errors.extend(validate_url("cloud.probe_url", url));
        }
        if self.collection.trim_matches('/').is_empty() {
            errors.push(ValidationError::new(
                "cloud.collection",
                "collection cannot be empty",
            ));
        }
        if self.timeout_ms == 0 {
            errors.push(ValidationError::new(
                "cloud.timeout_ms",
                "timeout must be greater than 0",
            ));
        }
        if self.batch_size == 0 {
            errors.push(ValidationError::new(
                "cloud.batch_size",
                "batch size must be greater than 0",
            ));
        }
        if self.max_concurrent_pushes == 0 {
            errors.push(ValidationError::new(
                "cloud.max_concurrent_pushes",
                "concurrent pushes must be greater than 0",
            ));
        }

        errors
    }
}

fn validate_url(field: &str, url: &str) -> Option<ValidationError> {
    if url.starts_with("http://") || url.starts_with("https://") {
        None
    } else {
        Some(ValidationError::new(
            field,
            format!("URL must start with http:// or https://, got: {}", url),
        ))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path (e.g., `server.bind` or `cloud.url`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("streetlight")
        .join("controller.toml")
}

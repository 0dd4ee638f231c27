//! Configuration using Figment.
//!
//! Settings are loaded from (in order of precedence):
//! 1. Environment variables prefixed with `SEEDDAQ_`
//! 2. A TOML file (default: `config/seed_daq.toml`)
//!
//! Sections and keys are separated by a double underscore so that keys with
//! underscores stay intact:
//!
//! ```text
//! SEEDDAQ_APPLICATION__LOG_LEVEL=debug
//! SEEDDAQ_CONNECTION__PORT=COM7
//! SEEDDAQ_POLLING__INTERVAL_MS=500
//! ```
//!
//! # Example
//!
//! ```no_run
//! use seed_daq::config::Settings;
//!
//! fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     println!("Port: {}", settings.connection.port);
//!     println!("Poll interval: {:?}", settings.polling.interval());
//!     Ok(())
//! }
//! ```

use crate::monitor::{PollField, PollSettings, Quantity, StabilizationSettings};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default configuration file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config/seed_daq.toml";

/// Configuration error types
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration load error: {0}")]
    LoadError(#[from] figment::Error),
    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    #[allow(missing_docs)]
    pub application: ApplicationConfig,
    #[serde(default)]
    #[allow(missing_docs)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    #[allow(missing_docs)]
    pub polling: PollingConfig,
    #[serde(default)]
    #[allow(missing_docs)]
    pub stabilization: StabilizationConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

/// Which module to talk to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Serial port of the module
    #[serde(default = "default_port")]
    pub port: String,
    /// Device index on the port
    #[serde(default = "default_device_id")]
    pub device_id: u8,
}

/// Poll loop configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Milliseconds between ticks
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Samples kept per plotted field
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    /// Fields read each tick
    #[serde(default = "default_fields")]
    pub fields: Vec<PollField>,
    /// Fields recorded into history
    #[serde(default = "default_plot_fields")]
    pub plot_fields: Vec<PollField>,
}

/// Stabilization monitor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilizationConfig {
    /// Quantity compared against its setpoint
    #[serde(default = "default_quantity")]
    pub quantity: String,
    /// Largest deviation counted as in tolerance (nm or GHz)
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Milliseconds between samples
    #[serde(default = "default_dt_ms")]
    pub dt_ms: u64,
    /// Milliseconds the value must stay in tolerance
    #[serde(default = "default_dt_stable_ms")]
    pub dt_stable_ms: u64,
    /// Give up after this long, e.g. `"2m"`; unset waits forever
    #[serde(default, with = "humantime_serde")]
    pub max_wait: Option<Duration>,
}

fn default_name() -> String {
    "Seed DAQ".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_port() -> String {
    "COM6".to_string()
}

fn default_device_id() -> u8 {
    1
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_history_capacity() -> usize {
    crate::data::DEFAULT_HISTORY_CAPACITY
}

fn default_fields() -> Vec<PollField> {
    PollField::ALL.to_vec()
}

fn default_plot_fields() -> Vec<PollField> {
    PollField::plottable()
}

fn default_quantity() -> String {
    "wavelength".to_string()
}

fn default_tolerance() -> f64 {
    1e-3
}

fn default_dt_ms() -> u64 {
    1000
}

fn default_dt_stable_ms() -> u64 {
    5000
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            device_id: default_device_id(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            history_capacity: default_history_capacity(),
            fields: default_fields(),
            plot_fields: default_plot_fields(),
        }
    }
}

impl Default for StabilizationConfig {
    fn default() -> Self {
        Self {
            quantity: default_quantity(),
            tolerance: default_tolerance(),
            dt_ms: default_dt_ms(),
            dt_stable_ms: default_dt_stable_ms(),
            max_wait: None,
        }
    }
}

impl PollingConfig {
    /// Tick period
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Settings for a [`PollLoop`](crate::monitor::PollLoop)
    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: self.interval(),
            fields: self.fields.clone(),
            plot_fields: self.plot_fields.clone(),
            history_capacity: self.history_capacity,
        }
    }
}

impl StabilizationConfig {
    /// Settings for a [`StabilizationMonitor`](crate::monitor::StabilizationMonitor)
    pub fn monitor_settings(&self) -> Result<StabilizationSettings, ConfigError> {
        let quantity: Quantity = self
            .quantity
            .parse()
            .map_err(|_| ConfigError::ValidationError(format!(
                "Invalid stabilization quantity '{}'. Must be one of: wavelength, frequency",
                self.quantity
            )))?;
        Ok(StabilizationSettings {
            quantity,
            tolerance: self.tolerance,
            dt: Duration::from_millis(self.dt_ms),
            dt_stable: Duration::from_millis(self.dt_stable_ms),
            max_wait: self.max_wait,
        })
    }
}

impl Settings {
    /// Load from [`DEFAULT_CONFIG_PATH`] and the environment.
    ///
    /// A missing file is not an error; defaults fill every key.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file path and the environment, then validate
    ///
    /// # Errors
    ///
    /// Returns a ConfigError if the file cannot be parsed or validation fails.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let settings: Self = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("SEEDDAQ_").split("__"))
            .extract()
            .map_err(ConfigError::LoadError)?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration after loading
    ///
    /// # Errors
    ///
    /// Returns a ConfigError with a descriptive message for any validation failure.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            )));
        }

        if self.connection.port.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "connection.port must not be empty".to_string(),
            ));
        }

        if self.polling.interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "polling.interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.polling.history_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "polling.history_capacity must be greater than 0".to_string(),
            ));
        }
        if self.polling.fields.is_empty() {
            return Err(ConfigError::ValidationError(
                "polling.fields must name at least one field".to_string(),
            ));
        }
        if let Some(field) = self.polling.plot_fields.iter().find(|f| !f.spec().plot) {
            return Err(ConfigError::ValidationError(format!(
                "Field '{}' cannot be plotted",
                field
            )));
        }

        let stabilization = &self.stabilization;
        if !(stabilization.tolerance.is_finite() && stabilization.tolerance > 0.0) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid stabilization tolerance {}. Must be positive",
                stabilization.tolerance
            )));
        }
        if stabilization.dt_ms == 0 {
            return Err(ConfigError::ValidationError(
                "stabilization.dt_ms must be greater than 0".to_string(),
            ));
        }
        stabilization.monitor_settings()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.polling.history_capacity, 300);
        assert_eq!(settings.polling.poll_settings(), PollSettings::default());
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        let file = write_config(
            r#"
[connection]
port = "COM9"
device_id = 3

[polling]
interval_ms = 250
fields = ["temperature", "wavelength", "status"]
plot_fields = ["wavelength"]

[stabilization]
quantity = "frequency"
tolerance = 0.05
max_wait = "2m"
"#,
        );

        let settings = Settings::load_from(file.path()).unwrap();
        assert_eq!(settings.connection.port, "COM9");
        assert_eq!(settings.connection.device_id, 3);
        assert_eq!(settings.polling.interval(), Duration::from_millis(250));
        assert_eq!(settings.polling.fields.len(), 3);
        assert_eq!(settings.application.log_level, "info");

        let monitor = settings.stabilization.monitor_settings().unwrap();
        assert_eq!(monitor.quantity, Quantity::Frequency);
        assert_eq!(monitor.max_wait, Some(Duration::from_secs(120)));
        assert_eq!(monitor.dt_stable, Duration::from_secs(5));
    }

    #[test]
    #[serial]
    fn test_missing_file_uses_defaults() {
        let settings = Settings::load_from("does/not/exist.toml").unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        let file = write_config("[application]\nlog_level = \"warn\"\n");
        std::env::set_var("SEEDDAQ_APPLICATION__LOG_LEVEL", "debug");
        std::env::set_var("SEEDDAQ_CONNECTION__DEVICE_ID", "7");
        let settings = Settings::load_from(file.path());
        std::env::remove_var("SEEDDAQ_APPLICATION__LOG_LEVEL");
        std::env::remove_var("SEEDDAQ_CONNECTION__DEVICE_ID");

        let settings = settings.unwrap();
        assert_eq!(settings.application.log_level, "debug");
        assert_eq!(settings.connection.device_id, 7);
    }

    #[test]
    fn test_invalid_log_level() {
        let mut settings = Settings::default();
        settings.application.log_level = "loud".to_string();
        let result = settings.validate();
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Invalid log_level"));
    }

    #[test]
    fn test_unplottable_field_rejected() {
        let mut settings = Settings::default();
        settings.polling.plot_fields = vec![PollField::Status];
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_unknown_quantity_rejected() {
        let mut settings = Settings::default();
        settings.stabilization.quantity = "power".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_unknown_field_name_fails_to_load() {
        let file = write_config("[polling]\nfields = [\"humidity\"]\n");
        assert!(matches!(
            Settings::load_from(file.path()),
            Err(ConfigError::LoadError(_))
        ));
    }
}

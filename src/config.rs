//! Configuration loading using Figment
//!
//! Configuration is layered, highest precedence last:
//! 1. Built-in defaults ([`Settings::default`])
//! 2. A TOML file (`config/plate_logger.toml` unless another path is given)
//! 3. Environment variables prefixed with `PLATE_LOGGER_`
//!
//! # Environment Variable Overrides
//!
//! Nested keys are separated by a double underscore:
//!
//! ```text
//! PLATE_LOGGER_APPLICATION__LOG_LEVEL=debug
//! PLATE_LOGGER_APPLICATION__LOG_FORMAT=json
//! PLATE_LOGGER_SERIAL__PORT=/dev/ttyACM0
//! PLATE_LOGGER_ACQUISITION__SAMPLE_COUNT=500
//! ```
//!
//! # Example
//!
//! ```no_run
//! use plate_logger::config::Settings;
//!
//! let settings = Settings::load()?;
//! println!("Bridge: {}:{}", settings.serial.vendor_id, settings.serial.product_id);
//! # Ok::<(), plate_logger::error::PlateError>(())
//! ```

use crate::acquisition::session::{is_valid_period, MAX_SAMPLE_PERIOD_SECS};
use crate::error::{AppResult, PlateError};
use crate::plate::TemperatureScale;
use crate::tracing_init::OutputFormat;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default configuration file location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/plate_logger.toml";

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "PLATE_LOGGER_";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Serial bridge settings
    #[serde(default)]
    pub serial: SerialConfig,
    /// Sampling defaults
    #[serde(default)]
    pub acquisition: AcquisitionConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    #[serde(default)]
    pub log_format: OutputFormat,
}

/// Serial bridge configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// USB vendor id of the bridge, 4 hex digits
    #[serde(default = "default_vendor_id")]
    pub vendor_id: String,
    /// USB product id of the bridge, 4 hex digits
    #[serde(default = "default_product_id")]
    pub product_id: String,
    /// Explicit port path; skips vid/pid enumeration when set
    #[serde(default)]
    pub port: Option<String>,
    /// Baud rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Response timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Terminator appended to every command
    #[serde(default = "default_line_terminator")]
    pub line_terminator: String,
}

/// Sampling defaults applied at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    /// Number of rows to log per session
    #[serde(default = "default_sample_count")]
    pub sample_count: u32,
    /// Sample period in seconds; the hardware minimum is used when unset
    #[serde(default)]
    pub sample_period: Option<f64>,
    /// Ring buffer capacity per channel
    #[serde(default = "default_plot_width")]
    pub plot_width: usize,
    /// Scale requested from temperature plates
    #[serde(default)]
    pub temperature_scale: TemperatureScale,
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_log_level() -> String {
    "info".to_string()
}

fn default_vendor_id() -> String {
    "2E8A".to_string()
}

fn default_product_id() -> String {
    "10E3".to_string()
}

fn default_baud_rate() -> u32 {
    115_200
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_line_terminator() -> String {
    "\n".to_string()
}

fn default_sample_count() -> u32 {
    1000
}

fn default_plot_width() -> usize {
    1083
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: OutputFormat::default(),
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            vendor_id: default_vendor_id(),
            product_id: default_product_id(),
            port: None,
            baud_rate: default_baud_rate(),
            timeout_ms: default_timeout_ms(),
            line_terminator: default_line_terminator(),
        }
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            sample_count: default_sample_count(),
            sample_period: None,
            plot_width: default_plot_width(),
            temperature_scale: TemperatureScale::default(),
        }
    }
}

impl SerialConfig {
    /// Response timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl Settings {
    /// Load configuration from the default file and environment variables.
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path.
    ///
    /// A missing file is not an error; defaults and environment overrides still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let settings: Self = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration after loading
    ///
    /// Checks:
    /// - Log level is valid (trace, debug, info, warn, error)
    /// - Vendor and product ids are 4 hex digits
    /// - Baud rate, timeout, plot width and sample count are non-zero
    /// - A configured sample period is positive and finite
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(PlateError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        for (name, id) in [
            ("vendor_id", &self.serial.vendor_id),
            ("product_id", &self.serial.product_id),
        ] {
            if id.len() != 4 || !id.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(PlateError::Configuration(format!(
                    "Invalid {name} '{id}'. Must be 4 hex digits"
                )));
            }
        }

        if self.serial.baud_rate == 0 {
            return Err(PlateError::Configuration(
                "baud_rate must be > 0".to_string(),
            ));
        }
        if self.serial.timeout_ms == 0 {
            return Err(PlateError::Configuration(
                "timeout_ms must be > 0".to_string(),
            ));
        }
        if self.serial.line_terminator.is_empty() {
            return Err(PlateError::Configuration(
                "line_terminator cannot be empty".to_string(),
            ));
        }
        if self.acquisition.plot_width == 0 {
            return Err(PlateError::Configuration(
                "plot_width must be > 0".to_string(),
            ));
        }
        if self.acquisition.sample_count == 0 {
            return Err(PlateError::Configuration(
                "sample_count must be > 0".to_string(),
            ));
        }
        if let Some(period) = self.acquisition.sample_period {
            if !is_valid_period(period) {
                return Err(PlateError::Configuration(format!(
                    "Invalid sample_period {period}. Must be a positive number of seconds \
                     up to {MAX_SAMPLE_PERIOD_SECS}"
                )));
            }
        }

        Ok(())
    }
}

//! Configuration loading using Figment.
//!
//! Configuration is loaded from (in order of precedence, highest first):
//! 1. Environment variables prefixed with `WAVEFINDER_`, nested keys separated by `__`
//! 2. A TOML configuration file (default: `config/wavefinder.toml`)
//! 3. Built-in defaults
//!
//! # Example
//!
//! ```toml
//! [application]
//! name = "Wavefinder"
//! log_level = "info"
//!
//! [galil]
//! address = "192.168.1.19"
//! timeout_ms = 1000
//! update_interval_ms = 1000
//! axes = [
//!     { name = "gimbal 1 elevation", channel = "A" },
//!     { name = "gimbal 2 azimuth", channel = "D" },
//! ]
//!
//! [monochromator]
//! update_interval_ms = 250
//! ```
//!
//! # Environment Variables
//!
//! ```text
//! WAVEFINDER_APPLICATION__LOG_LEVEL=debug
//! WAVEFINDER_GALIL__ADDRESS=10.0.0.5
//! WAVEFINDER_MONOCHROMATOR__STEP_NM=0.5
//! ```

use crate::error::{AppResult, WavefinderError};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Default configuration file location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/wavefinder.toml";

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Motion controller; absent means no gimbal hardware
    #[serde(default)]
    pub galil: Option<GalilConfig>,
    /// Monochromator panel settings
    #[serde(default)]
    pub monochromator: MonochromatorConfig,
    /// Gimbal panel settings
    #[serde(default)]
    pub gimbal: GimbalConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApplicationConfig {
    /// Window title
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Galil motion controller connection and axis map
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GalilConfig {
    /// Controller IP address, optionally with `:port`
    pub address: String,
    /// Reply timeout per command in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Adapter update period in milliseconds
    #[serde(default = "default_adapter_interval_ms")]
    pub update_interval_ms: u64,
    /// Named axes to look for, probed in this order
    #[serde(default)]
    pub axes: Vec<AxisDefinition>,
}

/// One named axis and the controller channel it lives on
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AxisDefinition {
    /// Operator-facing name, unique across the controller
    pub name: String,
    /// Channel letter (`A`..`H`)
    pub channel: String,
}

/// Monochromator panel configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonochromatorConfig {
    /// Panel update period in milliseconds
    #[serde(default = "default_panel_interval_ms")]
    pub update_interval_ms: u64,
    /// Starting wavelength of the simulated monochromator
    #[serde(default = "default_initial_wavelength")]
    pub initial_wavelength_nm: f64,
    /// Wavelength change per jog step of the simulated monochromator
    #[serde(default = "default_step_nm")]
    pub step_nm: f64,
    /// Serial number reported by the simulated monochromator (0 = unknown)
    #[serde(default)]
    pub serial_number: u32,
}

/// Gimbal panel configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GimbalConfig {
    /// Panel update period in milliseconds
    #[serde(default = "default_panel_interval_ms")]
    pub update_interval_ms: u64,
    /// Relative move issued by one jog press, in encoder counts
    #[serde(default = "default_jog_step")]
    pub jog_step_counts: i64,
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_name() -> String {
    "Wavefinder".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_timeout_ms() -> u64 {
    1000
}

fn default_adapter_interval_ms() -> u64 {
    1000
}

fn default_panel_interval_ms() -> u64 {
    250
}

fn default_initial_wavelength() -> f64 {
    500.0
}

fn default_step_nm() -> f64 {
    1.0
}

fn default_jog_step() -> i64 {
    1000
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
        }
    }
}

impl Default for MonochromatorConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: default_panel_interval_ms(),
            initial_wavelength_nm: default_initial_wavelength(),
            step_nm: default_step_nm(),
            serial_number: 0,
        }
    }
}

impl Default for GimbalConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: default_panel_interval_ms(),
            jog_step_counts: default_jog_step(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            application: ApplicationConfig::default(),
            galil: None,
            monochromator: MonochromatorConfig::default(),
            gimbal: GimbalConfig::default(),
        }
    }
}

impl GalilConfig {
    /// Per-command reply timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Adapter update period
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }

    /// `(name, channel)` pairs in configuration order
    pub fn axis_names(&self) -> Vec<(String, String)> {
        self.axes
            .iter()
            .map(|a| (a.name.clone(), a.channel.clone()))
            .collect()
    }
}

impl MonochromatorConfig {
    /// Panel update period
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }
}

impl GimbalConfig {
    /// Panel update period
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms)
    }
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl AppConfig {
    /// Load configuration from [`DEFAULT_CONFIG_PATH`] and environment variables.
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path.
    ///
    /// A missing file is not an error: defaults and environment variables still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config: Self = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("WAVEFINDER_").split("__"))
            .extract()?;

        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as TOML, e.g. to bootstrap a config file.
    pub fn to_toml(&self) -> AppResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| WavefinderError::Configuration(format!("Cannot serialize: {e}")))
    }

    /// Validate configuration after loading
    ///
    /// Checks:
    /// - Log level is valid (trace, debug, info, warn, error)
    /// - Update intervals are non-zero
    /// - Axis names are unique and non-empty
    /// - Axis channels are a single letter `A`..`H`
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(WavefinderError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.monochromator.update_interval_ms == 0 {
            return Err(WavefinderError::Configuration(
                "monochromator.update_interval_ms must be greater than 0".into(),
            ));
        }
        if self.gimbal.update_interval_ms == 0 {
            return Err(WavefinderError::Configuration(
                "gimbal.update_interval_ms must be greater than 0".into(),
            ));
        }
        if !self.monochromator.step_nm.is_finite() || self.monochromator.step_nm <= 0.0 {
            return Err(WavefinderError::Configuration(format!(
                "monochromator.step_nm must be a positive number, got {}",
                self.monochromator.step_nm
            )));
        }

        if let Some(galil) = &self.galil {
            galil.validate()?;
        }

        Ok(())
    }
}

impl GalilConfig {
    fn validate(&self) -> AppResult<()> {
        if self.address.trim().is_empty() {
            return Err(WavefinderError::Configuration(
                "galil.address cannot be empty".into(),
            ));
        }
        if self.update_interval_ms == 0 {
            return Err(WavefinderError::Configuration(
                "galil.update_interval_ms must be greater than 0".into(),
            ));
        }
        if self.timeout_ms == 0 {
            return Err(WavefinderError::Configuration(
                "galil.timeout_ms must be greater than 0".into(),
            ));
        }

        let mut names = HashSet::new();
        for axis in &self.axes {
            if axis.name.trim().is_empty() {
                return Err(WavefinderError::Configuration(format!(
                    "Axis on channel '{}' has an empty name",
                    axis.channel
                )));
            }
            if !names.insert(axis.name.as_str()) {
                return Err(WavefinderError::Configuration(format!(
                    "Duplicate axis name: '{}'",
                    axis.name
                )));
            }
            if !is_valid_channel(&axis.channel) {
                return Err(WavefinderError::Configuration(format!(
                    "Invalid channel '{}' for axis '{}'. Must be one of A-H",
                    axis.channel, axis.name
                )));
            }
        }
        Ok(())
    }
}

/// A Galil channel is a single letter `A`..`H`.
pub fn is_valid_channel(channel: &str) -> bool {
    let mut chars = channel.chars();
    matches!((chars.next(), chars.next()), (Some('A'..='H'), None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn galil(axes: &[(&str, &str)]) -> GalilConfig {
        GalilConfig {
            address: "192.168.1.19".into(),
            timeout_ms: 1000,
            update_interval_ms: 1000,
            axes: axes
                .iter()
                .map(|(n, c)| AxisDefinition {
                    name: n.to_string(),
                    channel: c.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.galil.is_none());
        assert_eq!(config.monochromator.update_interval(), Duration::from_millis(250));
    }

    #[test]
    fn test_load_from_file_keeps_axis_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[application]
log_level = "debug"

[galil]
address = "10.0.0.2"
axes = [
    {{ name = "gimbal 2 azimuth", channel = "D" }},
    {{ name = "gimbal 1 elevation", channel = "A" }},
]
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.application.log_level, "debug");
        let galil = config.galil.unwrap();
        assert_eq!(galil.timeout_ms, 1000);
        assert_eq!(
            galil.axis_names(),
            vec![
                ("gimbal 2 azimuth".to_string(), "D".to_string()),
                ("gimbal 1 elevation".to_string(), "A".to_string()),
            ]
        );
    }

    #[test]
    fn test_environment_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "wavefinder.toml",
                r#"
                [galil]
                address = "192.168.1.19"
                axes = [{ name = "az", channel = "A" }]
                "#,
            )?;
            jail.set_env("WAVEFINDER_GALIL__ADDRESS", "10.0.0.5");
            jail.set_env("WAVEFINDER_MONOCHROMATOR__STEP_NM", "0.5");

            let config = AppConfig::load_from("wavefinder.toml").map_err(|e| e.to_string())?;
            let galil = config.galil.ok_or("galil section missing")?;
            assert_eq!(galil.address, "10.0.0.5");
            assert_eq!(galil.axes.len(), 1);
            assert_eq!(config.monochromator.step_nm, 0.5);
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_from(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.application.name, "Wavefinder");
    }

    #[test]
    fn test_rejects_duplicate_axis_names() {
        let config = AppConfig {
            galil: Some(galil(&[("az", "A"), ("az", "B")])),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Duplicate axis name"));
    }

    #[test]
    fn test_rejects_bad_channel() {
        let config = AppConfig {
            galil: Some(galil(&[("az", "Z")])),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = AppConfig {
            galil: Some(galil(&[("az", "AB")])),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_interval() {
        let mut config = AppConfig::default();
        config.monochromator.update_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_log_level() {
        let mut config = AppConfig::default();
        config.application.log_level = "loud".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip_of_defaults() {
        let text = AppConfig::default().to_toml().unwrap();
        assert!(text.contains("[application]"));
        assert!(text.contains("[monochromator]"));
    }

    #[test]
    fn test_channel_validation() {
        assert!(is_valid_channel("A"));
        assert!(is_valid_channel("H"));
        assert!(!is_valid_channel("I"));
        assert!(!is_valid_channel("a"));
        assert!(!is_valid_channel(""));
    }
}

//! Configuration loading using Figment
//!
//! Configuration is loaded from:
//! 1. a TOML file (base configuration)
//! 2. Environment variables prefixed with `TELESCOPE_`, nested keys separated
//!    by a double underscore
//!
//! ```text
//! TELESCOPE_APPLICATION__LOG_LEVEL=debug
//! TELESCOPE_APPLICATION__JSON_LOGS=true
//! ```
//!
//! # Example file
//!
//! ```toml
//! [application]
//! name = "Observatory"
//! log_level = "info"
//!
//! [[telescopes]]
//! name = "C8"
//! connection = "Simulator.Telescope"
//! equinox = "jnow"
//! poll_interval_ms = 5000
//! ```

use crate::coordinates::Equinox;
use crate::driver::ConnectionParams;
use crate::error::{AppResult, TelescopeError};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/telescopes.toml";

/// Longest accepted polling interval, one day.
pub const MAX_POLL_INTERVAL_MS: u64 = 86_400_000;

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Telescope connections
    #[serde(default)]
    pub telescopes: Vec<TelescopeConfig>,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_app_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Emit logs as JSON lines
    #[serde(default)]
    pub json_logs: bool,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

/// One telescope connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelescopeConfig {
    /// Display name, unique
    pub name: String,
    /// Connection parameters (the driver identifier)
    pub connection: String,
    /// Equinox the mount works in
    #[serde(default)]
    pub equinox: Equinox,
    /// Position polling interval in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Whether this telescope is enabled
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl TelescopeConfig {
    /// Polling interval in microseconds.
    pub fn poll_interval_micros(&self) -> i64 {
        i64::try_from(self.poll_interval_ms.saturating_mul(1_000)).unwrap_or(i64::MAX)
    }
}

fn default_app_name() -> String {
    "telescope_client".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

fn default_enabled() -> bool {
    true
}

impl Settings {
    /// Load configuration from [`DEFAULT_CONFIG_PATH`].
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; defaults and environment overrides
    /// still apply.
    ///
    /// # Errors
    ///
    /// Returns an error if the sources cannot be parsed or fail validation.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let settings: Self = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("TELESCOPE_").split("__"))
            .extract()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Validate configuration after loading
    ///
    /// Checks:
    /// - Log level is valid (trace, debug, info, warn, error)
    /// - Telescope names are non-empty and unique
    /// - Connection parameters parse
    /// - Poll intervals are positive and at most [`MAX_POLL_INTERVAL_MS`]
    pub fn validate(&self) -> AppResult<()> {
        if !VALID_LOG_LEVELS.contains(&self.application.log_level.as_str()) {
            return Err(TelescopeError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                VALID_LOG_LEVELS.join(", ")
            )));
        }

        let mut names = HashSet::new();
        for telescope in &self.telescopes {
            if telescope.name.trim().is_empty() {
                return Err(TelescopeError::Configuration(
                    "Telescope name must not be empty".to_string(),
                ));
            }
            if !names.insert(telescope.name.as_str()) {
                return Err(TelescopeError::Configuration(format!(
                    "Duplicate telescope name '{}'",
                    telescope.name
                )));
            }
            ConnectionParams::parse(&telescope.connection).map_err(|e| {
                TelescopeError::Configuration(format!("Telescope '{}': {}", telescope.name, e))
            })?;
            if telescope.poll_interval_ms == 0 {
                return Err(TelescopeError::Configuration(format!(
                    "Telescope '{}': poll_interval_ms must be positive",
                    telescope.name
                )));
            }
            if telescope.poll_interval_ms > MAX_POLL_INTERVAL_MS {
                return Err(TelescopeError::Configuration(format!(
                    "Telescope '{}': poll_interval_ms {} exceeds {}",
                    telescope.name, telescope.poll_interval_ms, MAX_POLL_INTERVAL_MS
                )));
            }
        }
        Ok(())
    }

    /// Telescopes with `enabled = true`.
    pub fn enabled_telescopes(&self) -> impl Iterator<Item = &TelescopeConfig> {
        self.telescopes.iter().filter(|t| t.enabled)
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

    const VALID: &str = r#"
        [application]
        name = "Observatory"
        log_level = "debug"

        [[telescopes]]
        name = "C8"
        connection = "Simulator.Telescope"
        equinox = "jnow"

        [[telescopes]]
        name = "Dob"
        connection = "Other.Telescope"
        poll_interval_ms = 1000
        enabled = false
    "#;

    #[test]
    #[serial]
    fn test_load_valid_file() {
        let file = write_config(VALID);
        let settings = Settings::load_from(file.path()).unwrap();

        assert_eq!(settings.application.name, "Observatory");
        assert_eq!(settings.telescopes.len(), 2);
        let c8 = &settings.telescopes[0];
        assert_eq!(c8.equinox, Equinox::JNow);
        assert_eq!(c8.poll_interval_micros(), 5_000_000);
        assert!(c8.enabled);
        assert_eq!(settings.telescopes[1].equinox, Equinox::J2000);

        let enabled: Vec<&str> = settings.enabled_telescopes().map(|t| t.name.as_str()).collect();
        assert_eq!(enabled, vec!["C8"]);
    }

    #[test]
    #[serial]
    fn test_missing_file_gives_defaults() {
        let settings = Settings::load_from("does/not/exist.toml").unwrap();
        assert_eq!(settings.application.log_level, "info");
        assert!(settings.telescopes.is_empty());
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        let file = write_config(VALID);
        std::env::set_var("TELESCOPE_APPLICATION__LOG_LEVEL", "warn");
        let result = Settings::load_from(file.path());
        std::env::remove_var("TELESCOPE_APPLICATION__LOG_LEVEL");

        assert_eq!(result.unwrap().application.log_level, "warn");
    }

    #[test]
    #[serial]
    fn test_rejects_duplicate_names() {
        let file = write_config(
            r#"
            [[telescopes]]
            name = "C8"
            connection = "A.Telescope"

            [[telescopes]]
            name = "C8"
            connection = "B.Telescope"
            "#,
        );
        let err = Settings::load_from(file.path()).unwrap_err();
        assert!(err.to_string().contains("Duplicate telescope name 'C8'"));
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut settings = Settings::default();
        settings.application.log_level = "loud".into();
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.telescopes.push(TelescopeConfig {
            name: "C8".into(),
            connection: "  ".into(),
            equinox: Equinox::J2000,
            poll_interval_ms: 5_000,
            enabled: true,
        });
        assert!(settings.validate().is_err());

        settings.telescopes[0].connection = "Simulator.Telescope".into();
        settings.telescopes[0].poll_interval_ms = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_poll_interval_upper_bound() {
        let mut settings = Settings::default();
        settings.telescopes.push(TelescopeConfig {
            name: "C8".into(),
            connection: "Simulator.Telescope".into(),
            equinox: Equinox::J2000,
            poll_interval_ms: MAX_POLL_INTERVAL_MS,
            enabled: true,
        });
        assert!(settings.validate().is_ok());

        settings.telescopes[0].poll_interval_ms = MAX_POLL_INTERVAL_MS + 1;
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("poll_interval_ms"));

        settings.telescopes[0].poll_interval_ms = u64::MAX;
        assert!(matches!(
            settings.validate(),
            Err(TelescopeError::Configuration(_))
        ));
    }

    #[test]
    #[serial]
    fn test_unknown_equinox_is_a_load_error() {
        let file = write_config(
            r#"
            [[telescopes]]
            name = "C8"
            connection = "Simulator.Telescope"
            equinox = "b1950"
            "#,
        );
        assert!(matches!(
            Settings::load_from(file.path()),
            Err(TelescopeError::Config(_))
        ));
    }
}

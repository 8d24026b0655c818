//! Configuration management for alertfeed.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::alert::Coordinate;
use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "alertfeed";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "alerts.db";

/// Environment variable prefix.
const ENV_PREFIX: &str = "ALERTFEED_";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `ALERTFEED_`, `__` separates sections)
/// 2. TOML config file at `~/.config/alertfeed/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Alert store configuration.
    pub store: StoreConfig,
    /// Geolocation configuration.
    pub geolocation: GeolocationConfig,
    /// Map configuration.
    pub map: MapConfig,
}

/// Alert store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/alertfeed/alerts.db`
    pub database_path: Option<PathBuf>,
    /// How often to look for alerts written by other processes, in milliseconds.
    pub poll_interval_ms: u64,
    /// Refuse reads and writes until an anonymous session is attached.
    pub require_session: bool,
}

/// Geolocation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeolocationConfig {
    /// Ask the provider for its most accurate fix.
    pub high_accuracy: bool,
    /// How long to wait for a fix, in milliseconds.
    pub timeout_ms: u64,
    /// Fixed latitude reported by the configured provider.
    pub latitude: Option<f64>,
    /// Fixed longitude reported by the configured provider.
    pub longitude: Option<f64>,
}

/// Map configuration.
///
/// Without an API key the map is omitted; the feed itself keeps working.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Map provider API key.
    pub api_key: Option<String>,
    /// Initial zoom level.
    pub zoom: u8,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: None, // Will be resolved to default at runtime
            poll_interval_ms: 500,
            require_session: true,
        }
    }
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout_ms: 10_000,
            latitude: None,
            longitude: None,
        }
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            zoom: 13,
        }
    }
}

impl MapConfig {
    /// A non-blank API key, if configured.
    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    /// Whether the map can be shown at all.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.api_key().is_some()
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.store.poll_interval_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "store.poll_interval_ms must be greater than 0".to_string(),
            });
        }

        if self.geolocation.timeout_ms == 0 {
            return Err(Error::ConfigValidation {
                message: "geolocation.timeout_ms must be greater than 0".to_string(),
            });
        }

        match (self.geolocation.latitude, self.geolocation.longitude) {
            (None, None) => {}
            (Some(lat), Some(lng)) => {
                if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
                    return Err(Error::ConfigValidation {
                        message: format!("geolocation fix ({lat}, {lng}) is out of range"),
                    });
                }
            }
            _ => {
                return Err(Error::ConfigValidation {
                    message: "geolocation.latitude and geolocation.longitude must be set together"
                        .to_string(),
                });
            }
        }

        if !(1..=21).contains(&self.map.zoom) {
            return Err(Error::ConfigValidation {
                message: format!("map.zoom ({}) must be between 1 and 21", self.map.zoom),
            });
        }

        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.store
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the store poll interval as a Duration.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.store.poll_interval_ms)
    }

    /// Get the geolocation timeout as a Duration.
    #[must_use]
    pub fn geolocation_timeout(&self) -> Duration {
        Duration::from_millis(self.geolocation.timeout_ms)
    }

    /// The configured fixed position, if both components are set.
    #[must_use]
    pub fn fixed_position(&self) -> Option<Coordinate> {
        match (self.geolocation.latitude, self.geolocation.longitude) {
            (Some(lat), Some(lng)) => Coordinate::new(lat, lng),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(config.store.require_session);
        assert!(config.geolocation.high_accuracy);
        assert!(config.map.api_key.is_none());
        assert!(!config.map.is_enabled());
    }

    #[test]
    fn test_default_store_config() {
        let store = StoreConfig::default();

        assert!(store.database_path.is_none());
        assert_eq!(store.poll_interval_ms, 500);
    }

    #[test]
    fn test_default_geolocation_config() {
        let geo = GeolocationConfig::default();

        assert_eq!(geo.timeout_ms, 10_000);
        assert!(geo.latitude.is_none());
        assert!(geo.longitude.is_none());
    }

    #[test]
    fn test_default_map_config() {
        assert_eq!(MapConfig::default().zoom, 13);
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_zero_poll_interval() {
        let mut config = Config::default();
        config.store.poll_interval_ms = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("poll_interval_ms"));
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = Config::default();
        config.geolocation.timeout_ms = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("timeout_ms"));
    }

    #[test]
    fn test_validate_half_configured_fix() {
        let mut config = Config::default();
        config.geolocation.latitude = Some(-26.2);

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("set together"));
    }

    #[test]
    fn test_validate_out_of_range_fix() {
        let mut config = Config::default();
        config.geolocation.latitude = Some(-126.2);
        config.geolocation.longitude = Some(28.0);

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("out of range"));
    }

    #[test]
    fn test_validate_zoom_range() {
        let mut config = Config::default();
        config.map.zoom = 0;
        assert!(config.validate().is_err());

        config.map.zoom = 22;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fixed_position() {
        let mut config = Config::default();
        assert!(config.fixed_position().is_none());

        config.geolocation.latitude = Some(-26.2);
        config.geolocation.longitude = Some(28.0);
        assert_eq!(
            config.fixed_position(),
            Some(Coordinate { lat: -26.2, lng: 28.0 })
        );
    }

    #[test]
    fn test_map_api_key_blank_is_disabled() {
        let mut map = MapConfig::default();
        map.api_key = Some("   ".to_string());
        assert!(!map.is_enabled());

        map.api_key = Some("key-123".to_string());
        assert_eq!(map.api_key(), Some("key-123"));
        assert!(map.is_enabled());
    }

    #[test]
    fn test_database_path_default() {
        let config = Config::default();
        assert!(config.database_path().to_string_lossy().contains("alerts.db"));
    }

    #[test]
    fn test_database_path_custom() {
        let mut config = Config::default();
        config.store.database_path = Some(PathBuf::from("/custom/path/alerts.sqlite"));

        assert_eq!(
            config.database_path(),
            PathBuf::from("/custom/path/alerts.sqlite")
        );
    }

    #[test]
    fn test_durations() {
        let config = Config::default();
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
        assert_eq!(config.geolocation_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("alertfeed"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        figment::Jail::expect_with(|_jail| {
            let config = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml")))
                .map_err(|e| e.to_string())?;
            assert_eq!(config.store, StoreConfig::default());
            assert_eq!(config.geolocation, GeolocationConfig::default());
            Ok(())
        });
    }

    #[test]
    fn test_map_api_key_from_environment() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("ALERTFEED_MAP__API_KEY", "env-key");

            let config = Config::load_from(Some(PathBuf::from("missing.toml")))
                .map_err(|e| e.to_string())?;
            assert!(config.map.is_enabled());
            assert_eq!(config.map.api_key(), Some("env-key"));
            Ok(())
        });
    }

    #[test]
    fn test_toml_sections_are_read() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [store]
                poll_interval_ms = 250

                [map]
                api_key = "file-key"
                zoom = 15
                "#,
            )?;

            let config = Config::load_from(Some(PathBuf::from("config.toml")))
                .map_err(|e| e.to_string())?;
            assert_eq!(config.store.poll_interval_ms, 250);
            assert_eq!(config.map.api_key(), Some("file-key"));
            assert_eq!(config.map.zoom, 15);
            Ok(())
        });
    }

    #[test]
    fn test_environment_overrides_toml() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [map]
                api_key = "file-key"
                zoom = 15
                "#,
            )?;
            jail.set_env("ALERTFEED_MAP__API_KEY", "env-key");
            jail.set_env("ALERTFEED_STORE__REQUIRE_SESSION", "false");

            let config = Config::load_from(Some(PathBuf::from("config.toml")))
                .map_err(|e| e.to_string())?;
            assert_eq!(config.map.api_key(), Some("env-key"));
            assert_eq!(config.map.zoom, 15);
            assert!(!config.store.require_session);
            Ok(())
        });
    }

    #[test]
    fn test_invalid_environment_value_fails_validation() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("ALERTFEED_MAP__ZOOM", "40");

            let err = Config::load_from(Some(PathBuf::from("missing.toml"))).unwrap_err();
            assert!(err.to_string().contains("map.zoom"));
            Ok(())
        });
    }

    #[test]
    fn test_map_config_deserialize() {
        let json = r#"{"api_key": "abc", "zoom": 15}"#;
        let map: MapConfig = serde_json::from_str(json).unwrap();
        assert_eq!(map.api_key(), Some("abc"));
        assert_eq!(map.zoom, 15);
    }

    #[test]
    fn test_store_config_serialize() {
        let json = serde_json::to_string(&StoreConfig::default()).unwrap();
        assert!(json.contains("poll_interval_ms"));
        assert!(json.contains("require_session"));
    }
}

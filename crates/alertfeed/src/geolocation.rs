//! One-shot device location.
//!
//! The location is fetched once at startup. It gates posting and centers the
//! map; failing to get one degrades those features but never stops the feed.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::alert::Coordinate;
use crate::config::Config;
use crate::error::{Error, Result};

/// Options passed to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionOptions {
    /// Prefer an accurate fix over a fast one.
    pub high_accuracy: bool,
    /// Give up after this long.
    pub timeout: Duration,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout: Duration::from_secs(10),
        }
    }
}

impl From<&Config> for PositionOptions {
    fn from(config: &Config) -> Self {
        Self {
            high_accuracy: config.geolocation.high_accuracy,
            timeout: config.geolocation_timeout(),
        }
    }
}

/// A source of best-effort position fixes.
#[async_trait]
pub trait GeolocationProvider: Send + Sync {
    /// The name of this provider (for logging).
    fn name(&self) -> &'static str;

    /// Get the current position.
    ///
    /// # Errors
    ///
    /// Returns an error if no fix is available.
    async fn current_position(&self, options: &PositionOptions) -> Result<Coordinate>;
}

/// Reports a fixed, preconfigured position.
#[derive(Debug, Clone, Copy)]
pub struct FixedPosition(pub Coordinate);

#[async_trait]
impl GeolocationProvider for FixedPosition {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn current_position(&self, _options: &PositionOptions) -> Result<Coordinate> {
        Ok(self.0)
    }
}

/// Used when no position source is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPosition;

#[async_trait]
impl GeolocationProvider for NoPosition {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn current_position(&self, _options: &PositionOptions) -> Result<Coordinate> {
        Err(Error::geolocation("no position source configured"))
    }
}

/// Pick the provider described by the configuration.
#[must_use]
pub fn provider_from_config(config: &Config) -> Box<dyn GeolocationProvider> {
    match config.fixed_position() {
        Some(position) => Box::new(FixedPosition(position)),
        None => Box::new(NoPosition),
    }
}

/// Ask for a fix once, logging and swallowing failures and timeouts.
pub async fn locate(
    provider: &dyn GeolocationProvider,
    options: &PositionOptions,
) -> Option<Coordinate> {
    let result = match tokio::time::timeout(options.timeout, provider.current_position(options)).await
    {
        Ok(result) => result,
        Err(_) => Err(Error::GeolocationTimeout(options.timeout)),
    };

    match result.and_then(|c| {
        c.is_finite()
            .then_some(c)
            .ok_or_else(|| Error::geolocation("provider returned a non-finite fix"))
    }) {
        Ok(position) => {
            debug!("Got position {} from {} provider", position, provider.name());
            Some(position)
        }
        Err(e) => {
            warn!("Geolocation error: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NeverAnswers;

    #[async_trait]
    impl GeolocationProvider for NeverAnswers {
        fn name(&self) -> &'static str {
            "never"
        }

        async fn current_position(&self, _options: &PositionOptions) -> Result<Coordinate> {
            std::future::pending().await
        }
    }

    struct Garbage;

    #[async_trait]
    impl GeolocationProvider for Garbage {
        fn name(&self) -> &'static str {
            "garbage"
        }

        async fn current_position(&self, _options: &PositionOptions) -> Result<Coordinate> {
            Ok(Coordinate {
                lat: f64::NAN,
                lng: 0.0,
            })
        }
    }

    #[test]
    fn test_options_from_config() {
        let mut config = Config::default();
        config.geolocation.timeout_ms = 2_500;
        config.geolocation.high_accuracy = false;

        let options = PositionOptions::from(&config);
        assert_eq!(options.timeout, Duration::from_millis(2_500));
        assert!(!options.high_accuracy);
    }

    #[test]
    fn test_default_options() {
        let options = PositionOptions::default();
        assert!(options.high_accuracy);
        assert_eq!(options.timeout, Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_fixed_position() {
        let here = Coordinate { lat: -33.9, lng: 18.4 };
        let found = locate(&FixedPosition(here), &PositionOptions::default()).await;
        assert_eq!(found, Some(here));
    }

    #[tokio::test]
    async fn test_no_position_degrades_to_none() {
        crate::logging::init_test_logging();
        assert!(locate(&NoPosition, &PositionOptions::default()).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_degrades_to_none() {
        let options = PositionOptions {
            high_accuracy: true,
            timeout: Duration::from_millis(50),
        };
        assert!(locate(&NeverAnswers, &options).await.is_none());
    }

    #[tokio::test]
    async fn test_non_finite_fix_is_rejected() {
        assert!(locate(&Garbage, &PositionOptions::default()).await.is_none());
    }

    #[test]
    fn test_provider_from_config() {
        let mut config = Config::default();
        assert_eq!(provider_from_config(&config).name(), "none");

        config.geolocation.latitude = Some(-26.2);
        config.geolocation.longitude = Some(28.0);
        assert_eq!(provider_from_config(&config).name(), "fixed");
    }
}

//! Map projection of the feed.
//!
//! The map is a pure function of the device location and the current view.
//! It is only produced when a map API key is configured and the device has a
//! fix to center on.

use serde::Serialize;

use crate::alert::{Alert, AlertId, Coordinate};
use crate::config::MapConfig;

/// A single plotted alert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
    /// The alert this marker stands for.
    pub id: AlertId,
    /// Where to draw it.
    pub position: Coordinate,
}

/// Everything a map renderer needs to draw one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapView {
    /// Map center (the device location).
    pub center: Coordinate,
    /// Zoom level.
    pub zoom: u8,
    /// One marker per located alert, in feed order.
    pub markers: Vec<Marker>,
}

/// Builds [`MapView`]s from feed state.
#[derive(Debug, Clone)]
pub struct MapProjection {
    config: MapConfig,
}

impl MapProjection {
    /// Create a projection from explicit map configuration.
    #[must_use]
    pub fn new(config: MapConfig) -> Self {
        Self { config }
    }

    /// Whether an API key is configured.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.config.is_enabled()
    }

    /// The API key to hand to the renderer, if any.
    #[must_use]
    pub fn api_key(&self) -> Option<&str> {
        self.config.api_key()
    }

    /// Project the view onto a map centered on `center`.
    ///
    /// Returns `None` when the map is disabled or there is nothing to center on.
    #[must_use]
    pub fn project(&self, center: Option<Coordinate>, alerts: &[Alert]) -> Option<MapView> {
        if !self.is_enabled() {
            return None;
        }
        let center = center.filter(Coordinate::is_finite)?;

        let markers = alerts
            .iter()
            .filter_map(|alert| {
                alert.plottable_location().map(|position| Marker {
                    id: alert.id.clone(),
                    position,
                })
            })
            .collect();

        Some(MapView {
            center,
            zoom: self.config.zoom,
            markers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::Category;

    fn enabled() -> MapProjection {
        MapProjection::new(MapConfig {
            api_key: Some("test-key".to_string()),
            zoom: 13,
        })
    }

    fn alert(id: &str, location: Option<Coordinate>) -> Alert {
        Alert {
            id: AlertId::new(id),
            description: "x".to_string(),
            category: Category::Other,
            location,
            created_at: None,
        }
    }

    const HERE: Coordinate = Coordinate { lat: -26.2, lng: 28.0 };

    #[test]
    fn test_no_api_key_means_no_map() {
        let projection = MapProjection::new(MapConfig::default());
        assert!(!projection.is_enabled());
        assert!(projection.project(Some(HERE), &[]).is_none());
    }

    #[test]
    fn test_no_center_means_no_map() {
        assert!(enabled().project(None, &[]).is_none());
    }

    #[test]
    fn test_markers_skip_unlocated_alerts() {
        let alerts = [
            alert("a", Some(HERE)),
            alert("b", None),
            alert("c", Some(Coordinate { lat: 0.0, lng: 0.0 })),
        ];

        let view = enabled().project(Some(HERE), &alerts).unwrap();
        assert_eq!(view.center, HERE);
        assert_eq!(view.zoom, 13);
        let ids: Vec<_> = view.markers.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, ["a", "c"]);
    }

    #[test]
    fn test_view_serializes_without_api_key() {
        let view = enabled().project(Some(HERE), &[alert("a", Some(HERE))]).unwrap();
        let json = serde_json::to_string(&view).unwrap();
        assert!(json.contains("\"markers\""));
        assert!(!json.contains("test-key"));
    }
}

//! Core alert types for alertfeed.
//!
//! This module defines the records that flow between the composer, the feed
//! synchronizer and the alert store: the persisted [`Alert`], the locally
//! edited [`Draft`], and the [`NewAlert`] payload handed to the store.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque identifier assigned by the alert store on creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertId(String);

impl AlertId {
    /// Wrap a store-assigned identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AlertId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The kind of incident an alert reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Crime in progress or just reported.
    #[default]
    Crime,
    /// Accidents, road closures, potholes.
    Traffic,
    /// Strikes, protests and civil unrest.
    StrikeUnrest,
    /// Scheduled or unscheduled power cuts.
    Loadshedding,
    /// Anything else.
    Other,
}

impl Category {
    /// Every category, in the order offered to the composer.
    pub const ALL: [Category; 5] = [
        Self::Crime,
        Self::Traffic,
        Self::StrikeUnrest,
        Self::Loadshedding,
        Self::Other,
    ];

    /// The stable wire name of the category.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Crime => "crime",
            Self::Traffic => "traffic",
            Self::StrikeUnrest => "strike_unrest",
            Self::Loadshedding => "loadshedding",
            Self::Other => "other",
        }
    }

    /// Human-readable label for menus.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Crime => "Crime",
            Self::Traffic => "Traffic",
            Self::StrikeUnrest => "Strike/Unrest",
            Self::Loadshedding => "Load Shedding",
            Self::Other => "Other",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a known category.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown alert category: {0}")]
pub struct ParseCategoryError(String);

impl FromStr for Category {
    type Err = ParseCategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "crime" => Ok(Self::Crime),
            "traffic" => Ok(Self::Traffic),
            // Older records were written with the short spelling.
            "strike_unrest" | "strike" | "unrest" => Ok(Self::StrikeUnrest),
            "loadshedding" | "load_shedding" => Ok(Self::Loadshedding),
            "other" => Ok(Self::Other),
            _ => Err(ParseCategoryError(s.to_string())),
        }
    }
}

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
}

impl Coordinate {
    /// Build a coordinate, rejecting non-finite components.
    #[must_use]
    pub fn new(lat: f64, lng: f64) -> Option<Self> {
        let coordinate = Self { lat, lng };
        coordinate.is_finite().then_some(coordinate)
    }

    /// Both components are finite real numbers.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.4}, {:.4})", self.lat, self.lng)
    }
}

/// A persisted alert as observed through the store.
///
/// Alerts are immutable once created. `created_at` is assigned by the store
/// and may be briefly unresolved; such alerts are *pending* and sort ahead of
/// everything else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Store-assigned identifier.
    pub id: AlertId,

    /// What happened.
    pub description: String,

    /// Incident category.
    pub category: Category,

    /// Where it happened, if the record carries a location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Coordinate>,

    /// Server-assigned creation time, if resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Alert {
    /// The store has not resolved a timestamp for this alert yet.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.created_at.is_none()
    }

    /// The location, if present and plottable.
    #[must_use]
    pub fn plottable_location(&self) -> Option<Coordinate> {
        self.location.filter(Coordinate::is_finite)
    }
}

/// The not-yet-submitted alert being edited locally.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Draft {
    /// Free-text description.
    pub description: String,
    /// Selected category.
    pub category: Category,
    /// The current device fix, if any.
    pub location: Option<Coordinate>,
}

impl Draft {
    /// Create a draft with the given fields.
    #[must_use]
    pub fn new(
        description: impl Into<String>,
        category: Category,
        location: Option<Coordinate>,
    ) -> Self {
        Self {
            description: description.into(),
            category,
            location,
        }
    }

    /// The draft has a description and a usable location.
    #[must_use]
    pub fn is_submittable(&self) -> bool {
        !self.description.is_empty() && self.location.is_some_and(|c| c.is_finite())
    }
}

/// The record written to the store on submission.
///
/// There is deliberately no timestamp field: the store stamps `created_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAlert {
    /// Free-text description (non-empty).
    pub description: String,
    /// Incident category.
    pub category: Category,
    /// Where it happened.
    pub location: Coordinate,
}

impl NewAlert {
    /// Build the store payload from a draft, if the draft is submittable.
    #[must_use]
    pub fn from_draft(draft: &Draft) -> Option<Self> {
        if !draft.is_submittable() {
            return None;
        }
        let location = draft.location?;
        Some(Self {
            description: draft.description.clone(),
            category: draft.category,
            location,
        })
    }
}

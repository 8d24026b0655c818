//! Text rendering of the feed.

use std::collections::HashSet;

use chrono::{DateTime, Local, Utc};
use serde::Serialize;

use crate::alert::{Alert, AlertId};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One alert as shown in the feed list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertCard {
    /// Category badge.
    pub label: String,
    /// Local time of creation. Pending alerts show the render time.
    pub time: String,
    /// The alert text.
    pub description: String,
    /// `(lat, lng)` to four decimals, when the alert has a location.
    pub coordinates: Option<String>,
}

impl AlertCard {
    /// Build a card, using `now` in place of an unresolved timestamp.
    #[must_use]
    pub fn new(alert: &Alert, now: DateTime<Utc>) -> Self {
        let created = alert.created_at.unwrap_or(now);
        Self {
            label: alert.category.to_string(),
            time: created
                .with_timezone(&Local)
                .format(TIME_FORMAT)
                .to_string(),
            description: alert.description.clone(),
            coordinates: alert.plottable_location().map(|c| c.to_string()),
        }
    }
}

impl std::fmt::Display for AlertCard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "[{}] {}", self.label, self.time)?;
        write!(f, "  {}", self.description)?;
        if let Some(coordinates) = &self.coordinates {
            write!(f, "\n  {coordinates}")?;
        }
        Ok(())
    }
}

/// Render the whole feed as plain text.
#[must_use]
pub fn render_feed(alerts: &[Alert], now: DateTime<Utc>) -> String {
    let mut out = String::from("Recent Alerts\n-------------\n");
    if alerts.is_empty() {
        out.push_str("No alerts yet.\n");
        return out;
    }
    for alert in alerts {
        out.push_str(&AlertCard::new(alert, now).to_string());
        out.push_str("\n\n");
    }
    out
}

/// Remembers which alerts have been shown, so a live view prints each one once.
///
/// Arrivals are found by id, not by position: an imported alert with an old
/// timestamp lands mid-feed and must still be picked up.
#[derive(Debug, Default)]
pub struct ArrivalTracker {
    seen: HashSet<AlertId>,
}

impl ArrivalTracker {
    /// Start with nothing shown.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Alerts in `view` not returned before, in view order. Marks them shown.
    pub fn arrivals<'a>(&mut self, view: &'a [Alert]) -> Vec<&'a Alert> {
        view.iter()
            .filter(|alert| self.seen.insert(alert.id.clone()))
            .collect()
    }

    /// Number of distinct alerts shown so far.
    #[must_use]
    pub fn shown(&self) -> usize {
        self.seen.len()
    }
}

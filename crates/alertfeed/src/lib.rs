//! `alertfeed` - A live community safety-alert feed
//!
//! This library keeps a local, ordered view of a shared alert collection in
//! sync with its backing store, and lets users post new location-tagged
//! alerts into it.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod alert;
pub mod cli;
pub mod composer;
pub mod config;
pub mod error;
pub mod feed;
pub mod geolocation;
pub mod identity;
pub mod logging;
pub mod map;
pub mod render;
pub mod store;

pub use alert::{Alert, AlertId, Category, Coordinate, Draft, NewAlert};
pub use composer::Composer;
pub use config::Config;
pub use error::{Error, Result};
pub use feed::{FeedHandle, FeedSynchronizer, FeedView, SkipReason, SubmitOutcome};
pub use identity::{AnonymousIdentity, IdentityProvider, SessionToken};
pub use logging::init_logging;
pub use map::{MapProjection, MapView};
pub use render::{render_feed, AlertCard, ArrivalTracker};
pub use store::{AlertStore, SqliteAlertStore, StoreStats, Subscription};

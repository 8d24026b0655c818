//! The composer: local draft editing and the in-flight flag.
//!
//! A [`Composer`] is a cheap, cloneable handle so input handlers and the post
//! action can share it. It owns the single-writer `posting` flag that keeps
//! one draft from being submitted twice concurrently; the feed synchronizer
//! itself does no deduplication.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::alert::{Category, Coordinate, Draft};
use crate::error::{Error, Result};
use crate::feed::{FeedSynchronizer, SkipReason, SubmitOutcome};

#[derive(Debug, Default)]
struct ComposerState {
    draft: Draft,
    posting: bool,
}

/// Shared handle to the draft being composed.
#[derive(Debug, Clone, Default)]
pub struct Composer {
    state: Arc<Mutex<ComposerState>>,
}

impl Composer {
    /// Create an empty composer (category `crime`, no location).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the description text.
    ///
    /// # Errors
    ///
    /// Returns an error if the composer state is poisoned.
    pub fn set_description(&self, description: impl Into<String>) -> Result<()> {
        self.lock()?.draft.description = description.into();
        Ok(())
    }

    /// Select a category.
    ///
    /// # Errors
    ///
    /// Returns an error if the composer state is poisoned.
    pub fn set_category(&self, category: Category) -> Result<()> {
        self.lock()?.draft.category = category;
        Ok(())
    }

    /// Record the device fix (or its absence).
    ///
    /// # Errors
    ///
    /// Returns an error if the composer state is poisoned.
    pub fn set_location(&self, location: Option<Coordinate>) -> Result<()> {
        self.lock()?.draft.location = location;
        Ok(())
    }

    /// A copy of the current draft.
    ///
    /// # Errors
    ///
    /// Returns an error if the composer state is poisoned.
    pub fn draft(&self) -> Result<Draft> {
        Ok(self.lock()?.draft.clone())
    }

    /// A post is currently in flight.
    #[must_use]
    pub fn is_posting(&self) -> bool {
        self.lock().is_ok_and(|s| s.posting)
    }

    /// Whether the post action should be enabled.
    #[must_use]
    pub fn can_post(&self) -> bool {
        self.lock()
            .is_ok_and(|s| !s.posting && s.draft.is_submittable())
    }

    /// Submit the draft through the feed.
    ///
    /// The description is cleared only once the store has accepted the alert;
    /// on failure it is left as typed so the user can retry.
    ///
    /// # Errors
    ///
    /// Returns the submission error from the feed.
    pub async fn post(&self, feed: &FeedSynchronizer) -> Result<SubmitOutcome> {
        let draft = {
            let mut state = self.lock()?;
            if state.posting {
                debug!("Post already in flight, ignoring");
                return Ok(SubmitOutcome::Skipped(SkipReason::InFlight));
            }
            state.posting = true;
            state.draft.clone()
        };

        let result = feed.submit(&draft).await;

        let mut state = self.lock()?;
        state.posting = false;
        if matches!(result, Ok(SubmitOutcome::Submitted(_))) {
            state.draft.description.clear();
        }
        result
    }

    fn lock(&self) -> Result<MutexGuard<'_, ComposerState>> {
        self.state
            .lock()
            .map_err(|_| Error::internal("composer state lock poisoned"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::alert::{AlertId, NewAlert};
    use crate::store::{AlertStore, Subscription};

    /// Accepts appends after yielding once, or fails them on request.
    #[derive(Default)]
    struct SlowStore {
        appends: AtomicUsize,
        fail: AtomicBool,
    }

    #[async_trait]
    impl AlertStore for SlowStore {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn subscribe_ordered(&self) -> Result<Subscription> {
            Ok(Subscription::channel().1)
        }

        async fn append(&self, _record: NewAlert) -> Result<AlertId> {
            tokio::task::yield_now().await;
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::append("network unreachable"));
            }
            let n = self.appends.fetch_add(1, Ordering::SeqCst);
            Ok(AlertId::new(n.to_string()))
        }
    }

    fn setup() -> (Arc<SlowStore>, FeedSynchronizer, Composer) {
        let store = Arc::new(SlowStore::default());
        let feed = FeedSynchronizer::new(store.clone());
        let composer = Composer::new();
        composer.set_location(Coordinate::new(-26.2, 28.0)).unwrap();
        (store, feed, composer)
    }

    #[test]
    fn test_new_composer_defaults() {
        let composer = Composer::new();
        let draft = composer.draft().unwrap();
        assert_eq!(draft.category, Category::Crime);
        assert!(draft.description.is_empty());
        assert!(draft.location.is_none());
        assert!(!composer.can_post());
    }

    #[test]
    fn test_can_post_needs_description_and_location() {
        let composer = Composer::new();
        composer.set_description("Pothole").unwrap();
        assert!(!composer.can_post());

        composer.set_location(Coordinate::new(1.0, 1.0)).unwrap();
        assert!(composer.can_post());

        composer.set_description("").unwrap();
        assert!(!composer.can_post());
    }

    #[tokio::test]
    async fn test_post_clears_description_on_success() {
        let (store, feed, composer) = setup();
        composer.set_category(Category::Traffic).unwrap();
        composer.set_description("Pothole").unwrap();

        let outcome = composer.post(&feed).await.unwrap();
        assert!(outcome.id().is_some());
        assert_eq!(store.appends.load(Ordering::SeqCst), 1);

        let draft = composer.draft().unwrap();
        assert!(draft.description.is_empty());
        assert_eq!(draft.category, Category::Traffic);
        assert!(draft.location.is_some());
        assert!(!composer.is_posting());
    }

    #[tokio::test]
    async fn test_post_keeps_description_on_failure() {
        let (store, feed, composer) = setup();
        store.fail.store(true, Ordering::SeqCst);
        composer.set_description("Hijacking on N1").unwrap();

        assert!(composer.post(&feed).await.is_err());
        assert_eq!(composer.draft().unwrap().description, "Hijacking on N1");
        assert!(!composer.is_posting());
        assert!(composer.can_post());
    }

    #[tokio::test]
    async fn test_overlapping_posts_submit_once() {
        let (store, feed, composer) = setup();
        composer.set_description("Protest").unwrap();

        let other = composer.clone();
        let (first, second) = tokio::join!(composer.post(&feed), other.post(&feed));

        assert!(first.unwrap().id().is_some());
        assert_eq!(
            second.unwrap(),
            SubmitOutcome::Skipped(SkipReason::InFlight)
        );
        assert_eq!(store.appends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_post_incomplete_draft_is_skipped() {
        let (store, feed, composer) = setup();

        let outcome = composer.post(&feed).await.unwrap();
        assert_eq!(outcome, SubmitOutcome::Skipped(SkipReason::EmptyDescription));
        assert_eq!(store.appends.load(Ordering::SeqCst), 0);
    }
}

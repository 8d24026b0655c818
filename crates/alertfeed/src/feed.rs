//! The feed synchronizer.
//!
//! [`FeedSynchronizer`] sits between an [`AlertStore`]'s push stream and the
//! presentation layer. It owns the only copy of the displayed view and
//! replaces it wholesale on every push; it never patches, merges or inserts
//! optimistically. New alerts go through [`FeedSynchronizer::submit`] and
//! only show up in the view once the store pushes them back.
//!
//! ```text
//! {unsubscribed} --subscribe--> {subscribed, view=[]} --push*--> {subscribed, view=V}
//!       ^                                                               |
//!       +------------------- unsubscribe / store closed ----------------+
//! ```

use std::cmp::Reverse;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::alert::{Alert, AlertId, Draft, NewAlert};
use crate::error::{Error, Result};
use crate::store::{AlertStore, Snapshot, Subscription};

/// The ordered, immutable view handed to subscribers.
pub type FeedView = Arc<[Alert]>;

/// Why a submission was not sent to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The draft has no description.
    EmptyDescription,
    /// There is no location fix.
    MissingLocation,
    /// Another submission from the same composer is still in flight.
    InFlight,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyDescription => write!(f, "description is empty"),
            Self::MissingLocation => write!(f, "no location fix"),
            Self::InFlight => write!(f, "a post is already in flight"),
        }
    }
}

/// Result of a submission attempt that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The store durably accepted the alert under this id.
    Submitted(AlertId),
    /// Preconditions were not met; the store was not called.
    Skipped(SkipReason),
}

impl SubmitOutcome {
    /// The id assigned by the store, if the alert was submitted.
    #[must_use]
    pub fn id(&self) -> Option<&AlertId> {
        match self {
            Self::Submitted(id) => Some(id),
            Self::Skipped(_) => None,
        }
    }
}

#[derive(Debug)]
struct FeedState {
    view: FeedView,
    subscribed: bool,
    generation: u64,
}

impl FeedState {
    /// Leave the subscribed state if `generation` is still the live one.
    fn release(&mut self, generation: u64) -> bool {
        if self.subscribed && self.generation == generation {
            self.subscribed = false;
            return true;
        }
        false
    }
}

/// Bridges an alert store's snapshot stream to a renderable view.
pub struct FeedSynchronizer {
    store: Arc<dyn AlertStore>,
    state: Arc<Mutex<FeedState>>,
}

impl std::fmt::Debug for FeedSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedSynchronizer")
            .field("store", &self.store.name())
            .field("state", &self.state)
            .finish()
    }
}

impl FeedSynchronizer {
    /// Create a synchronizer over the given store. Nothing is opened until
    /// [`subscribe`](Self::subscribe) is called.
    #[must_use]
    pub fn new(store: Arc<dyn AlertStore>) -> Self {
        Self {
            store,
            state: Arc::new(Mutex::new(FeedState {
                view: Arc::from(Vec::new()),
                subscribed: false,
                generation: 0,
            })),
        }
    }

    /// Open the live subscription.
    ///
    /// `on_update` receives the full ordered view after every push, starting
    /// with the store's initial snapshot. The returned handle must be kept
    /// for as long as the feed is shown; unsubscribing (or dropping it)
    /// releases the store connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadySubscribed`] if a subscription is open, or the
    /// store's error if it refuses the subscription. Failures are not retried.
    pub async fn subscribe<F>(&self, on_update: F) -> Result<FeedHandle>
    where
        F: FnMut(&FeedView) + Send + 'static,
    {
        let generation = {
            let mut state = lock(&self.state)?;
            if state.subscribed {
                return Err(Error::AlreadySubscribed);
            }
            state.subscribed = true;
            state.generation += 1;
            state.view = Arc::from(Vec::new());
            state.generation
        };

        let subscription = match self.store.subscribe_ordered().await {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!(
                    "Could not subscribe to {} alert store: {}",
                    self.store.name(),
                    e
                );
                lock(&self.state)?.release(generation);
                return Err(e);
            }
        };

        info!("Subscribed to {} alert store", self.store.name());
        let task = tokio::spawn(pump(
            subscription,
            Arc::clone(&self.state),
            generation,
            on_update,
        ));

        Ok(FeedHandle {
            task: Some(task),
            state: Arc::clone(&self.state),
            generation,
        })
    }

    /// Submit a draft as a new alert.
    ///
    /// Incomplete drafts are skipped without touching the store. The view is
    /// not updated here; the new alert appears with the store's next push.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the append fails. The draft is only
    /// borrowed, so the caller still holds it for a retry.
    pub async fn submit(&self, draft: &Draft) -> Result<SubmitOutcome> {
        let Some(record) = NewAlert::from_draft(draft) else {
            let reason = if draft.description.is_empty() {
                SkipReason::EmptyDescription
            } else {
                SkipReason::MissingLocation
            };
            debug!("Not submitting draft: {}", reason);
            return Ok(SubmitOutcome::Skipped(reason));
        };

        let category = record.category;
        match self.store.append(record).await {
            Ok(id) => {
                info!("Posted {} alert {}", category, id);
                Ok(SubmitOutcome::Submitted(id))
            }
            Err(e) => {
                error!("Failed to post alert: {}", e);
                Err(e)
            }
        }
    }

    /// The current ordered view. Empty until the first push arrives.
    #[must_use]
    pub fn view(&self) -> FeedView {
        lock(&self.state).map_or_else(|_| Arc::from(Vec::new()), |s| Arc::clone(&s.view))
    }

    /// Whether a live subscription is open.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        lock(&self.state).is_ok_and(|s| s.subscribed)
    }
}

/// Handle to an open feed subscription.
///
/// Call [`unsubscribe`](Self::unsubscribe) when the view is torn down.
/// Dropping the handle has the same effect.
#[derive(Debug)]
pub struct FeedHandle {
    task: Option<JoinHandle<()>>,
    state: Arc<Mutex<FeedState>>,
    generation: u64,
}

impl FeedHandle {
    /// Release the subscription.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    /// Wait until the subscription ends on its own, either because the store
    /// closed it or because the update callback panicked.
    pub async fn closed(&mut self) {
        let Some(task) = self.task.as_mut() else {
            return;
        };
        let result = task.await;
        self.task = None;

        if let Err(e) = result {
            error!("Feed update task failed: {}", e);
            if let Ok(mut state) = self.state.lock() {
                if state.release(self.generation) {
                    warn!("Feed is frozen until resubscribed");
                }
            }
        }
    }

    fn release(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        task.abort();
        if let Ok(mut state) = self.state.lock() {
            if state.release(self.generation) {
                debug!("Unsubscribed from alert store");
            }
        }
    }
}

impl Drop for FeedHandle {
    fn drop(&mut self) {
        self.release();
    }
}

/// Order a snapshot for display: pending alerts first, then newest first.
///
/// The sort is stable, so the store's order breaks ties.
#[must_use]
pub fn order_snapshot(mut snapshot: Snapshot) -> Snapshot {
    snapshot.sort_by_key(|alert| Reverse((alert.is_pending(), alert.created_at)));
    snapshot
}

/// Drive one subscription: replace the view on every push.
async fn pump<F>(
    mut subscription: Subscription,
    state: Arc<Mutex<FeedState>>,
    generation: u64,
    mut on_update: F,
) where
    F: FnMut(&FeedView) + Send + 'static,
{
    while let Some(snapshot) = subscription.recv().await {
        let view: FeedView = Arc::from(order_snapshot(snapshot));
        {
            let Ok(mut guard) = state.lock() else {
                error!("Feed state lock poisoned, dropping subscription");
                return;
            };
            if guard.generation != generation || !guard.subscribed {
                return;
            }
            guard.view = Arc::clone(&view);
        }
        debug!("Feed view replaced with {} alerts", view.len());
        on_update(&view);
    }

    // No automatic resume: the last view stays up and the caller may resubscribe.
    if let Ok(mut guard) = state.lock() {
        if guard.release(generation) {
            warn!("Alert store closed the subscription; feed is frozen until resubscribed");
        }
    }
}

fn lock(state: &Mutex<FeedState>) -> Result<MutexGuard<'_, FeedState>> {
    state
        .lock()
        .map_err(|_| Error::internal("feed state lock poisoned"))
}

use std::sync::Arc;

use chrono::Duration;
use futures::StreamExt as _;
use serde::Serialize;
use snafu::{Location, ResultExt as _, Snafu};
use tokio::select;
use tokio::sync::watch;
use tracing::instrument;

use crate::model::{StoredCount, VisitorId};
use crate::store::{Claim, CountUpdates, LikeStore, StoreError};
use crate::time::{self, Clock, SystemClock, Timestamp};

pub use subscription::Subscription;

mod subscription;

/// Minimum time between two accepted likes from the same visitor.
pub const COOLDOWN: Duration = Duration::minutes(5);

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum LikeError {
    #[snafu(display("could not read the like count at {location}: {source}"))]
    ReadCount {
        source: StoreError,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("could not subscribe to the like count at {location}: {source}"))]
    Subscribe {
        source: StoreError,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("could not read the cooldown of visitor `{visitor}` at {location}: {source}"))]
    ReadVisitor {
        visitor: VisitorId,
        source: StoreError,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("could not claim the cooldown of visitor `{visitor}` at {location}: {source}"))]
    Claim {
        visitor: VisitorId,
        source: StoreError,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display(
        "claimed the cooldown of visitor `{visitor}` but could not increment the like count at {location}: {source}"
    ))]
    Increment {
        visitor: VisitorId,
        source: StoreError,
        #[snafu(implicit)]
        location: Location,
    },
}

/// Whether a visitor may like right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownStatus {
    pub remaining: Option<Duration>,
}

impl CooldownStatus {
    pub const UNLOCKED: CooldownStatus = CooldownStatus { remaining: None };

    /// The status of a visitor whose last accepted like was at `last_like`.
    pub fn since(last_like: Timestamp, now: Timestamp, cooldown: Duration) -> Self {
        let remaining = cooldown - (now - last_like);

        if remaining > Duration::zero() {
            Self {
                remaining: Some(remaining),
            }
        } else {
            Self::UNLOCKED
        }
    }

    pub fn locked(&self) -> bool {
        self.remaining.is_some()
    }

    pub fn remaining_ms(&self) -> Option<i64> {
        self.remaining.map(|remaining| remaining.num_milliseconds())
    }

    /// The remaining time as `minutes:seconds`, for display.
    pub fn countdown(&self) -> Option<String> {
        self.remaining.map(time::countdown)
    }
}

impl Serialize for CooldownStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct as _;

        let mut state = serializer.serialize_struct("CooldownStatus", 3)?;
        state.serialize_field("locked", &self.locked())?;
        state.serialize_field("remaining_ms", &self.remaining_ms())?;
        state.serialize_field("remaining", &self.countdown())?;
        state.end()
    }
}

/// Result of a like attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeOutcome {
    /// The like was counted; `count` is the global count right after it.
    Accepted { count: u64 },
    /// The visitor's cooldown is still running and nothing was written.
    Rejected { cooldown: CooldownStatus },
}

/// Gates and records likes from anonymous visitors, and exposes the live global count.
#[derive(Debug)]
pub struct LikeCounter<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    cooldown: Duration,
}

impl<S> Clone for LikeCounter<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            clock: self.clock.clone(),
            cooldown: self.cooldown,
        }
    }
}

impl<S: LikeStore> LikeCounter<S> {
    pub fn new(store: S) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: Arc::new(store),
            clock,
            cooldown: COOLDOWN,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Read the global count once, normalizing anything invalid to zero.
    #[instrument(skip(self))]
    pub async fn count(&self) -> Result<u64, LikeError> {
        let stored = self.store.count().await.context(ReadCountSnafu)?;
        Ok(normalize(&*self.store, stored).await)
    }

    /// Follow the global count until the returned [Subscription] is dropped.
    #[instrument(skip(self))]
    pub async fn subscribe(&self) -> Result<Subscription, LikeError> {
        let mut updates = self.store.watch_count().await.context(SubscribeSnafu)?;

        let initial = match updates.next().await {
            Some(stored) => stored.context(SubscribeSnafu)?,
            None => StoredCount::Missing,
        };
        let initial = normalize(&*self.store, initial).await;

        tracing::debug!(count = initial, "subscribed to the like count");

        let store = self.store.clone();
        let subscription = Subscription::spawn(initial, |sender, stop| {
            follow(store, updates, sender, stop)
        });

        Ok(subscription)
    }

    /// Whether `visitor` is still in their cooldown, and for how long.
    #[instrument(skip(self))]
    pub async fn cooldown_status(&self, visitor: &VisitorId) -> Result<CooldownStatus, LikeError> {
        let record = self
            .store
            .visitor(visitor)
            .await
            .context(ReadVisitorSnafu { visitor: visitor.clone() })?;

        let status = match record {
            Some(record) => CooldownStatus::since(record.last_like(), self.clock.now(), self.cooldown),
            None => CooldownStatus::UNLOCKED,
        };

        Ok(status)
    }

    /// Like on behalf of `visitor`.
    ///
    /// The visitor's cooldown is claimed first and the global count is only incremented once the
    /// claim committed. If the increment then fails the visitor stays locked for the cooldown
    /// without their like being counted.
    #[instrument(skip(self))]
    pub async fn attempt_like(&self, visitor: &VisitorId) -> Result<LikeOutcome, LikeError> {
        let now = self.clock.now();

        let claim = self
            .store
            .claim(visitor, now, self.cooldown)
            .await
            .context(ClaimSnafu { visitor: visitor.clone() })?;

        if let Claim::Rejected { last_like } = claim {
            let cooldown = CooldownStatus::since(last_like, now, self.cooldown);
            tracing::debug!(%visitor, remaining_ms = ?cooldown.remaining_ms(), "rejected like, cooldown is active");
            return Ok(LikeOutcome::Rejected { cooldown });
        }

        let count = match self.store.increment().await {
            Ok(count) => count,
            Err(error) => {
                tracing::warn!(%visitor, %error, "cooldown was claimed but the like was not counted");
                return Err(error).context(IncrementSnafu { visitor: visitor.clone() });
            }
        };

        tracing::info!(%visitor, count, "accepted like");
        Ok(LikeOutcome::Accepted { count })
    }
}

/// The count to show for `stored`. Invalid content is shown as zero and corrected in the store
/// on a best-effort basis.
async fn normalize<S: LikeStore>(store: &S, stored: StoredCount) -> u64 {
    if let Some(count) = stored.count() {
        return count;
    }

    tracing::info!(?stored, "like count is missing or malformed, resetting it to zero");

    match store.reset_count(&stored).await {
        Ok(true) => {}
        Ok(false) => tracing::debug!("another writer corrected the like count first"),
        Err(error) => tracing::warn!(%error, "could not reset the like count"),
    }

    0
}

async fn follow<S: LikeStore>(
    store: Arc<S>, mut updates: CountUpdates, sender: watch::Sender<u64>,
    mut stop: tokio::sync::oneshot::Receiver<()>,
) {
    loop {
        select! {
            _ = &mut stop => {
                tracing::debug!("unsubscribed from the like count");
                break;
            }

            update = updates.next() => {
                let stored = match update {
                    None => {
                        tracing::info!("like count subscription closed by the store");
                        break;
                    }
                    Some(Err(error)) => {
                        tracing::warn!(%error, "could not receive like count update");
                        continue;
                    }
                    Some(Ok(stored)) => stored,
                };

                let count = normalize(&*store, stored).await;
                sender.send_if_modified(|current| {
                    let changed = *current != count;
                    *current = count;
                    changed
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VisitorLike;
    use crate::store::{self, EmptyResponseSnafu, MemoryStore};
    use crate::time::{from_millis, ManualClock};

    /// A store that accepts claims but can never count them.
    #[derive(Debug, Default)]
    struct BrokenCount {
        inner: MemoryStore,
    }

    impl LikeStore for BrokenCount {
        async fn count(&self) -> store::Result<StoredCount> {
            self.inner.count().await
        }

        async fn watch_count(&self) -> store::Result<CountUpdates> {
            self.inner.watch_count().await
        }

        async fn reset_count(&self, observed: &StoredCount) -> store::Result<bool> {
            self.inner.reset_count(observed).await
        }

        async fn increment(&self) -> store::Result<u64> {
            EmptyResponseSnafu { key: "likes:count" }.fail()
        }

        async fn visitor(&self, visitor: &VisitorId) -> store::Result<Option<VisitorLike>> {
            self.inner.visitor(visitor).await
        }

        async fn claim(
            &self, visitor: &VisitorId, now: Timestamp, cooldown: Duration,
        ) -> store::Result<Claim> {
            self.inner.claim(visitor, now, cooldown).await
        }
    }

    #[tokio::test]
    async fn failed_increment_keeps_the_claim() {
        let clock = Arc::new(ManualClock::at_millis(0));
        let counter = LikeCounter::with_clock(BrokenCount::default(), clock);
        let visitor: VisitorId = "alice".parse().unwrap();

        let result = counter.attempt_like(&visitor).await;
        assert!(matches!(result, Err(LikeError::Increment { .. })));

        assert_eq!(
            counter.store().inner.visitor(&visitor).await.unwrap(),
            Some(VisitorLike::new(0)),
            "the claim is not rolled back"
        );
        assert_eq!(counter.store().inner.raw_count(), None);

        let outcome = counter.attempt_like(&visitor).await.unwrap();
        assert!(
            matches!(outcome, LikeOutcome::Rejected { .. }),
            "the visitor stays locked for the cooldown"
        );
    }

    #[test]
    fn status_locked_within_cooldown() {
        let status = CooldownStatus::since(from_millis(0), from_millis(100_000), COOLDOWN);
        assert!(status.locked());
        assert_eq!(status.remaining_ms(), Some(200_000));
        assert_eq!(status.countdown().as_deref(), Some("3:20"));
    }

    #[test]
    fn status_unlocked_once_cooldown_elapsed() {
        let status = CooldownStatus::since(from_millis(0), from_millis(300_000), COOLDOWN);
        assert_eq!(status, CooldownStatus::UNLOCKED);
        assert_eq!(status.countdown(), None);
    }

    #[test]
    fn status_serializes_for_display() {
        let status = CooldownStatus::since(from_millis(0), from_millis(298_500), COOLDOWN);
        assert_eq!(
            serde_json::to_value(status).unwrap(),
            serde_json::json!({ "locked": true, "remaining_ms": 1_500, "remaining": "0:02" })
        );

        assert_eq!(
            serde_json::to_value(CooldownStatus::UNLOCKED).unwrap(),
            serde_json::json!({ "locked": false, "remaining_ms": null, "remaining": null })
        );
    }
}

use chrono::Duration;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::StreamExt as _;
use serde_json::Value;
use tokio::sync::watch;

use super::{cooldown_elapsed, Claim, CountUpdates, LikeStore, Result};
use crate::model::{StoredCount, VisitorId, VisitorLike};
use crate::time::Timestamp;

/// An in-process [LikeStore].
///
/// The count lives in a [watch] channel so every write is pushed to subscribers, and visitor
/// records live in a [DashMap] whose entry lock makes the cooldown claim atomic per visitor.
#[derive(Debug)]
pub struct MemoryStore {
    count: watch::Sender<Option<Value>>,
    visitors: DashMap<VisitorId, VisitorLike>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_raw_count(None)
    }

    /// Start with arbitrary content in the count slot, as another writer of a shared store might leave it.
    pub fn with_raw_count(value: Option<Value>) -> Self {
        let (count, _) = watch::channel(value);

        Self {
            count,
            visitors: DashMap::new(),
        }
    }

    /// Overwrite the count slot without any checks.
    pub fn overwrite_count(&self, value: Option<Value>) {
        self.count.send_replace(value);
    }

    pub fn raw_count(&self) -> Option<Value> {
        self.count.borrow().clone()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LikeStore for MemoryStore {
    async fn count(&self) -> Result<StoredCount> {
        Ok(StoredCount::from_value(self.count.borrow().as_ref()))
    }

    async fn watch_count(&self) -> Result<CountUpdates> {
        let receiver = self.count.subscribe();

        let updates = futures::stream::unfold((receiver, true), |(mut receiver, first)| async move {
            if !first {
                receiver.changed().await.ok()?;
            }

            let stored = StoredCount::from_value(receiver.borrow_and_update().as_ref());
            Some((Ok(stored), (receiver, false)))
        });

        Ok(updates.boxed())
    }

    async fn reset_count(&self, observed: &StoredCount) -> Result<bool> {
        if observed.is_valid() {
            return Ok(false);
        }

        let written = self.count.send_if_modified(|value| {
            if StoredCount::from_value(value.as_ref()) != *observed {
                return false;
            }

            *value = Some(Value::from(0u64));
            true
        });

        Ok(written)
    }

    async fn increment(&self) -> Result<u64> {
        let mut next = 0;

        self.count.send_modify(|value| {
            next = StoredCount::from_value(value.as_ref()).normalized() + 1;
            *value = Some(Value::from(next));
        });

        Ok(next)
    }

    async fn visitor(&self, visitor: &VisitorId) -> Result<Option<VisitorLike>> {
        Ok(self.visitors.get(visitor).map(|record| *record))
    }

    async fn claim(&self, visitor: &VisitorId, now: Timestamp, cooldown: Duration) -> Result<Claim> {
        match self.visitors.entry(visitor.clone()) {
            Entry::Occupied(mut entry) => {
                let last_like = entry.get().last_like();
                if !cooldown_elapsed(last_like, now, cooldown) {
                    return Ok(Claim::Rejected { last_like });
                }

                entry.insert(VisitorLike::at(now));
            }
            Entry::Vacant(entry) => {
                entry.insert(VisitorLike::at(now));
            }
        }

        Ok(Claim::Accepted)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::time::from_millis;

    fn visitor(name: &str) -> VisitorId {
        name.parse().unwrap()
    }

    #[tokio::test]
    async fn increment_starts_from_zero() {
        let store = MemoryStore::new();

        assert_eq!(store.count().await.unwrap(), StoredCount::Missing);
        assert_eq!(store.increment().await.unwrap(), 1);
        assert_eq!(store.increment().await.unwrap(), 2);
        assert_eq!(store.raw_count(), Some(json!(2)));
    }

    #[tokio::test]
    async fn increment_treats_malformed_count_as_zero() {
        let store = MemoryStore::with_raw_count(Some(json!("many")));
        assert_eq!(store.increment().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn reset_only_replaces_the_observed_value() {
        let store = MemoryStore::with_raw_count(Some(json!("many")));
        let observed = store.count().await.unwrap();

        store.overwrite_count(Some(json!(7)));
        assert!(
            !store.reset_count(&observed).await.unwrap(),
            "another writer fixed the count first, the reset must not clobber it"
        );
        assert_eq!(store.raw_count(), Some(json!(7)));

        store.overwrite_count(Some(json!("many")));
        assert!(store.reset_count(&observed).await.unwrap());
        assert_eq!(store.raw_count(), Some(json!(0)));
    }

    #[tokio::test]
    async fn reset_never_touches_a_valid_count() {
        let store = MemoryStore::with_raw_count(Some(json!(3)));
        assert!(!store.reset_count(&StoredCount::Count(3)).await.unwrap());
        assert_eq!(store.raw_count(), Some(json!(3)));
    }

    #[tokio::test]
    async fn watch_yields_current_value_then_changes() {
        let store = MemoryStore::with_raw_count(Some(json!(5)));
        let mut updates = store.watch_count().await.unwrap();

        assert_eq!(updates.next().await.unwrap().unwrap(), StoredCount::Count(5));

        store.increment().await.unwrap();
        assert_eq!(updates.next().await.unwrap().unwrap(), StoredCount::Count(6));
    }

    #[tokio::test]
    async fn claim_respects_cooldown() {
        let store = MemoryStore::new();
        let alice = visitor("alice");
        let cooldown = Duration::minutes(5);

        let claim = store.claim(&alice, from_millis(0), cooldown).await.unwrap();
        assert_eq!(claim, Claim::Accepted);
        assert_eq!(
            store.visitor(&alice).await.unwrap(),
            Some(VisitorLike::new(0))
        );

        let claim = store.claim(&alice, from_millis(299_999), cooldown).await.unwrap();
        assert_eq!(
            claim,
            Claim::Rejected {
                last_like: from_millis(0)
            }
        );

        let claim = store.claim(&alice, from_millis(300_000), cooldown).await.unwrap();
        assert_eq!(claim, Claim::Accepted, "a cooldown of exactly 5 minutes has elapsed");
        assert_eq!(
            store.visitor(&alice).await.unwrap(),
            Some(VisitorLike::new(300_000))
        );
    }
}

//! Persistence for the like counter.
//!
//! The global count and the visitor cooldowns are owned by a realtime key-value store; the
//! service itself keeps no durable state. [LikeStore] is the seam between the two, with a
//! SurrealDB implementation for deployments and an in-process one built on `dashmap`.

use std::future::Future;

use chrono::Duration;
use futures::stream::BoxStream;
use snafu::{Location, Snafu};

use crate::database::DatabaseQueryError;
use crate::model::{StoredCount, VisitorId, VisitorLike};
use crate::time::Timestamp;

pub use memory::MemoryStore;
pub use surreal::SurrealStore;

mod memory;
mod surreal;

pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Stream of the global count: the current content first, then every change.
pub type CountUpdates = BoxStream<'static, Result<StoredCount>>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    #[snafu(display("failed to query the like store at {location}: {source}"))]
    Query {
        source: DatabaseQueryError,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("failed to open a live query on `{table}` at {location}: {source}"))]
    Subscribe {
        table: &'static str,
        source: surrealdb::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("the like store returned no record for `{key}` at {location}"))]
    EmptyResponse {
        key: String,
        #[snafu(implicit)]
        location: Location,
    },
}

/// Outcome of trying to claim a visitor's cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// The visitor record now holds the claim time.
    Accepted,
    /// The cooldown is still running; nothing was written.
    Rejected { last_like: Timestamp },
}

pub trait LikeStore: Send + Sync + 'static {
    /// Read the global count once.
    fn count(&self) -> impl Future<Output = Result<StoredCount>> + Send;

    /// Subscribe to the global count. The stream yields the current content immediately.
    fn watch_count(&self) -> impl Future<Output = Result<CountUpdates>> + Send;

    /// Replace an invalid count with zero, but only if the slot still holds `observed`.
    ///
    /// Returns whether the write happened. Losing the race to another writer is not an error.
    fn reset_count(&self, observed: &StoredCount) -> impl Future<Output = Result<bool>> + Send;

    /// Atomically add one to the global count and return the new value.
    ///
    /// A missing or malformed count is treated as zero.
    fn increment(&self) -> impl Future<Output = Result<u64>> + Send;

    /// Read a visitor's cooldown record.
    fn visitor(&self, visitor: &VisitorId) -> impl Future<Output = Result<Option<VisitorLike>>> + Send;

    /// Record `now` as the visitor's last like if they have none or `cooldown` has elapsed since it.
    ///
    /// The check and the write are atomic against concurrent claims for the same visitor.
    fn claim(
        &self, visitor: &VisitorId, now: Timestamp, cooldown: Duration,
    ) -> impl Future<Output = Result<Claim>> + Send;
}

/// Whether a like at `now` is allowed after one at `last_like`.
pub(crate) fn cooldown_elapsed(last_like: Timestamp, now: Timestamp, cooldown: Duration) -> bool {
    now - last_like >= cooldown
}

use chrono::Duration;
use futures::StreamExt as _;
use serde::Deserialize;
use serde_json::Value;
use snafu::{OptionExt as _, ResultExt as _};
use surrealdb::{Action, Notification};
use tracing::instrument;

use super::{
    Claim, CountUpdates, EmptyResponseSnafu, LikeStore, QuerySnafu, Result, SubscribeSnafu,
};
use crate::database::{query, Database, Sql as _};
use crate::model::{StoredCount, VisitorId, VisitorLike};
use crate::time::Timestamp;

const COUNT_TABLE: &str = "likes";

/// The count record as it appears in the `likes` table. `value` is left untyped on purpose
/// since the table is schemaless.
#[derive(Debug, Deserialize)]
struct CountRecord {
    #[serde(default)]
    value: Option<Value>,
}

impl CountRecord {
    fn stored(&self) -> StoredCount {
        StoredCount::from_value(self.value.as_ref())
    }
}

/// The count after a change to the `likes` table. A deleted record reads as missing whatever
/// the notification carries.
fn change(action: Action, data: &Value) -> Option<StoredCount> {
    match action {
        Action::Create | Action::Update => Some(StoredCount::from_value(data.get("value"))),
        Action::Delete => Some(StoredCount::Missing),
        _ => None,
    }
}

/// A [LikeStore] backed by SurrealDB.
///
/// The count is the record `likes:count` and each visitor is a record in `like_users`.
#[derive(Debug, Clone)]
pub struct SurrealStore {
    database: Database,
}

impl SurrealStore {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

impl LikeStore for SurrealStore {
    #[instrument(skip(self))]
    async fn count(&self) -> Result<StoredCount> {
        let values: Vec<Value> = self
            .database
            .sql("SELECT VALUE value FROM likes:count")
            .fetch_first()
            .await
            .context(QuerySnafu)?;

        Ok(StoredCount::from_value(values.first()))
    }

    #[instrument(skip(self))]
    async fn watch_count(&self) -> Result<CountUpdates> {
        // open the live query before reading, so no write can fall in between
        let live = self
            .database
            .select::<Vec<Value>>(COUNT_TABLE)
            .live()
            .into_owned()
            .await
            .context(SubscribeSnafu { table: COUNT_TABLE })?;

        let current = self.count().await?;

        let changes = live.filter_map(|notification| async move {
            match notification {
                Ok(Notification { action, data, .. }) => change(action, &data).map(Ok),
                Err(error) => {
                    tracing::warn!(%error, "could not receive like count event");
                    None
                }
            }
        });

        Ok(futures::stream::once(async move { Ok(current) })
            .chain(changes)
            .boxed())
    }

    #[instrument(skip(self))]
    async fn reset_count(&self, observed: &StoredCount) -> Result<bool> {
        if observed.is_valid() {
            return Ok(false);
        }

        let written: Vec<CountRecord> = self
            .database
            .sql("UPDATE likes:count SET value = 0 WHERE value = $observed RETURN AFTER")
            .bind(("observed", observed.as_value()))
            .fetch_first()
            .await
            .context(QuerySnafu)?;

        Ok(!written.is_empty())
    }

    #[instrument(skip(self))]
    async fn increment(&self) -> Result<u64> {
        let records: Vec<CountRecord> = self
            .database
            .sql(
                "UPDATE likes:count SET value = IF type::is::int(value) AND value >= 0 THEN value + 1 ELSE 1 END RETURN AFTER",
            )
            .fetch_first()
            .await
            .context(QuerySnafu)?;

        let record = records.first().context(EmptyResponseSnafu { key: "likes:count" })?;

        Ok(record.stored().normalized())
    }

    #[instrument(skip(self))]
    async fn visitor(&self, visitor: &VisitorId) -> Result<Option<VisitorLike>> {
        let records: Vec<VisitorLike> = self
            .database
            .sql("SELECT last_like_timestamp FROM type::thing('like_users', $visitor)")
            .bind(("visitor", visitor.as_str()))
            .fetch_first()
            .await
            .context(QuerySnafu)?;

        Ok(records.into_iter().next())
    }

    #[instrument(skip(self))]
    async fn claim(&self, visitor: &VisitorId, now: Timestamp, cooldown: Duration) -> Result<Claim> {
        let threshold = (now - cooldown).timestamp_millis();

        // a single UPDATE runs in its own transaction, so the WHERE is checked against the
        // committed record and concurrent claims for the same visitor cannot both pass it
        let mut response = self
            .database
            .sql(
                "UPDATE type::thing('like_users', $visitor) SET last_like_timestamp = $now \
                    WHERE last_like_timestamp = NONE OR last_like_timestamp <= $threshold \
                    RETURN AFTER;
                SELECT last_like_timestamp FROM type::thing('like_users', $visitor);",
            )
            .bind(("visitor", visitor.as_str()))
            .bind(("now", now.timestamp_millis()))
            .bind(("threshold", threshold))
            .execute()
            .await
            .context(QuerySnafu)?;

        let claimed: Vec<VisitorLike> = query::take(&mut response, 0).context(QuerySnafu)?;
        if !claimed.is_empty() {
            return Ok(Claim::Accepted);
        }

        let current: Vec<VisitorLike> = query::take(&mut response, 1).context(QuerySnafu)?;
        let record = current.first().context(EmptyResponseSnafu {
            key: format!("like_users:{visitor}"),
        })?;

        Ok(Claim::Rejected {
            last_like: record.last_like(),
        })
    }
}

use serde::de::DeserializeOwned;
use snafu::{Location, ResultExt as _, Snafu};
use surrealdb::opt::QueryResult;

use super::Database;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DatabaseQueryError {
    #[snafu(display("failed to query the database at {location}: {source}"))]
    MalformedQuery {
        source: surrealdb::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("a statement failed to execute at {location}: {source}"))]
    Statement {
        source: surrealdb::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("failed to deserialize statement #{index} at {location}: {source}"))]
    Deserialize {
        index: usize,
        source: surrealdb::Error,
        #[snafu(implicit)]
        location: Location,
    },
}

/// An extension trait that allows you to execute raw SQL queries. Parameters can be bound using the [Bindings::bind] method which takes any serializable data structure.
///
/// # Example
/// ```ignore
/// let visitors: Vec<VisitorLike> = database.sql("SELECT * FROM like_users WHERE last_like_timestamp > $since")
///     .bind(("since", 0))
///     .fetch_first()
///     .await?;
/// ```
pub trait Sql {
    fn sql(&self, query: &str) -> Bindings<'_>;
}

impl Sql for Database {
    fn sql(&self, query: &str) -> Bindings<'_> {
        Bindings {
            query: self.query(query),
        }
    }
}

#[derive(Debug)]
pub struct Bindings<'a> {
    query: surrealdb::method::Query<'a, surrealdb::engine::any::Any>,
}

impl Bindings<'_> {
    pub fn bind(mut self, params: impl serde::Serialize) -> Self {
        let query = self.query;
        self.query = query.bind(params);
        self
    }

    /// Execute the query and return a [surrealdb::Response] which is SurrealDB's way to represent a list of statements returned from the database.
    ///
    /// Fails if any of the statements failed, so every result can be taken from the response.
    pub async fn execute(self) -> Result<surrealdb::Response, DatabaseQueryError> {
        let response = self.query.await.context(MalformedQuerySnafu)?;
        let response = response.check().context(StatementSnafu)?;
        tracing::trace!(?response, "executed query");
        Ok(response)
    }

    /// Execute the query and return the first result as a deserialized value.
    pub async fn fetch_first<T: DeserializeOwned>(self) -> Result<T, DatabaseQueryError>
    where
        usize: QueryResult<T>,
    {
        let mut statements = self.execute().await?;
        take(&mut statements, 0)
    }
}

/// Deserialize the result of the statement at `index`.
pub fn take<T: DeserializeOwned>(
    response: &mut surrealdb::Response, index: usize,
) -> Result<T, DatabaseQueryError>
where
    usize: QueryResult<T>,
{
    response.take::<T>(index).context(DeserializeSnafu { index })
}

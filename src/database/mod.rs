use serde::Deserialize;
use snafu::{Location, ResultExt as _, Snafu};
use surrealdb::engine::any::Any;
use surrealdb::opt::auth;
use surrealdb::Surreal;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::Retry;
use url::Url;

/// Helper trait for executing arbitrary SurrealQL queries.
pub mod query;

pub use query::{Bindings, DatabaseQueryError, Sql};

pub type Database = Surreal<Any>;

const SETUP: &str = include_str!("../../schema.surrealql");

/// How many times to try reaching the database before giving up on startup.
const CONNECT_ATTEMPTS: usize = 5;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DatabaseError {
    #[snafu(display("cannot connect to the database `{url}` at {location}: {source}"))]
    Connect {
        url: Url,
        source: surrealdb::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("cannot sign in to the database as `{username}` at {location}: {source}"))]
    SignIn {
        username: String,
        source: surrealdb::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("cannot select `{namespace}/{database}` at {location}: {source}"))]
    Select {
        namespace: String,
        database: String,
        source: surrealdb::Error,
        #[snafu(implicit)]
        location: Location,
    },

    #[snafu(display("failed to apply the database schema at {location}: {source}"))]
    Setup {
        source: surrealdb::Error,
        #[snafu(implicit)]
        location: Location,
    },
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    #[serde(rename = "surreal_url")]
    pub url: Url,
    #[serde(rename = "surreal_ns", default = "default_namespace")]
    pub namespace: String,
    #[serde(rename = "surreal_db", default = "default_database")]
    pub database: String,
    #[serde(rename = "surreal_user", default)]
    pub username: Option<String>,
    #[serde(rename = "surreal_pass", default)]
    pub password: Option<String>,
}

fn default_namespace() -> String {
    "portfolio".to_string()
}

fn default_database() -> String {
    "likes".to_string()
}

impl DatabaseConfig {
    /// A config pointing at a fresh embedded in-memory database.
    #[cfg(test)]
    pub(crate) fn in_memory() -> Self {
        Self {
            url: Url::parse("mem://").expect("mem:// is a valid url"),
            namespace: default_namespace(),
            database: default_database(),
            username: None,
            password: None,
        }
    }

    fn credentials(&self) -> Option<impl auth::Credentials<auth::Signin, auth::Jwt> + '_> {
        let username = self.username.as_deref()?;
        let password = self.password.as_deref()?;

        Some(auth::Database {
            namespace: &self.namespace,
            database: &self.database,
            username,
            password,
        })
    }
}

/// Connect to the configured database, sign in if credentials are given and apply the schema.
pub async fn connect(config: &DatabaseConfig) -> Result<Database, DatabaseError> {
    let address = config.url.as_str();
    let strategy = FixedInterval::from_millis(500).take(CONNECT_ATTEMPTS - 1);

    let database = Retry::start(strategy, || async move {
        surrealdb::engine::any::connect(address)
            .await
            .inspect_err(|error| tracing::warn!(%error, address, "could not reach the database"))
    })
    .await
    .context(ConnectSnafu {
        url: config.url.clone(),
    })?;

    if let Some(credentials) = config.credentials() {
        database.signin(credentials).await.context(SignInSnafu {
            username: config.username.clone().unwrap_or_default(),
        })?;
    }

    database
        .use_ns(&config.namespace)
        .use_db(&config.database)
        .await
        .context(SelectSnafu {
            namespace: &config.namespace,
            database: &config.database,
        })?;

    database
        .query(SETUP)
        .await
        .and_then(|response| response.check())
        .context(SetupSnafu)?;

    tracing::info!(
        url = %config.url,
        namespace = %config.namespace,
        database = %config.database,
        "connected to the database"
    );

    Ok(database)
}

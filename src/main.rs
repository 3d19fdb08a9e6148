use dotenvy::dotenv;
use snafu::ResultExt as _;
use tokio::net::TcpListener;

use kudos::config::Config;
use kudos::error::{
    ApplicationError, BindAddressSnafu, ConfigSnafu, ConnectDatabaseSnafu, WebServerSnafu,
};
use kudos::likes::LikeCounter;
use kudos::store::SurrealStore;
use kudos::{api, database, logger};

#[tokio::main]
async fn main() -> Result<(), ApplicationError> {
    dotenv().ok();

    let config = Config::from_env().context(ConfigSnafu)?;

    let _guard = logger::init(&config)?;

    let database = database::connect(&config.database)
        .await
        .context(ConnectDatabaseSnafu)?;
    let counter = LikeCounter::new(SurrealStore::new(database));

    let app = api::app(counter, &config);

    let listener = TcpListener::bind(config.host)
        .await
        .context(BindAddressSnafu {
            address: config.host,
        })?;
    tracing::info!(address = %config.host, "serving the like counter");

    axum::serve(listener, app).await.context(WebServerSnafu)
}

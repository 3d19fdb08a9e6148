use std::net::SocketAddr;
use std::path::PathBuf;

use serde::Deserialize;
use snafu::{ensure, Location, ResultExt as _, Snafu};

use crate::database::DatabaseConfig;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    #[snafu(display("could not read the configuration from the environment at {location}: {source}"))]
    Load {
        source: envy::Error,
        #[snafu(implicit)]
        location: Location,
    },

    /// SURREAL_USER and SURREAL_PASS must be given together
    IncompleteCredentials,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(rename = "host_address", default = "default_host")]
    pub host: SocketAddr,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Directory holding the built site, served for every path the API does not handle.
    #[serde(default)]
    pub static_dir: Option<PathBuf>,
    #[serde(default)]
    pub allowed_origin: Option<String>,
    #[serde(flatten)]
    pub database: DatabaseConfig,
}

fn default_host() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

impl Config {
    pub fn from_env() -> Result<Config, ConfigError> {
        envy::from_env::<Config>().context(LoadSnafu)?.validate()
    }

    pub fn from_iter(vars: impl IntoIterator<Item = (String, String)>) -> Result<Config, ConfigError> {
        envy::from_iter::<_, Config>(vars).context(LoadSnafu)?.validate()
    }

    fn validate(self) -> Result<Config, ConfigError> {
        ensure!(
            self.database.username.is_some() == self.database.password.is_some(),
            IncompleteCredentialsSnafu
        );

        Ok(self)
    }
}

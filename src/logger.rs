use std::result::Result;

use snafu::ResultExt;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{registry, EnvFilter, Layer as _};

use crate::config::Config;
use crate::error::{ApplicationError, InitializeLoggerSnafu};

/// Log to the console and to a daily rotated JSON file in the configured log directory.
///
/// Keep the returned guard alive for as long as logs should be flushed to the file.
pub fn init(config: &Config) -> Result<WorkerGuard, ApplicationError> {
    let (file_layer, guard) = {
        let file_appender = tracing_appender::rolling::daily(&config.log_dir, "kudos.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        let layer = layer()
            .with_ansi(false)
            .json()
            .with_writer(non_blocking)
            .with_filter(filter());

        (layer, guard)
    };

    let console_layer = layer()
        .pretty()
        .with_writer(std::io::stdout)
        .with_filter(filter());

    let subscriber = registry().with(console_layer).with(file_layer);
    tracing::subscriber::set_global_default(subscriber).context(InitializeLoggerSnafu)?;

    Ok(guard)
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

//! Tracing subscriber setup

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "termcast=info,tower_http=info";

/// Install the global subscriber
///
/// Logs go to stdout, plus daily files under `directory` when given. Keep
/// the returned guard alive so buffered file output is flushed on exit.
pub fn init(json: bool, directory: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());

    let (file_writer, guard) = match directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "termcast.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    let plain_file = file_writer
        .clone()
        .filter(|_| !json)
        .map(|w| fmt::layer().with_writer(w).with_ansi(false));
    let json_file = file_writer
        .filter(|_| json)
        .map(|w| fmt::layer().with_writer(w).json());

    tracing_subscriber::registry()
        .with(filter)
        .with((!json).then(fmt::layer))
        .with(json.then(|| fmt::layer().json()))
        .with(plain_file)
        .with(json_file)
        .init();

    guard
}

//! Tracing subscribers.

use tracing::Subscriber;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

use crate::config::Settings;
use crate::error::AppError;

/// Installs the global JSON subscriber.
///
/// The filter is `debug` when `settings.debug` is set, otherwise
/// `settings.log_filter` (which `RUST_LOG` overrides).
///
/// # Errors
///
/// Returns `Config` for an unparseable filter or if a global subscriber is
/// already installed.
pub fn init_tracing(settings: &Settings) -> Result<(), AppError> {
    let directives = if settings.debug {
        "debug"
    } else {
        settings.log_filter.as_str()
    };
    let filter = EnvFilter::try_new(directives)
        .map_err(|e| AppError::Config(format!("invalid log filter `{directives}`: {e}")))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .try_init()
        .map_err(|e| AppError::Config(format!("unable to install tracing subscriber: {e}")))
}

/// A plain-text subscriber at `debug` level writing to `writer`.
///
/// Scope it with `tracing::subscriber::with_default` or
/// `WithSubscriber::with_subscriber` to capture trace lines from one
/// repository or store call.
pub fn debug_subscriber<W>(writer: W) -> impl Subscriber + Send + Sync
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(writer)
        .finish()
}

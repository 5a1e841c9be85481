//! Chronicle: startup error types.

use thiserror::Error;

/// Errors raised while loading settings or wiring a store.
#[derive(Debug, Error)]
pub enum AppError {
    /// A setting is missing or has an invalid value.
    #[error("configuration error: {0}")]
    Config(String),

    /// The settings file is not valid YAML for [`crate::config::Settings`].
    #[error("invalid settings file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The settings file could not be read.
    #[error("unable to read settings: {0}")]
    Io(#[from] std::io::Error),

    /// The store could not be constructed.
    #[error("store error: {0}")]
    Store(#[from] chronicle_core::error::Error),
}

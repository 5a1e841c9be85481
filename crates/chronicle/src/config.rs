//! Settings, read from YAML and overridden by environment variables.
//!
//! ```yaml
//! store:
//!   kind: dynamodb
//!   table: orders
//!   events_per_item: 10
//! debug: true
//! ```

use std::path::Path;
use std::str::FromStr;

use chronicle_dynamodb::{DEFAULT_HASH_KEY, DEFAULT_RANGE_KEY, DEFAULT_REGION};
use chronicle_sql::Dialect;
use serde::Deserialize;

use crate::error::AppError;

/// Which [`Store`](chronicle_core::store::Store) to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Memory,
    Dynamodb,
    Sql,
}

impl FromStr for StoreKind {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, AppError> {
        match value.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "dynamodb" => Ok(Self::Dynamodb),
            "sql" => Ok(Self::Sql),
            other => Err(AppError::Config(format!("unknown store kind `{other}`"))),
        }
    }
}

/// Which serializer repositories use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializerKind {
    #[default]
    Json,
}

impl FromStr for SerializerKind {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, AppError> {
        match value.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            other => Err(AppError::Config(format!("unknown serializer `{other}`"))),
        }
    }
}

/// Store options. Keys that do not apply to the chosen kind are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreSettings {
    pub kind: StoreKind,
    pub table: String,
    pub events_per_item: i64,
    pub hash_key: String,
    pub range_key: String,
    pub region: String,
    pub url: Option<String>,
    pub dialect: Option<String>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            kind: StoreKind::Memory,
            table: "events".to_owned(),
            events_per_item: 1,
            hash_key: DEFAULT_HASH_KEY.to_owned(),
            range_key: DEFAULT_RANGE_KEY.to_owned(),
            region: DEFAULT_REGION.to_owned(),
            url: None,
            dialect: None,
        }
    }
}

impl StoreSettings {
    /// The configured SQL dialect, or the one implied by `url`.
    ///
    /// # Errors
    ///
    /// Returns `Config` if neither names a known dialect.
    pub fn sql_dialect(&self) -> Result<Dialect, AppError> {
        match (&self.dialect, &self.url) {
            (Some(name), _) => Ok(name.parse::<Dialect>()?),
            (None, Some(url)) => Ok(Dialect::from_url(url)?),
            (None, None) => Err(AppError::Config("sql store requires a url".into())),
        }
    }
}

/// Top-level settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub store: StoreSettings,
    pub serializer: SerializerKind,
    /// Emit debug-level trace lines.
    pub debug: bool,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store: StoreSettings::default(),
            serializer: SerializerKind::Json,
            debug: false,
            log_filter: "info".to_owned(),
        }
    }
}

impl Settings {
    /// Parses YAML; absent keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `Yaml` for malformed documents or unknown keys.
    pub fn from_yaml(text: &str) -> Result<Self, AppError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// Reads an optional YAML file, then applies the process environment.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be read, and the errors of
    /// [`Settings::from_yaml`] and [`Settings::with_overrides`].
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let settings = match path {
            Some(path) => Self::from_yaml(&std::fs::read_to_string(path)?)?,
            None => Self::default(),
        };
        settings.with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`, keyed by environment variable name.
    ///
    /// # Errors
    ///
    /// Returns `Config` for values that do not parse.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, AppError> {
        if let Some(kind) = lookup("CHRONICLE_STORE") {
            self.store.kind = kind.parse::<StoreKind>()?;
        }
        if let Some(serializer) = lookup("CHRONICLE_SERIALIZER") {
            self.serializer = serializer.parse::<SerializerKind>()?;
        }
        if let Some(count) = lookup("CHRONICLE_EVENTS_PER_ITEM") {
            self.store.events_per_item = count.trim().parse().map_err(|_| {
                AppError::Config(format!("CHRONICLE_EVENTS_PER_ITEM must be an integer, got `{count}`"))
            })?;
        }
        if let Some(table) = lookup("CHRONICLE_TABLE") {
            self.store.table = table;
        }
        if let Some(hash_key) = lookup("CHRONICLE_HASH_KEY") {
            self.store.hash_key = hash_key;
        }
        if let Some(range_key) = lookup("CHRONICLE_RANGE_KEY") {
            self.store.range_key = range_key;
        }
        if let Some(region) = lookup("CHRONICLE_REGION") {
            self.store.region = region;
        }
        if let Some(url) = lookup("DATABASE_URL") {
            self.store.url = Some(url);
        }
        if let Some(dialect) = lookup("CHRONICLE_DIALECT") {
            self.store.dialect = Some(dialect);
        }
        if let Some(debug) = lookup("CHRONICLE_DEBUG") {
            self.debug = parse_flag(&debug)?;
        }
        if let Some(filter) = lookup("RUST_LOG") {
            self.log_filter = filter;
        }
        Ok(self)
    }
}

fn parse_flag(value: &str) -> Result<bool, AppError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(AppError::Config(format!("CHRONICLE_DEBUG must be a boolean, got `{other}`"))),
    }
}

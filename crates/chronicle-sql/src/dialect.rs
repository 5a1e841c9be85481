//! SQL dialects: placeholder style and identifier quoting.

use std::fmt;
use std::str::FromStr;

use chronicle_core::error::{Error, Result};

/// The database family a store talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    MySql,
    Postgres,
}

impl Dialect {
    /// Infers the dialect from a connection URL scheme.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for an unrecognised scheme.
    pub fn from_url(url: &str) -> Result<Self> {
        let scheme = url.split_once(':').map_or(url, |(scheme, _)| scheme);
        scheme.parse()
    }

    /// Whether placeholders are numbered (`$1, $2`) rather than positional
    /// (`?`).
    #[must_use]
    pub fn numbered_placeholders(self) -> bool {
        matches!(self, Self::Postgres)
    }

    /// The `n`th (1-based) bind placeholder.
    #[must_use]
    pub fn placeholder(self, n: usize) -> String {
        if self.numbered_placeholders() {
            format!("${n}")
        } else {
            "?".to_owned()
        }
    }

    /// Quotes an identifier that may collide with a keyword.
    #[must_use]
    pub fn quote(self, identifier: &str) -> String {
        match self {
            Self::MySql => format!("`{identifier}`"),
            Self::Sqlite | Self::Postgres => format!("\"{identifier}\""),
        }
    }
}

impl FromStr for Dialect {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "mysql" | "mariadb" => Ok(Self::MySql),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            other => Err(Error::InvalidConfig(format!("unknown sql dialect `{other}`"))),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sqlite => "sqlite",
            Self::MySql => "mysql",
            Self::Postgres => "postgres",
        })
    }
}

/// Rejects table names that are not plain identifiers.
///
/// # Errors
///
/// Returns `InvalidConfig` unless `table` matches `[A-Za-z_][A-Za-z0-9_]*`.
pub fn validate_table_name(table: &str) -> Result<()> {
    let mut chars = table.chars();
    let valid = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!("invalid table name `{table}`")))
    }
}

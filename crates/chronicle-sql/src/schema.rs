//! Event table DDL.

use chronicle_core::error::{Error, Result};
use sqlx::AnyPool;

use crate::dialect::{Dialect, validate_table_name};

/// Statements creating the event table and its unique
/// `(aggregate_id, version)` index.
///
/// # Errors
///
/// Returns `InvalidConfig` for an invalid table name.
pub fn statements(table: &str, dialect: Dialect) -> Result<Vec<String>> {
    validate_table_name(table)?;
    let offset = dialect.quote("offset");

    let create = match dialect {
        Dialect::Sqlite => format!(
            "CREATE TABLE IF NOT EXISTS {table} (\
             {offset} INTEGER PRIMARY KEY AUTOINCREMENT, \
             aggregate_id VARCHAR(255) NOT NULL, \
             version BIGINT NOT NULL, \
             payload BLOB NOT NULL, \
             occurred_at_millis BIGINT NOT NULL)"
        ),
        Dialect::Postgres => format!(
            "CREATE TABLE IF NOT EXISTS {table} (\
             {offset} BIGSERIAL PRIMARY KEY, \
             aggregate_id VARCHAR(255) NOT NULL, \
             version BIGINT NOT NULL, \
             payload BYTEA NOT NULL, \
             occurred_at_millis BIGINT NOT NULL)"
        ),
        Dialect::MySql => format!(
            "CREATE TABLE IF NOT EXISTS {table} (\
             {offset} BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY, \
             aggregate_id VARCHAR(255) NOT NULL, \
             version BIGINT NOT NULL, \
             payload MEDIUMBLOB NOT NULL, \
             occurred_at_millis BIGINT NOT NULL\
             ) CHARACTER SET utf8mb4"
        ),
    };

    // MySQL has no IF NOT EXISTS for indexes; create_schema tolerates the
    // duplicate-key-name error instead.
    let index = match dialect {
        Dialect::MySql => format!("CREATE UNIQUE INDEX idx_{table} ON {table} (aggregate_id, version)"),
        Dialect::Sqlite | Dialect::Postgres => {
            format!("CREATE UNIQUE INDEX IF NOT EXISTS idx_{table} ON {table} (aggregate_id, version)")
        }
    };

    Ok(vec![create, index])
}

/// Creates the event table if it does not exist.
///
/// # Errors
///
/// Returns `InvalidConfig` for an invalid table name and `Storage` if a
/// statement fails.
#[tracing::instrument(skip(pool))]
pub async fn create_schema(pool: &AnyPool, table: &str, dialect: Dialect) -> Result<()> {
    for statement in statements(table, dialect)? {
        match sqlx::query(&statement).execute(pool).await {
            Ok(_) => {}
            Err(err) if dialect == Dialect::MySql && is_duplicate_index(&err) => {
                tracing::debug!("unique index already present");
            }
            Err(err) => return Err(Error::storage(format!("unable to create {table}"), err)),
        }
    }
    tracing::info!("event table ready");
    Ok(())
}

fn is_duplicate_index(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db| db.message().contains("Duplicate key name"))
}

//! `sqlx`-backed implementation of the [`Store`] trait.

use async_trait::async_trait;
use chronicle_core::context::Context;
use chronicle_core::epoch::EpochMillis;
use chronicle_core::error::{Error, Result};
use chronicle_core::store::{History, Record, Store, ensure_distinct_versions};
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Row};

use crate::dialect::{Dialect, validate_table_name};

/// Relational event store: one row per event, a unique index on
/// `(aggregate_id, version)` enforcing optimistic concurrency.
#[derive(Debug, Clone)]
pub struct SqlStore {
    pool: AnyPool,
    table: String,
    dialect: Dialect,
    insert_sql: String,
    select_sql: String,
    select_bounded_sql: String,
}

impl SqlStore {
    /// Creates a store over an existing pool.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for an invalid table name.
    pub fn new(pool: AnyPool, table: &str, dialect: Dialect) -> Result<Self> {
        validate_table_name(table)?;
        let p = |n| dialect.placeholder(n);

        let insert_sql = format!(
            "INSERT INTO {table} (aggregate_id, version, payload, occurred_at_millis) \
             VALUES ({}, {}, {}, {})",
            p(1),
            p(2),
            p(3),
            p(4)
        );
        let select = format!(
            "SELECT version, payload, occurred_at_millis FROM {table} WHERE aggregate_id = {}",
            p(1)
        );
        let select_bounded_sql = format!("{select} AND version <= {} ORDER BY version", p(2));
        let select_sql = format!("{select} ORDER BY version");

        Ok(Self {
            pool,
            table: table.to_owned(),
            dialect,
            insert_sql,
            select_sql,
            select_bounded_sql,
        })
    }

    /// Connects to `url`, inferring the dialect from its scheme.
    ///
    /// In-memory SQLite databases are pinned to a single long-lived
    /// connection, since every connection would otherwise see its own
    /// database.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for an unknown scheme or table name and
    /// `Storage` if the connection fails.
    pub async fn connect(url: &str, table: &str) -> Result<Self> {
        let dialect = Dialect::from_url(url)?;
        Self::connect_as(url, table, dialect).await
    }

    /// Connects to `url` with an explicit dialect.
    ///
    /// # Errors
    ///
    /// Same as [`SqlStore::connect`].
    pub async fn connect_as(url: &str, table: &str, dialect: Dialect) -> Result<Self> {
        validate_table_name(table)?;
        sqlx::any::install_default_drivers();

        let mut options = AnyPoolOptions::new();
        if dialect == Dialect::Sqlite && url.contains(":memory:") {
            options = options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = options
            .connect(url)
            .await
            .map_err(|e| Error::storage(format!("unable to connect to {dialect} database"), e))?;
        tracing::info!(%dialect, table, "connected sql store");
        Self::new(pool, table, dialect)
    }

    #[must_use]
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn insert_all(&self, aggregate_id: &str, records: &[Record]) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::storage("unable to begin transaction", e))?;

        for record in records {
            let inserted = sqlx::query(&self.insert_sql)
                .bind(aggregate_id)
                .bind(record.version)
                .bind(record.data.as_slice())
                .bind(record.at.as_i64())
                .execute(&mut *tx)
                .await;

            if let Err(err) = inserted {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(error = %rollback, "rollback failed");
                }
                return Err(insert_failure(aggregate_id, record.version, err));
            }
        }

        tx.commit()
            .await
            .map_err(|err| commit_failure(aggregate_id, err))
    }

    async fn select(&self, aggregate_id: &str, up_to_version: i64) -> Result<Vec<AnyRow>> {
        let query = if up_to_version > 0 {
            sqlx::query(&self.select_bounded_sql)
                .bind(aggregate_id)
                .bind(up_to_version)
        } else {
            sqlx::query(&self.select_sql).bind(aggregate_id)
        };

        query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::storage(format!("unable to read events of {aggregate_id}"), e))
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db| db.is_unique_violation())
}

fn insert_failure(aggregate_id: &str, version: i64, err: sqlx::Error) -> Error {
    if is_unique_violation(&err) {
        tracing::warn!(aggregate_id, version, "rejected duplicate version");
        Error::DuplicateVersion {
            aggregate_id: aggregate_id.to_owned(),
            version: Some(version),
            source: Some(err.into()),
        }
    } else {
        Error::storage(format!("unable to insert version {version}"), err)
    }
}

fn commit_failure(aggregate_id: &str, err: sqlx::Error) -> Error {
    if is_unique_violation(&err) {
        Error::DuplicateVersion {
            aggregate_id: aggregate_id.to_owned(),
            version: None,
            source: Some(err.into()),
        }
    } else {
        Error::storage("unable to commit transaction", err)
    }
}

fn decode(row: &AnyRow) -> Result<Record> {
    let field = |e| Error::storage("unable to decode event row", e);

    Ok(Record {
        version: row.try_get("version").map_err(field)?,
        at: EpochMillis(row.try_get("occurred_at_millis").map_err(field)?),
        data: row.try_get("payload").map_err(field)?,
    })
}

#[async_trait]
impl Store for SqlStore {
    #[tracing::instrument(skip(self, ctx, records), fields(table = %self.table, records = records.len()))]
    async fn save(&self, ctx: &Context, aggregate_id: &str, records: &[Record]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        ensure_distinct_versions(aggregate_id, records)?;

        ctx.run(self.insert_all(aggregate_id, records)).await?;
        tracing::debug!("appended events");
        Ok(())
    }

    #[tracing::instrument(skip(self, ctx), fields(table = %self.table))]
    async fn fetch(
        &self,
        ctx: &Context,
        aggregate_id: &str,
        up_to_version: i64,
    ) -> Result<History> {
        let rows = ctx.run(self.select(aggregate_id, up_to_version)).await?;
        if rows.is_empty() {
            return Err(Error::NotFound(aggregate_id.to_owned()));
        }

        let history = rows.iter().map(decode).collect::<Result<History>>()?;
        tracing::debug!(records = history.len(), "fetched history");
        Ok(history)
    }
}

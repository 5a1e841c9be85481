//! Test stores: `Store` implementations for exercising repositories and
//! dispatchers.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chronicle_core::context::Context;
use chronicle_core::error::{Error, Result};
use chronicle_core::store::{History, InMemoryStore, Record, Store};

/// An in-memory store that records every `save` and `fetch` call before
/// delegating to an [`InMemoryStore`].
#[derive(Debug, Default)]
pub struct RecordingStore {
    inner: InMemoryStore,
    saves: Mutex<Vec<(String, Vec<Record>)>>,
    fetches: Mutex<Vec<(String, i64)>>,
}

impl RecordingStore {
    /// Creates an empty recording store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `save` call made so far, including rejected ones.
    pub fn saves(&self) -> Vec<(String, Vec<Record>)> {
        self.saves
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Every `fetch` call made so far as `(aggregate_id, up_to_version)`.
    pub fn fetches(&self) -> Vec<(String, i64)> {
        self.fetches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Store for RecordingStore {
    async fn save(&self, ctx: &Context, aggregate_id: &str, records: &[Record]) -> Result<()> {
        self.saves
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((aggregate_id.to_owned(), records.to_vec()));
        tracing::debug!(aggregate_id, records = records.len(), "recorded save");
        self.inner.save(ctx, aggregate_id, records).await
    }

    async fn fetch(
        &self,
        ctx: &Context,
        aggregate_id: &str,
        up_to_version: i64,
    ) -> Result<History> {
        self.fetches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((aggregate_id.to_owned(), up_to_version));
        self.inner.fetch(ctx, aggregate_id, up_to_version).await
    }
}

/// A store that holds nothing: every fetch is `NotFound` and every save is
/// silently dropped. Useful for constructor commands.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyStore;

#[async_trait]
impl Store for EmptyStore {
    async fn save(&self, _ctx: &Context, _aggregate_id: &str, _records: &[Record]) -> Result<()> {
        Ok(())
    }

    async fn fetch(
        &self,
        _ctx: &Context,
        aggregate_id: &str,
        _up_to_version: i64,
    ) -> Result<History> {
        Err(Error::NotFound(aggregate_id.to_owned()))
    }
}

/// A store whose every operation fails with a storage error. Useful for
/// testing error-handling paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingStore;

#[async_trait]
impl Store for FailingStore {
    async fn save(&self, _ctx: &Context, _aggregate_id: &str, _records: &[Record]) -> Result<()> {
        Err(Error::storage("save failed", "connection refused"))
    }

    async fn fetch(
        &self,
        _ctx: &Context,
        _aggregate_id: &str,
        _up_to_version: i64,
    ) -> Result<History> {
        Err(Error::storage("fetch failed", "connection refused"))
    }
}

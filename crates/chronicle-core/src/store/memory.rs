//! Mutex-guarded in-memory store, the reference [`Store`] implementation.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::store::{History, Record, Store, ensure_distinct_versions, within_bound};

/// Keeps every history in a map guarded by a single mutex.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    histories: Mutex<HashMap<String, History>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held for `aggregate_id`.
    #[must_use]
    pub fn len_of(&self, aggregate_id: &str) -> usize {
        self.lock().get(aggregate_id).map_or(0, Vec::len)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, History>> {
        // A panic while holding the lock cannot leave a history half
        // written: batches are validated before any mutation.
        self.histories.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Store for InMemoryStore {
    #[tracing::instrument(skip(self, ctx, records), fields(records = records.len()))]
    async fn save(&self, ctx: &Context, aggregate_id: &str, records: &[Record]) -> Result<()> {
        if ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }
        if records.is_empty() {
            return Ok(());
        }
        ensure_distinct_versions(aggregate_id, records)?;

        let mut histories = self.lock();

        if let Some(history) = histories.get(aggregate_id) {
            let conflict = records
                .iter()
                .find(|r| history.binary_search_by_key(&r.version, |h| h.version).is_ok());
            if let Some(existing) = conflict {
                tracing::warn!(version = existing.version, "rejected duplicate version");
                return Err(Error::duplicate_version(aggregate_id, Some(existing.version)));
            }
        }

        let history = histories.entry(aggregate_id.to_owned()).or_default();
        for record in records {
            let at = history.partition_point(|h| h.version < record.version);
            history.insert(at, record.clone());
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, ctx))]
    async fn fetch(
        &self,
        ctx: &Context,
        aggregate_id: &str,
        up_to_version: i64,
    ) -> Result<History> {
        if ctx.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let history: History = self
            .lock()
            .get(aggregate_id)
            .map(|h| {
                h.iter()
                    .filter(|r| within_bound(r.version, up_to_version))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if history.is_empty() {
            return Err(Error::NotFound(aggregate_id.to_owned()));
        }
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epoch::EpochMillis;
    use crate::error::ErrorKind;

    fn record(version: i64) -> Record {
        Record {
            version,
            at: EpochMillis(version * 10),
            data: format!("e{version}").into_bytes(),
        }
    }

    #[tokio::test]
    async fn test_save_keeps_history_sorted() {
        // Arrange
        let store = InMemoryStore::new();
        let ctx = Context::background();

        // Act
        store.save(&ctx, "a", &[record(3), record(1)]).await.unwrap();
        store.save(&ctx, "a", &[record(2)]).await.unwrap();

        // Assert
        let history = store.fetch(&ctx, "a", 0).await.unwrap();
        let versions: Vec<_> = history.iter().map(|r| r.version).collect();
        assert_eq!(versions, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_duplicate_rejects_whole_batch() {
        // Arrange
        let store = InMemoryStore::new();
        let ctx = Context::background();
        store.save(&ctx, "a", &[record(1), record(2)]).await.unwrap();

        // Act
        let result = store.save(&ctx, "a", &[record(3), record(2)]).await;

        // Assert
        assert_eq!(result.unwrap_err().kind(), ErrorKind::DuplicateVersion);
        assert_eq!(store.len_of("a"), 2);
    }

    #[tokio::test]
    async fn test_fetch_honours_upper_bound() {
        let store = InMemoryStore::new();
        let ctx = Context::background();
        store
            .save(&ctx, "a", &[record(1), record(2), record(3)])
            .await
            .unwrap();

        let history = store.fetch(&ctx, "a", 2).await.unwrap();

        assert_eq!(history, vec![record(1), record(2)]);
    }

    #[tokio::test]
    async fn test_unknown_aggregate_is_not_found() {
        let store = InMemoryStore::new();

        let result = store.fetch(&Context::background(), "missing", 0).await;

        match result {
            Err(Error::NotFound(id)) => assert_eq!(id, "missing"),
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancelled_context_is_refused() {
        let store = InMemoryStore::new();
        let (ctx, handle) = Context::background().with_cancel();
        handle.cancel();

        let result = store.save(&ctx, "a", &[record(1)]).await;

        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(store.len_of("a"), 0);
    }
}

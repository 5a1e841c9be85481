//! The partitioned store.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chronicle_core::context::Context;
use chronicle_core::error::{Error, Result};
use chronicle_core::store::{History, Record, Store, ensure_distinct_versions, within_bound};

use crate::client::TableClient;
use crate::infra::TableDefinition;
use crate::model::{AttributeValue, GetItemInput, Item, QueryInput, TableError, UpdateItemInput};
use crate::slot::{is_slot, parse_slot, slot_name};
use crate::{DEFAULT_HASH_KEY, DEFAULT_RANGE_KEY, DEFAULT_REGION, REVISION_ATTRIBUTE};

/// Appends to one row retry this often when other writers keep bumping its
/// revision between our read and our write.
const MAX_APPEND_ATTEMPTS: usize = 5;

/// Configures a [`DynamoStore`].
#[derive(Debug, Clone)]
pub struct DynamoStoreBuilder {
    table_name: String,
    region: String,
    hash_key: String,
    range_key: String,
    events_per_item: i64,
}

impl DynamoStoreBuilder {
    /// Sets the region the table lives in; a table client reporting another
    /// region is logged as a misconfiguration.
    #[must_use]
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Sets the hash key attribute name.
    #[must_use]
    pub fn hash_key(mut self, name: impl Into<String>) -> Self {
        self.hash_key = name.into();
        self
    }

    /// Sets the range key attribute name.
    #[must_use]
    pub fn range_key(mut self, name: impl Into<String>) -> Self {
        self.range_key = name.into();
        self
    }

    /// Sets how many consecutive versions share one row.
    #[must_use]
    pub fn events_per_item(mut self, count: i64) -> Self {
        self.events_per_item = count;
        self
    }

    /// The table this configuration expects.
    #[must_use]
    pub fn definition(&self) -> TableDefinition {
        TableDefinition::new(&self.table_name, &self.hash_key, &self.range_key)
    }

    /// Builds the store on top of `client`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for an empty table or key name, identical key
    /// names, or `events_per_item < 1`.
    pub fn build(self, client: Arc<dyn TableClient>) -> Result<DynamoStore> {
        if self.table_name.is_empty() {
            return Err(Error::InvalidConfig("table name must not be empty".into()));
        }
        if self.hash_key.is_empty() || self.range_key.is_empty() {
            return Err(Error::InvalidConfig("key names must not be empty".into()));
        }
        if self.hash_key == self.range_key {
            return Err(Error::InvalidConfig(format!(
                "hash and range key are both `{}`",
                self.hash_key
            )));
        }
        if self.events_per_item < 1 {
            return Err(Error::InvalidConfig(format!(
                "events_per_item must be at least 1, got {}",
                self.events_per_item
            )));
        }

        if let Some(client_region) = client.region() {
            if client_region != self.region {
                tracing::warn!(
                    configured = %self.region,
                    client = %client_region,
                    "table client targets a different region than configured"
                );
            }
        }

        tracing::debug!(
            table = %self.table_name,
            region = %self.region,
            events_per_item = self.events_per_item,
            "built dynamodb store"
        );
        Ok(DynamoStore {
            client,
            table_name: self.table_name,
            region: self.region,
            hash_key: self.hash_key,
            range_key: self.range_key,
            events_per_item: self.events_per_item,
        })
    }
}

/// Stores each aggregate as rows of `events_per_item` event slots.
pub struct DynamoStore {
    client: Arc<dyn TableClient>,
    table_name: String,
    region: String,
    hash_key: String,
    range_key: String,
    events_per_item: i64,
}

impl DynamoStore {
    /// Starts configuring a store over `table_name` with one event per row.
    #[must_use]
    pub fn builder(table_name: impl Into<String>) -> DynamoStoreBuilder {
        DynamoStoreBuilder {
            table_name: table_name.into(),
            region: DEFAULT_REGION.to_owned(),
            hash_key: DEFAULT_HASH_KEY.to_owned(),
            range_key: DEFAULT_RANGE_KEY.to_owned(),
            events_per_item: 1,
        }
    }

    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    #[must_use]
    pub fn events_per_item(&self) -> i64 {
        self.events_per_item
    }

    /// The row holding `version`.
    #[must_use]
    pub fn partition_of(&self, version: i64) -> i64 {
        version / self.events_per_item
    }

    fn row_key(&self, aggregate_id: &str, partition: i64) -> Item {
        Item::from([
            (self.hash_key.clone(), AttributeValue::S(aggregate_id.to_owned())),
            (self.range_key.clone(), AttributeValue::number(partition)),
        ])
    }

    /// Writes `records` into the row, guarded by the revision read before.
    /// `seen` is `None` when the row had no revision.
    fn append_input(
        &self,
        aggregate_id: &str,
        partition: i64,
        records: &[&Record],
        seen: Option<i64>,
    ) -> UpdateItemInput {
        let mut names = HashMap::from([("#revision".to_owned(), REVISION_ATTRIBUTE.to_owned())]);
        let mut values = HashMap::from([(":one".to_owned(), AttributeValue::number(1))]);
        let mut sets = Vec::with_capacity(records.len());

        for (i, record) in records.iter().enumerate() {
            names.insert(format!("#s{i}"), slot_name(record.version, record.at));
            values.insert(format!(":s{i}"), AttributeValue::B(record.data.clone()));
            sets.push(format!("#s{i} = :s{i}"));
        }

        let condition = match seen {
            Some(revision) => {
                values.insert(":seen".to_owned(), AttributeValue::number(revision));
                "#revision = :seen".to_owned()
            }
            None => "attribute_not_exists(#revision)".to_owned(),
        };

        UpdateItemInput {
            table_name: self.table_name.clone(),
            key: self.row_key(aggregate_id, partition),
            condition_expression: Some(condition),
            update_expression: format!("ADD #revision :one SET {}", sets.join(", ")),
            expression_attribute_names: names,
            expression_attribute_values: values,
        }
    }

    /// The first version in `records` that `row` already holds, whatever
    /// the time encoded next to it.
    fn stored_duplicate(row: &Item, records: &[&Record]) -> Result<Option<i64>> {
        for name in row.keys().filter(|name| is_slot(name)) {
            let (version, _) = parse_slot(name)?;
            if records.iter().any(|r| r.version == version) {
                return Ok(Some(version));
            }
        }
        Ok(None)
    }

    /// Reads the row, rejects versions it already holds, then writes the
    /// batch conditioned on the revision just read. A lost race re-reads the
    /// row, so a concurrent append of other versions is retried while a
    /// concurrent append of the same version is a duplicate.
    async fn append_partition(
        &self,
        ctx: &Context,
        aggregate_id: &str,
        partition: i64,
        records: &[&Record],
    ) -> Result<()> {
        for attempt in 1..=MAX_APPEND_ATTEMPTS {
            let lookup = GetItemInput {
                table_name: self.table_name.clone(),
                key: self.row_key(aggregate_id, partition),
                consistent_read: true,
            };
            let row = ctx
                .run(async {
                    self.client
                        .get_item(lookup)
                        .await
                        .map_err(|err| table_failure(aggregate_id, err))
                })
                .await?;

            let seen = match &row {
                Some(item) => {
                    if let Some(version) = Self::stored_duplicate(item, records)? {
                        tracing::warn!(partition, version, "rejected duplicate version");
                        return Err(Error::DuplicateVersion {
                            aggregate_id: aggregate_id.to_owned(),
                            version: Some(version),
                            source: None,
                        });
                    }
                    revision_of(item)?
                }
                None => None,
            };

            let input = self.append_input(aggregate_id, partition, records, seen);
            let written = ctx
                .run(async { Ok(self.client.update_item(input).await) })
                .await?;
            match written {
                Ok(()) => return Ok(()),
                Err(TableError::ConditionalCheckFailed) => {
                    tracing::debug!(partition, attempt, "row changed since read, retrying");
                }
                Err(other) => return Err(table_failure(aggregate_id, other)),
            }
        }

        tracing::warn!(partition, "gave up appending to a contended row");
        Err(Error::DuplicateVersion {
            aggregate_id: aggregate_id.to_owned(),
            version: None,
            source: Some(TableError::ConditionalCheckFailed.into()),
        })
    }

    fn history_query(&self, aggregate_id: &str, up_to_version: i64) -> QueryInput {
        let mut names = HashMap::from([("#key".to_owned(), self.hash_key.clone())]);
        let mut values = HashMap::from([(
            ":key".to_owned(),
            AttributeValue::S(aggregate_id.to_owned()),
        )]);
        let mut condition = "#key = :key".to_owned();

        if up_to_version > 0 {
            names.insert("#partition".to_owned(), self.range_key.clone());
            values.insert(
                ":partition".to_owned(),
                AttributeValue::number(self.partition_of(up_to_version)),
            );
            condition.push_str(" AND #partition <= :partition");
        }

        QueryInput {
            table_name: self.table_name.clone(),
            key_condition_expression: condition,
            expression_attribute_names: names,
            expression_attribute_values: values,
            consistent_read: true,
            exclusive_start_key: None,
            limit: None,
        }
    }

    fn collect_slots(&self, item: Item, up_to_version: i64, history: &mut History) -> Result<()> {
        for (name, value) in item {
            if name == self.hash_key || name == self.range_key || !is_slot(&name) {
                continue;
            }
            let (version, at) = parse_slot(&name)?;
            if !within_bound(version, up_to_version) {
                continue;
            }
            let AttributeValue::B(data) = value else {
                return Err(Error::storage(
                    format!("slot `{name}` does not hold binary data"),
                    TableError::Validation(name.clone()),
                ));
            };
            history.push(Record { version, at, data });
        }
        Ok(())
    }
}

fn revision_of(row: &Item) -> Result<Option<i64>> {
    match row.get(REVISION_ATTRIBUTE) {
        Some(value) => value.as_i64().map(Some).ok_or_else(|| {
            Error::storage(
                format!("`{REVISION_ATTRIBUTE}` is not a number"),
                TableError::Validation(REVISION_ATTRIBUTE.to_owned()),
            )
        }),
        None => Ok(None),
    }
}

impl fmt::Debug for DynamoStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamoStore")
            .field("table_name", &self.table_name)
            .field("region", &self.region)
            .field("hash_key", &self.hash_key)
            .field("range_key", &self.range_key)
            .field("events_per_item", &self.events_per_item)
            .finish_non_exhaustive()
    }
}

fn table_failure(aggregate_id: &str, err: TableError) -> Error {
    match err {
        TableError::ConditionalCheckFailed => Error::DuplicateVersion {
            aggregate_id: aggregate_id.to_owned(),
            version: None,
            source: Some(err.into()),
        },
        other => Error::storage(format!("table request for {aggregate_id} failed"), other),
    }
}

#[async_trait]
impl Store for DynamoStore {
    /// Appends to each touched row in ascending row order. Rows written
    /// before a conflicting row stay written.
    #[tracing::instrument(skip(self, ctx, records), fields(table = %self.table_name, records = records.len()))]
    async fn save(&self, ctx: &Context, aggregate_id: &str, records: &[Record]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        ensure_distinct_versions(aggregate_id, records)?;

        let mut partitions: BTreeMap<i64, Vec<&Record>> = BTreeMap::new();
        for record in records {
            partitions
                .entry(self.partition_of(record.version))
                .or_default()
                .push(record);
        }

        for (partition, batch) in partitions {
            self.append_partition(ctx, aggregate_id, partition, &batch)
                .await?;
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, ctx), fields(table = %self.table_name))]
    async fn fetch(
        &self,
        ctx: &Context,
        aggregate_id: &str,
        up_to_version: i64,
    ) -> Result<History> {
        let mut query = self.history_query(aggregate_id, up_to_version);
        let mut history = History::new();
        let mut pages = 0_usize;

        loop {
            let page = ctx
                .run(async {
                    self.client
                        .query(query.clone())
                        .await
                        .map_err(|err| table_failure(aggregate_id, err))
                })
                .await?;
            pages += 1;

            for item in page.items {
                self.collect_slots(item, up_to_version, &mut history)?;
            }
            match page.last_evaluated_key {
                Some(key) => query.exclusive_start_key = Some(key),
                None => break,
            }
        }

        if history.is_empty() {
            return Err(Error::NotFound(aggregate_id.to_owned()));
        }
        history.sort_by_key(|r| r.version);
        tracing::debug!(records = history.len(), pages, "fetched history");
        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryTable;

    fn store(events_per_item: i64) -> (Arc<MemoryTable>, DynamoStore) {
        let table = Arc::new(MemoryTable::new("events"));
        let store = DynamoStore::builder("events")
            .events_per_item(events_per_item)
            .build(table.clone())
            .unwrap();
        (table, store)
    }

    #[test]
    fn test_partition_groups_consecutive_versions() {
        let (_, store) = store(2);

        let partitions: Vec<i64> = (1..=5).map(|v| store.partition_of(v)).collect();

        assert_eq!(partitions, vec![0, 1, 1, 2, 2]);
    }

    #[test]
    fn test_append_input_guards_row_revision() {
        let (_, store) = store(10);
        let first = Record {
            version: 1,
            at: chronicle_core::epoch::EpochMillis(0),
            data: b"a".to_vec(),
        };
        let second = Record {
            version: 2,
            at: chronicle_core::epoch::EpochMillis(36),
            data: b"b".to_vec(),
        };

        let fresh = store.append_input("agg", 0, &[&first, &second], None);
        let existing = store.append_input("agg", 0, &[&second], Some(4));

        assert_eq!(
            fresh.condition_expression.as_deref(),
            Some("attribute_not_exists(#revision)")
        );
        assert_eq!(fresh.update_expression, "ADD #revision :one SET #s0 = :s0, #s1 = :s1");
        assert_eq!(fresh.expression_attribute_names["#s1"], "_2:10");
        assert_eq!(fresh.key["partition"], AttributeValue::number(0));
        assert_eq!(existing.condition_expression.as_deref(), Some("#revision = :seen"));
        assert_eq!(
            existing.expression_attribute_values[":seen"],
            AttributeValue::number(4)
        );
    }

    #[test]
    fn test_stored_duplicate_ignores_slot_time() {
        let row = Item::from([
            ("_3:a".to_owned(), AttributeValue::B(b"x".to_vec())),
            (REVISION_ATTRIBUTE.to_owned(), AttributeValue::number(1)),
        ]);
        let same_version = Record {
            version: 3,
            at: chronicle_core::epoch::EpochMillis(11),
            data: b"y".to_vec(),
        };
        let next_version = Record {
            version: 4,
            ..same_version.clone()
        };

        assert_eq!(DynamoStore::stored_duplicate(&row, &[&same_version]).unwrap(), Some(3));
        assert_eq!(DynamoStore::stored_duplicate(&row, &[&next_version]).unwrap(), None);
    }

    #[test]
    fn test_unbounded_query_has_no_range_condition() {
        let (_, store) = store(2);

        let unbounded = store.history_query("agg", 0);
        let bounded = store.history_query("agg", 5);

        assert_eq!(unbounded.key_condition_expression, "#key = :key");
        assert_eq!(
            bounded.key_condition_expression,
            "#key = :key AND #partition <= :partition"
        );
        assert_eq!(
            bounded.expression_attribute_values[":partition"],
            AttributeValue::number(2)
        );
        assert!(bounded.consistent_read);
    }
}

//! In-process emulator of the table operations the store uses.
//!
//! Supports condition expressions built from `attribute_exists(#a)`,
//! `attribute_not_exists(#a)` and `#a = :v` joined by `AND`, consistent
//! single-row reads, update expressions with `ADD`
//! and `SET` clauses, and key conditions of the form
//! `#hash = :v [AND #range <op> :w]` with `op` one of `= < <= > >=`.
//! Queries are paged by a configurable page size and report
//! `last_evaluated_key` whenever a page fills up, as the real service does.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::client::TableClient;
use crate::model::{
    AttributeValue, GetItemInput, Item, QueryInput, QueryOutput, TableError, UpdateItemInput,
};
use crate::{DEFAULT_HASH_KEY, DEFAULT_RANGE_KEY};

type Rows = BTreeMap<String, BTreeMap<i64, Item>>;

/// A single table held in memory.
#[derive(Debug)]
pub struct MemoryTable {
    table_name: String,
    hash_key: String,
    range_key: String,
    page_size: usize,
    rows: Mutex<Rows>,
    queries: Mutex<Vec<QueryInput>>,
    updates: AtomicUsize,
}

impl MemoryTable {
    /// An empty table with the default key names and a page size of 100.
    #[must_use]
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            hash_key: DEFAULT_HASH_KEY.to_owned(),
            range_key: DEFAULT_RANGE_KEY.to_owned(),
            page_size: 100,
            rows: Mutex::new(BTreeMap::new()),
            queries: Mutex::new(Vec::new()),
            updates: AtomicUsize::new(0),
        }
    }

    /// Renames the key attributes.
    #[must_use]
    pub fn with_keys(mut self, hash_key: impl Into<String>, range_key: impl Into<String>) -> Self {
        self.hash_key = hash_key.into();
        self.range_key = range_key.into();
        self
    }

    /// Caps the number of items per query page (at least 1).
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Every row, ordered by hash then range key.
    pub fn items(&self) -> Vec<Item> {
        self.rows()
            .values()
            .flat_map(|partitions| partitions.values().cloned())
            .collect()
    }

    /// The row at `(hash, range)`, if present.
    pub fn item(&self, hash: &str, range: i64) -> Option<Item> {
        self.rows().get(hash).and_then(|p| p.get(&range)).cloned()
    }

    /// Writes a row unconditionally, replacing any existing one.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the item lacks a string hash key or a numeric
    /// range key.
    pub fn put_item(&self, item: Item) -> Result<(), TableError> {
        let (hash, range) = self.key_of(&item)?;
        self.rows().entry(hash).or_default().insert(range, item);
        Ok(())
    }

    /// Every query received so far.
    pub fn queries(&self) -> Vec<QueryInput> {
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of successful updates.
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    fn rows(&self) -> MutexGuard<'_, Rows> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_table(&self, table_name: &str) -> Result<(), TableError> {
        if table_name == self.table_name {
            Ok(())
        } else {
            Err(TableError::ResourceNotFound(table_name.to_owned()))
        }
    }

    fn key_of(&self, item: &Item) -> Result<(String, i64), TableError> {
        let hash = item
            .get(&self.hash_key)
            .and_then(AttributeValue::as_s)
            .ok_or_else(|| validation(format!("missing string key `{}`", self.hash_key)))?;
        let range = item
            .get(&self.range_key)
            .and_then(AttributeValue::as_i64)
            .ok_or_else(|| validation(format!("missing numeric key `{}`", self.range_key)))?;
        Ok((hash.to_owned(), range))
    }

    fn key_item(&self, hash: &str, range: i64) -> Item {
        Item::from([
            (self.hash_key.clone(), AttributeValue::S(hash.to_owned())),
            (self.range_key.clone(), AttributeValue::number(range)),
        ])
    }
}

#[async_trait]
impl TableClient for MemoryTable {
    async fn get_item(&self, input: GetItemInput) -> Result<Option<Item>, TableError> {
        self.check_table(&input.table_name)?;
        if input.key.len() != 2 {
            return Err(validation("key must name exactly the hash and range attributes"));
        }
        let (hash, range) = self.key_of(&input.key)?;
        Ok(self.item(&hash, range))
    }

    async fn update_item(&self, input: UpdateItemInput) -> Result<(), TableError> {
        self.check_table(&input.table_name)?;
        if input.key.len() != 2 {
            return Err(validation("key must name exactly the hash and range attributes"));
        }
        let (hash, range) = self.key_of(&input.key)?;

        let mut rows = self.rows();
        let existing = rows.get(&hash).and_then(|p| p.get(&range));

        if let Some(condition) = &input.condition_expression {
            let empty = Item::new();
            let current = existing.unwrap_or(&empty);
            let holds = evaluate_condition(
                condition,
                &input.expression_attribute_names,
                &input.expression_attribute_values,
                current,
            )?;
            if !holds {
                return Err(TableError::ConditionalCheckFailed);
            }
        }

        let mut item = existing.cloned().unwrap_or_else(|| self.key_item(&hash, range));
        apply_update(
            &input.update_expression,
            &input.expression_attribute_names,
            &input.expression_attribute_values,
            &[self.hash_key.as_str(), self.range_key.as_str()],
            &mut item,
        )?;

        rows.entry(hash).or_default().insert(range, item);
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn query(&self, input: QueryInput) -> Result<QueryOutput, TableError> {
        self.check_table(&input.table_name)?;
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(input.clone());

        let condition = parse_key_condition(&input)?;
        if condition.hash_name != self.hash_key {
            return Err(validation(format!(
                "key condition must test the hash key `{}`",
                self.hash_key
            )));
        }
        if let Some((name, _, _)) = &condition.range {
            if *name != self.range_key {
                return Err(validation(format!(
                    "key condition may only test the range key `{}`",
                    self.range_key
                )));
            }
        }
        let start_after = match &input.exclusive_start_key {
            Some(key) => Some(self.key_of(key)?.1),
            None => None,
        };
        let limit = input.limit.unwrap_or(usize::MAX).min(self.page_size);

        let rows = self.rows();
        let items: Vec<(i64, Item)> = rows
            .get(&condition.hash_value)
            .into_iter()
            .flat_map(|partitions| partitions.iter())
            .filter(|(range, _)| start_after.is_none_or(|after| **range > after))
            .filter(|(range, _)| {
                condition
                    .range
                    .as_ref()
                    .is_none_or(|(_, op, bound)| op.holds(**range, *bound))
            })
            .take(limit)
            .map(|(range, item)| (*range, item.clone()))
            .collect();

        let last_evaluated_key = match items.last() {
            Some((range, _)) if items.len() == limit => {
                Some(self.key_item(&condition.hash_value, *range))
            }
            _ => None,
        };

        Ok(QueryOutput {
            items: items.into_iter().map(|(_, item)| item).collect(),
            last_evaluated_key,
        })
    }
}

fn validation(message: impl Into<String>) -> TableError {
    TableError::Validation(message.into())
}

fn resolve_name(token: &str, names: &HashMap<String, String>) -> Result<String, TableError> {
    if token.starts_with('#') {
        names
            .get(token)
            .cloned()
            .ok_or_else(|| validation(format!("undefined attribute name {token}")))
    } else {
        Ok(token.to_owned())
    }
}

fn resolve_value<'a>(
    token: &str,
    values: &'a HashMap<String, AttributeValue>,
) -> Result<&'a AttributeValue, TableError> {
    values
        .get(token)
        .ok_or_else(|| validation(format!("undefined attribute value {token}")))
}

fn evaluate_condition(
    expression: &str,
    names: &HashMap<String, String>,
    values: &HashMap<String, AttributeValue>,
    item: &Item,
) -> Result<bool, TableError> {
    for clause in expression.split(" AND ").map(str::trim) {
        let holds = if let Some((left, right)) = clause.split_once(" = ") {
            let name = resolve_name(left.trim(), names)?;
            let expected = resolve_value(right.trim(), values)?;
            item.get(&name) == Some(expected)
        } else {
            let (function, argument) = clause
                .strip_suffix(')')
                .and_then(|c| c.split_once('('))
                .ok_or_else(|| validation(format!("unsupported condition `{clause}`")))?;
            let name = resolve_name(argument.trim(), names)?;

            match function.trim() {
                "attribute_not_exists" => !item.contains_key(&name),
                "attribute_exists" => item.contains_key(&name),
                other => return Err(validation(format!("unsupported function `{other}`"))),
            }
        };
        if !holds {
            return Ok(false);
        }
    }
    Ok(true)
}

#[derive(Clone, Copy)]
enum Clause {
    Add,
    Set,
}

fn apply_update(
    expression: &str,
    names: &HashMap<String, String>,
    values: &HashMap<String, AttributeValue>,
    keys: &[&str],
    item: &mut Item,
) -> Result<(), TableError> {
    let spaced = expression.replace(',', " , ").replace('=', " = ");
    let mut tokens = spaced.split_whitespace();
    let mut clause = None;

    while let Some(token) = tokens.next() {
        match token {
            "ADD" => clause = Some(Clause::Add),
            "SET" => clause = Some(Clause::Set),
            "," => {}
            target => {
                let name = resolve_name(target, names)?;
                if keys.contains(&name.as_str()) {
                    return Err(validation(format!("cannot update key attribute `{name}`")));
                }
                match clause {
                    Some(Clause::Add) => {
                        let value = next_value(&mut tokens, values)?;
                        let sum = match (item.get(&name), value.as_i64()) {
                            (None, Some(delta)) => delta,
                            (Some(current), Some(delta)) => current
                                .as_i64()
                                .and_then(|c| c.checked_add(delta))
                                .ok_or_else(|| validation(format!("cannot ADD to `{name}`")))?,
                            (_, None) => return Err(validation("ADD requires a number")),
                        };
                        item.insert(name, AttributeValue::number(sum));
                    }
                    Some(Clause::Set) => {
                        if tokens.next() != Some("=") {
                            return Err(validation(format!("expected `=` after {target}")));
                        }
                        let value = next_value(&mut tokens, values)?;
                        item.insert(name, value.clone());
                    }
                    None => {
                        return Err(validation(format!("unexpected `{target}` before ADD or SET")));
                    }
                }
            }
        }
    }
    Ok(())
}

fn next_value<'a, 'v>(
    tokens: &mut impl Iterator<Item = &'a str>,
    values: &'v HashMap<String, AttributeValue>,
) -> Result<&'v AttributeValue, TableError> {
    let token = tokens
        .next()
        .ok_or_else(|| validation("update expression ended early"))?;
    resolve_value(token, values)
}

#[derive(Clone, Copy)]
enum Comparison {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "=" => Some(Self::Eq),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            _ => None,
        }
    }

    fn holds(self, left: i64, right: i64) -> bool {
        match self {
            Self::Eq => left == right,
            Self::Lt => left < right,
            Self::Le => left <= right,
            Self::Gt => left > right,
            Self::Ge => left >= right,
        }
    }
}

struct KeyCondition {
    hash_name: String,
    hash_value: String,
    range: Option<(String, Comparison, i64)>,
}

fn parse_key_condition(input: &QueryInput) -> Result<KeyCondition, TableError> {
    let names = &input.expression_attribute_names;
    let values = &input.expression_attribute_values;
    let tokens: Vec<&str> = input.key_condition_expression.split_whitespace().collect();

    let (hash, range) = match tokens.as_slice() {
        [name, "=", value] => ((name, value), None),
        [name, "=", value, "AND", range_name, op, range_value] => {
            ((name, value), Some((range_name, op, range_value)))
        }
        _ => {
            return Err(validation(format!(
                "unsupported key condition `{}`",
                input.key_condition_expression
            )));
        }
    };

    let hash_value = resolve_value(hash.1, values)?
        .as_s()
        .ok_or_else(|| validation("hash key value must be a string"))?
        .to_owned();

    let range = match range {
        Some((name, op, value)) => {
            let op = Comparison::parse(op)
                .ok_or_else(|| validation(format!("unsupported comparison `{op}`")))?;
            let bound = resolve_value(value, values)?
                .as_i64()
                .ok_or_else(|| validation("range key value must be a number"))?;
            Some((resolve_name(name, names)?, op, bound))
        }
        None => None,
    };

    Ok(KeyCondition {
        hash_name: resolve_name(hash.0, names)?,
        hash_value,
        range,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(condition: Option<&str>, expression: &str, range: i64) -> UpdateItemInput {
        UpdateItemInput {
            table_name: "events".into(),
            key: Item::from([
                ("key".to_owned(), AttributeValue::S("a".into())),
                ("partition".to_owned(), AttributeValue::number(range)),
            ]),
            condition_expression: condition.map(str::to_owned),
            update_expression: expression.into(),
            expression_attribute_names: HashMap::from([
                ("#rev".to_owned(), "revision".to_owned()),
                ("#s".to_owned(), "_1:0".to_owned()),
            ]),
            expression_attribute_values: HashMap::from([
                (":one".to_owned(), AttributeValue::number(1)),
                (":s".to_owned(), AttributeValue::B(b"payload".to_vec())),
            ]),
        }
    }

    fn query(expression: &str, bound: Option<i64>) -> QueryInput {
        let mut values = HashMap::from([(":key".to_owned(), AttributeValue::S("a".into()))]);
        if let Some(bound) = bound {
            values.insert(":p".to_owned(), AttributeValue::number(bound));
        }
        QueryInput {
            table_name: "events".into(),
            key_condition_expression: expression.into(),
            expression_attribute_names: HashMap::from([
                ("#key".to_owned(), "key".to_owned()),
                ("#p".to_owned(), "partition".to_owned()),
            ]),
            expression_attribute_values: values,
            consistent_read: true,
            ..QueryInput::default()
        }
    }

    #[tokio::test]
    async fn test_conditional_update_applies_once() {
        // Arrange
        let table = MemoryTable::new("events");
        let input = update(
            Some("attribute_not_exists(#s)"),
            "ADD #rev :one SET #s = :s",
            0,
        );

        // Act
        let first = table.update_item(input.clone()).await;
        let second = table.update_item(input).await;

        // Assert
        assert!(first.is_ok());
        assert!(matches!(second, Err(TableError::ConditionalCheckFailed)));
        let item = table.item("a", 0).unwrap();
        assert_eq!(item["revision"], AttributeValue::number(1));
        assert_eq!(item["_1:0"], AttributeValue::B(b"payload".to_vec()));
        assert_eq!(table.update_count(), 1);
    }

    #[tokio::test]
    async fn test_equality_condition_compares_current_value() {
        // Arrange
        let table = MemoryTable::new("events");
        table.update_item(update(None, "ADD #rev :one", 0)).await.unwrap();
        let guarded = |expected: i64| {
            let mut input = update(Some("#rev = :seen"), "ADD #rev :one", 0);
            input
                .expression_attribute_values
                .insert(":seen".to_owned(), AttributeValue::number(expected));
            input
        };

        // Act
        let stale = table.update_item(guarded(0)).await;
        let current = table.update_item(guarded(1)).await;

        // Assert
        assert!(matches!(stale, Err(TableError::ConditionalCheckFailed)));
        assert!(current.is_ok());
        assert_eq!(table.item("a", 0).unwrap()["revision"].as_i64(), Some(2));
    }

    #[tokio::test]
    async fn test_get_item_reads_one_row() {
        let table = MemoryTable::new("events");
        table.update_item(update(None, "ADD #rev :one", 3)).await.unwrap();
        let lookup = |range: i64| GetItemInput {
            table_name: "events".into(),
            key: table.key_item("a", range),
            consistent_read: true,
        };

        let present = table.get_item(lookup(3)).await.unwrap();
        let absent = table.get_item(lookup(4)).await.unwrap();

        assert_eq!(present.unwrap()["revision"].as_i64(), Some(1));
        assert!(absent.is_none());
    }

    #[tokio::test]
    async fn test_add_increments_existing_counter() {
        let table = MemoryTable::new("events");
        table.update_item(update(None, "ADD #rev :one", 0)).await.unwrap();
        table.update_item(update(None, "ADD #rev :one", 0)).await.unwrap();

        let item = table.item("a", 0).unwrap();

        assert_eq!(item["revision"].as_i64(), Some(2));
    }

    #[tokio::test]
    async fn test_unknown_table_is_resource_not_found() {
        let table = MemoryTable::new("events");
        let mut input = update(None, "ADD #rev :one", 0);
        input.table_name = "other".into();

        let result = table.update_item(input).await;

        assert!(matches!(result, Err(TableError::ResourceNotFound(name)) if name == "other"));
    }

    #[tokio::test]
    async fn test_undefined_placeholder_is_validation_error() {
        let table = MemoryTable::new("events");

        let result = table.update_item(update(None, "SET #missing = :s", 0)).await;

        assert!(matches!(result, Err(TableError::Validation(_))));
    }

    #[tokio::test]
    async fn test_query_pages_and_honours_range_condition() {
        // Arrange
        let table = MemoryTable::new("events").with_page_size(2);
        for range in 0..5 {
            table.update_item(update(None, "ADD #rev :one", range)).await.unwrap();
        }

        // Act
        let first = table
            .query(query("#key = :key AND #p <= :p", Some(2)))
            .await
            .unwrap();
        let mut next = query("#key = :key AND #p <= :p", Some(2));
        next.exclusive_start_key = first.last_evaluated_key.clone();
        let second = table.query(next).await.unwrap();

        // Assert
        assert_eq!(first.items.len(), 2);
        assert!(first.last_evaluated_key.is_some());
        assert_eq!(second.items.len(), 1);
        assert_eq!(second.items[0]["partition"].as_i64(), Some(2));
        assert!(second.last_evaluated_key.is_none());
        assert_eq!(table.queries().len(), 2);
    }

    #[tokio::test]
    async fn test_query_on_unknown_hash_is_empty() {
        let table = MemoryTable::new("events");

        let output = table.query(query("#key = :key", None)).await.unwrap();

        assert!(output.items.is_empty());
        assert!(output.last_evaluated_key.is_none());
    }
}

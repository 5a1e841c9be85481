//! [`TableClient`] over the AWS SDK.
//!
//! The caller builds the SDK [`Client`] (credentials, region, endpoint) and
//! hands it over; this module only converts requests, items and errors.

use std::collections::HashMap;

use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::operation::get_item::GetItemError;
use aws_sdk_dynamodb::operation::query::QueryError;
use aws_sdk_dynamodb::operation::update_item::UpdateItemError;
use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::AttributeValue as SdkValue;

use crate::client::TableClient;
use crate::model::{
    AttributeValue, GetItemInput, Item, QueryInput, QueryOutput, TableError, UpdateItemInput,
};
use crate::slot::is_slot;

type SdkItem = HashMap<String, SdkValue>;

/// A DynamoDB table reached through an SDK client.
#[derive(Debug, Clone)]
pub struct AwsTableClient {
    client: Client,
}

impl AwsTableClient {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TableClient for AwsTableClient {
    async fn get_item(&self, input: GetItemInput) -> Result<Option<Item>, TableError> {
        let table = input.table_name;
        let output = self
            .client
            .get_item()
            .table_name(table.clone())
            .set_key(Some(to_sdk_item(input.key)))
            .consistent_read(input.consistent_read)
            .send()
            .await
            .map_err(|err| get_failure(&table, err.into_service_error()))?;

        output.item.map(from_sdk_item).transpose()
    }

    async fn update_item(&self, input: UpdateItemInput) -> Result<(), TableError> {
        let table = input.table_name;
        self.client
            .update_item()
            .table_name(table.clone())
            .set_key(Some(to_sdk_item(input.key)))
            .set_condition_expression(input.condition_expression)
            .update_expression(input.update_expression)
            .set_expression_attribute_names(non_empty(input.expression_attribute_names))
            .set_expression_attribute_values(non_empty(to_sdk_item(
                input.expression_attribute_values,
            )))
            .send()
            .await
            .map_err(|err| update_failure(&table, err.into_service_error()))?;
        Ok(())
    }

    async fn query(&self, input: QueryInput) -> Result<QueryOutput, TableError> {
        let table = input.table_name;
        let output = self
            .client
            .query()
            .table_name(table.clone())
            .key_condition_expression(input.key_condition_expression)
            .set_expression_attribute_names(non_empty(input.expression_attribute_names))
            .set_expression_attribute_values(non_empty(to_sdk_item(
                input.expression_attribute_values,
            )))
            .consistent_read(input.consistent_read)
            .set_exclusive_start_key(input.exclusive_start_key.map(to_sdk_item))
            .set_limit(input.limit.map(|limit| i32::try_from(limit).unwrap_or(i32::MAX)))
            .send()
            .await
            .map_err(|err| query_failure(&table, err.into_service_error()))?;

        Ok(QueryOutput {
            items: output
                .items
                .unwrap_or_default()
                .into_iter()
                .map(from_sdk_item)
                .collect::<Result<_, _>>()?,
            last_evaluated_key: output.last_evaluated_key.map(from_sdk_item).transpose()?,
        })
    }

    fn region(&self) -> Option<String> {
        self.client.config().region().map(ToString::to_string)
    }
}

fn non_empty<V>(map: HashMap<String, V>) -> Option<HashMap<String, V>> {
    (!map.is_empty()).then_some(map)
}

fn to_sdk(value: AttributeValue) -> SdkValue {
    match value {
        AttributeValue::S(s) => SdkValue::S(s),
        AttributeValue::N(n) => SdkValue::N(n),
        AttributeValue::B(b) => SdkValue::B(Blob::new(b)),
    }
}

fn to_sdk_item(item: Item) -> SdkItem {
    item.into_iter().map(|(name, value)| (name, to_sdk(value))).collect()
}

/// Converts a row. Attributes of types the store never writes are dropped,
/// unless they sit in an event slot.
fn from_sdk_item(item: SdkItem) -> Result<Item, TableError> {
    let mut converted = Item::with_capacity(item.len());
    for (name, value) in item {
        let value = match value {
            SdkValue::S(s) => AttributeValue::S(s),
            SdkValue::N(n) => AttributeValue::N(n),
            SdkValue::B(b) => AttributeValue::B(b.into_inner()),
            other if is_slot(&name) => {
                return Err(TableError::Validation(format!(
                    "slot `{name}` holds unsupported value {other:?}"
                )));
            }
            _ => continue,
        };
        converted.insert(name, value);
    }
    Ok(converted)
}

fn get_failure(table: &str, err: GetItemError) -> TableError {
    match err {
        GetItemError::ResourceNotFoundException(_) => TableError::ResourceNotFound(table.to_owned()),
        other => TableError::Service(Box::new(other)),
    }
}

fn update_failure(table: &str, err: UpdateItemError) -> TableError {
    match err {
        UpdateItemError::ConditionalCheckFailedException(_) => TableError::ConditionalCheckFailed,
        UpdateItemError::ResourceNotFoundException(_) => {
            TableError::ResourceNotFound(table.to_owned())
        }
        other => TableError::Service(Box::new(other)),
    }
}

fn query_failure(table: &str, err: QueryError) -> TableError {
    match err {
        QueryError::ResourceNotFoundException(_) => TableError::ResourceNotFound(table.to_owned()),
        other => TableError::Service(Box::new(other)),
    }
}

#[cfg(test)]
mod tests {
    use aws_sdk_dynamodb::types::error::{
        ConditionalCheckFailedException, ResourceNotFoundException,
    };

    use super::*;

    #[test]
    fn test_item_conversion_keeps_store_types() {
        let item = Item::from([
            ("key".to_owned(), AttributeValue::S("a".into())),
            ("partition".to_owned(), AttributeValue::number(2)),
            ("_3:a".to_owned(), AttributeValue::B(b"{}".to_vec())),
        ]);

        let converted = from_sdk_item(to_sdk_item(item.clone())).unwrap();

        assert_eq!(converted, item);
    }

    #[test]
    fn test_foreign_attribute_types_are_dropped_outside_slots() {
        let row = SdkItem::from([
            ("key".to_owned(), SdkValue::S("a".into())),
            ("archived".to_owned(), SdkValue::Bool(true)),
        ]);
        let corrupt = SdkItem::from([("_1:0".to_owned(), SdkValue::Bool(true))]);

        let converted = from_sdk_item(row).unwrap();

        assert_eq!(converted.len(), 1);
        assert!(matches!(from_sdk_item(corrupt), Err(TableError::Validation(_))));
    }

    #[test]
    fn test_service_errors_map_to_table_errors() {
        let conflict = UpdateItemError::ConditionalCheckFailedException(
            ConditionalCheckFailedException::builder()
                .message("The conditional request failed")
                .build(),
        );
        let missing = QueryError::ResourceNotFoundException(
            ResourceNotFoundException::builder()
                .message("Requested resource not found")
                .build(),
        );

        assert!(matches!(
            update_failure("events", conflict),
            TableError::ConditionalCheckFailed
        ));
        match query_failure("events", missing) {
            TableError::ResourceNotFound(table) => assert_eq!(table, "events"),
            other => panic!("expected ResourceNotFound, got {other:?}"),
        }
    }
}

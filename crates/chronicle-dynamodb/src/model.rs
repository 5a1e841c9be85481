//! Request and response shapes of the table client.
//!
//! These mirror the subset of the DynamoDB API the store uses, so an SDK
//! adapter is a field-by-field conversion.

use std::collections::HashMap;

use chronicle_core::error::BoxError;
use thiserror::Error;

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    /// String.
    S(String),
    /// Number, in its decimal string form.
    N(String),
    /// Binary.
    B(Vec<u8>),
}

impl AttributeValue {
    /// A number attribute.
    #[must_use]
    pub fn number(value: i64) -> Self {
        Self::N(value.to_string())
    }

    /// The string, if this is `S`.
    #[must_use]
    pub fn as_s(&self) -> Option<&str> {
        match self {
            Self::S(s) => Some(s),
            _ => None,
        }
    }

    /// The number, if this is an integral `N`.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::N(n) => n.parse().ok(),
            _ => None,
        }
    }

    /// The bytes, if this is `B`.
    #[must_use]
    pub fn as_b(&self) -> Option<&[u8]> {
        match self {
            Self::B(b) => Some(b),
            _ => None,
        }
    }
}

/// A row: attribute name to value.
pub type Item = HashMap<String, AttributeValue>;

/// A conditional update of one row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateItemInput {
    pub table_name: String,
    pub key: Item,
    pub condition_expression: Option<String>,
    pub update_expression: String,
    pub expression_attribute_names: HashMap<String, String>,
    pub expression_attribute_values: HashMap<String, AttributeValue>,
}

/// A single-row read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GetItemInput {
    pub table_name: String,
    pub key: Item,
    pub consistent_read: bool,
}

/// A key-condition query over one hash key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryInput {
    pub table_name: String,
    pub key_condition_expression: String,
    pub expression_attribute_names: HashMap<String, String>,
    pub expression_attribute_values: HashMap<String, AttributeValue>,
    pub consistent_read: bool,
    /// Resume after this key (the previous page's `last_evaluated_key`).
    pub exclusive_start_key: Option<Item>,
    pub limit: Option<usize>,
}

/// One page of query results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    pub items: Vec<Item>,
    /// Present when more pages remain.
    pub last_evaluated_key: Option<Item>,
}

/// Failures reported by a table client.
#[derive(Debug, Error)]
pub enum TableError {
    /// The update's condition expression evaluated to false.
    #[error("the conditional request failed")]
    ConditionalCheckFailed,

    /// The table does not exist.
    #[error("requested resource not found: {0}")]
    ResourceNotFound(String),

    /// The request was malformed.
    #[error("validation error: {0}")]
    Validation(String),

    /// Any other service or transport failure.
    #[error("service error")]
    Service(#[source] BoxError),
}

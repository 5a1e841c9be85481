//! The seam between the store and a DynamoDB SDK.

use async_trait::async_trait;

use crate::model::{GetItemInput, Item, QueryInput, QueryOutput, TableError, UpdateItemInput};

/// The table operations the store needs.
#[async_trait]
pub trait TableClient: Send + Sync {
    /// Reads one row, `None` if it does not exist.
    async fn get_item(&self, input: GetItemInput) -> Result<Option<Item>, TableError>;

    /// Applies a conditional update to one row.
    async fn update_item(&self, input: UpdateItemInput) -> Result<(), TableError>;

    /// Returns one page of a key-condition query.
    async fn query(&self, input: QueryInput) -> Result<QueryOutput, TableError>;

    /// The region requests go to, when the client knows it.
    fn region(&self) -> Option<String> {
        None
    }
}

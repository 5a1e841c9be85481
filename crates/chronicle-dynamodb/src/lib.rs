//! Chronicle DynamoDB: a [`Store`](chronicle_core::store::Store) on a
//! hash + range key/value table.
//!
//! Each aggregate occupies one or more rows keyed by
//! `(aggregate_id, version / events_per_item)`. Inside a row every event is
//! an attribute named by [`slot::slot_name`] holding the envelope bytes, and
//! a `revision` counter is bumped on every append.
//!
//! Appends read the target row, reject versions it already holds and write
//! conditioned on the `revision` they read.
//!
//! The adapter talks to the database through [`client::TableClient`].
//! With the `aws-sdk` feature, `aws::AwsTableClient` reaches DynamoDB
//! through the AWS SDK; [`memory::MemoryTable`] is an in-process emulator of
//! the subset the adapter uses.

#[cfg(feature = "aws-sdk")]
pub mod aws;
pub mod client;
pub mod infra;
pub mod memory;
pub mod model;
pub mod slot;
pub mod store;
pub mod streams;

#[cfg(feature = "aws-sdk")]
pub use aws::AwsTableClient;
pub use client::TableClient;
pub use memory::MemoryTable;
pub use store::{DynamoStore, DynamoStoreBuilder};

/// Region used when none is configured.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Hash key attribute used when none is configured.
pub const DEFAULT_HASH_KEY: &str = "key";

/// Range key attribute used when none is configured.
pub const DEFAULT_RANGE_KEY: &str = "partition";

/// Bookkeeping attribute incremented on every append.
pub const REVISION_ATTRIBUTE: &str = "revision";

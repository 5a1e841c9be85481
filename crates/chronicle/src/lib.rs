//! Chronicle: event-sourced aggregate persistence.
//!
//! Re-exports the core library and the two database adapters, and wires them
//! from [`config::Settings`]:
//!
//! ```ignore
//! let settings = Settings::load(None)?;
//! telemetry::init_tracing(&settings)?;
//! let store = chronicle::open_store(&settings, None).await?;
//! let mut users = chronicle::repository::<User>(&settings, store);
//! users.bind(UserEvent::bindings())?;
//! ```

pub mod config;
pub mod error;
pub mod telemetry;

use std::sync::Arc;

use chronicle_core::aggregate::Aggregate;
use chronicle_core::repository::Repository;
use chronicle_core::serializer::JsonSerializer;
use chronicle_core::store::{InMemoryStore, Store};
use chronicle_dynamodb::{DynamoStore, TableClient};
use chronicle_sql::SqlStore;

pub use chronicle_core as core;
pub use chronicle_core::{event_set, impl_event};
pub use chronicle_dynamodb as dynamodb;
pub use chronicle_sql as sql;

use crate::config::{SerializerKind, Settings, StoreKind};
use crate::error::AppError;

/// Builds the store `settings` select.
///
/// `table_client` is required for `dynamodb`, since SDK sessions are built
/// by the caller.
///
/// # Errors
///
/// Returns `Config` for missing inputs and `Store` when the adapter rejects
/// its configuration or cannot connect.
pub async fn open_store(
    settings: &Settings,
    table_client: Option<Arc<dyn TableClient>>,
) -> Result<Arc<dyn Store>, AppError> {
    let options = &settings.store;
    let store: Arc<dyn Store> = match options.kind {
        StoreKind::Memory => Arc::new(InMemoryStore::new()),
        StoreKind::Dynamodb => {
            let client = table_client.ok_or_else(|| {
                AppError::Config("dynamodb store requires a table client".into())
            })?;
            let store = DynamoStore::builder(&options.table)
                .region(&options.region)
                .hash_key(&options.hash_key)
                .range_key(&options.range_key)
                .events_per_item(options.events_per_item)
                .build(client)?;
            Arc::new(store)
        }
        StoreKind::Sql => {
            let url = options
                .url
                .as_deref()
                .ok_or_else(|| AppError::Config("sql store requires a url".into()))?;
            let dialect = options.sql_dialect()?;
            Arc::new(SqlStore::connect_as(url, &options.table, dialect).await?)
        }
    };

    tracing::info!(kind = ?options.kind, table = %options.table, "opened store");
    Ok(store)
}

/// A repository over `store` using the configured serializer.
#[must_use]
pub fn repository<A>(settings: &Settings, store: Arc<dyn Store>) -> Repository<A>
where
    A: Aggregate + Default,
{
    match settings.serializer {
        SerializerKind::Json => {
            Repository::new(store).with_serializer(JsonSerializer::<A::Event>::new())
        }
    }
}

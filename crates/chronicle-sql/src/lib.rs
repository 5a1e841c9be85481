//! Chronicle SQL: a [`Store`](chronicle_core::store::Store) on a relational
//! database through `sqlx`'s `Any` driver (SQLite, PostgreSQL, MySQL).

pub mod dialect;
pub mod schema;
pub mod sql_store;

pub use dialect::Dialect;
pub use schema::create_schema;
pub use sql_store::SqlStore;

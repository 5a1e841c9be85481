//! Chronicle Core: event-sourced aggregate persistence.
//!
//! Events are inspected for their `(aggregate id, version, time, type)`
//! metadata, encoded by a [`serializer::Serializer`] into records, and
//! appended to a [`store::Store`]. A [`repository::Repository`] replays
//! records into aggregates, and a [`command::Dispatcher`] runs commands
//! against them. This crate contains no infrastructure code beyond the
//! in-memory store.

pub mod aggregate;
pub mod clock;
pub mod command;
pub mod context;
pub mod epoch;
pub mod error;
pub mod event;
pub mod repository;
pub mod serializer;
pub mod store;

//! Aggregate root abstraction.

use serde::Serialize;

use crate::event::{Event, short_type_name};

/// An in-memory projection of one history, rebuilt by folding events.
pub trait Aggregate: Send + Sync + 'static {
    /// The event sum type this aggregate folds.
    type Event: Event + Serialize + Send + Sync + 'static;

    /// Folds one event into the aggregate. Returns `false` if the aggregate
    /// does not handle this event.
    fn apply(&mut self, event: &Self::Event) -> bool;

    /// Name used in logs and dispatch errors.
    #[must_use]
    fn aggregate_type() -> &'static str
    where
        Self: Sized,
    {
        short_type_name(std::any::type_name::<Self>())
    }
}

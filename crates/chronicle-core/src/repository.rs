//! Load and save aggregates through a store and a serializer.

use std::fmt;
use std::sync::Arc;

use crate::aggregate::Aggregate;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::event::{Event, inspect};
use crate::serializer::{Binding, JsonSerializer, Serializer};
use crate::store::{History, Store};

/// How `load` treats gaps between consecutive versions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VersionPolicy {
    /// Replay whatever the store returns.
    #[default]
    Lenient,
    /// Require versions `1, 2, 3, …` with no gaps; anything else fails with
    /// `VersionGap`.
    Strict,
}

type Factory<A> = Arc<dyn Fn() -> A + Send + Sync>;

/// Composes a [`Store`], a [`Serializer`] and an aggregate factory into the
/// load/save lifecycle. Nothing is cached: every load replays.
pub struct Repository<A: Aggregate> {
    store: Arc<dyn Store>,
    serializer: Box<dyn Serializer<A::Event>>,
    factory: Factory<A>,
    policy: VersionPolicy,
}

impl<A: Aggregate + Default> Repository<A> {
    /// Creates a repository that builds aggregates with `A::default()` and
    /// encodes events with a [`JsonSerializer`].
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_factory(store, A::default)
    }
}

impl<A: Aggregate> Repository<A> {
    /// Creates a repository that builds aggregates with `factory`.
    pub fn with_factory(store: Arc<dyn Store>, factory: impl Fn() -> A + Send + Sync + 'static) -> Self {
        Self {
            store,
            serializer: Box::new(JsonSerializer::<A::Event>::new()),
            factory: Arc::new(factory),
            policy: VersionPolicy::default(),
        }
    }

    /// Replaces the serializer. Bindings made on the previous one are lost.
    #[must_use]
    pub fn with_serializer(mut self, serializer: impl Serializer<A::Event> + 'static) -> Self {
        self.serializer = Box::new(serializer);
        self
    }

    /// Sets the gap policy applied by `load`.
    #[must_use]
    pub fn with_version_policy(mut self, policy: VersionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Registers event shapes with the serializer.
    ///
    /// # Errors
    ///
    /// Returns the serializer's error, e.g. `DuplicateBinding`.
    pub fn bind(&mut self, bindings: impl IntoIterator<Item = Binding<A::Event>>) -> Result<()> {
        for binding in bindings {
            self.serializer.bind(binding)?;
        }
        Ok(())
    }

    /// A fresh, unpersisted aggregate.
    #[must_use]
    pub fn new_aggregate(&self) -> A {
        (self.factory)()
    }

    /// The backing store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Persists `events` as one atomic batch. An empty slice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `InvalidField` if the events do not share one aggregate id,
    /// the serializer's errors, or the store's errors (notably
    /// `DuplicateVersion`).
    #[tracing::instrument(skip_all, fields(aggregate = A::aggregate_type(), events = events.len()))]
    pub async fn save(&self, ctx: &Context, events: &[A::Event]) -> Result<()> {
        let Some(first) = events.first() else {
            return Ok(());
        };
        let aggregate_id = inspect(first)?.aggregate_id.into_owned();

        let mut records = Vec::with_capacity(events.len());
        for event in events {
            let meta = inspect(event)?;
            if meta.aggregate_id != aggregate_id.as_str() {
                return Err(Error::invalid_field(
                    "id",
                    format!(
                        "batch for aggregate {aggregate_id} contains an event for {}",
                        meta.aggregate_id
                    ),
                ));
            }
            records.push(self.serializer.serialize(event)?);
        }

        self.store.save(ctx, &aggregate_id, &records).await?;
        tracing::debug!(%aggregate_id, "saved events");
        Ok(())
    }

    /// Replays the full history of `aggregate_id`.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an empty history, `UnhandledEvent` if the
    /// aggregate declines an event, plus store and serializer errors.
    pub async fn load(&self, ctx: &Context, aggregate_id: &str) -> Result<A> {
        self.load_version(ctx, aggregate_id, 0).await
    }

    /// Replays the history of `aggregate_id` up to and including
    /// `up_to_version` (`0` for all of it).
    ///
    /// # Errors
    ///
    /// As [`Repository::load`], plus `VersionGap` under
    /// [`VersionPolicy::Strict`].
    #[tracing::instrument(skip(self, ctx), fields(aggregate = A::aggregate_type()))]
    pub async fn load_version(
        &self,
        ctx: &Context,
        aggregate_id: &str,
        up_to_version: i64,
    ) -> Result<A> {
        let events = self.events(ctx, aggregate_id, up_to_version).await?;

        let mut aggregate = self.new_aggregate();
        for event in &events {
            if !aggregate.apply(event) {
                return Err(Error::UnhandledEvent {
                    event_type: event.event_type().to_owned(),
                });
            }
        }

        tracing::debug!(events = events.len(), "loaded aggregate");
        Ok(aggregate)
    }

    /// Fetches and decodes the history of `aggregate_id` without folding it.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an empty history, `VersionGap` under
    /// [`VersionPolicy::Strict`], plus store and serializer errors.
    pub async fn events(
        &self,
        ctx: &Context,
        aggregate_id: &str,
        up_to_version: i64,
    ) -> Result<Vec<A::Event>> {
        let history = self.store.fetch(ctx, aggregate_id, up_to_version).await?;
        if history.is_empty() {
            return Err(Error::NotFound(aggregate_id.to_owned()));
        }
        if self.policy == VersionPolicy::Strict {
            check_contiguous(aggregate_id, &history)?;
        }

        history
            .iter()
            .map(|record| self.serializer.deserialize(record))
            .collect()
    }
}

impl<A: Aggregate> fmt::Debug for Repository<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("aggregate", &A::aggregate_type())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

fn check_contiguous(aggregate_id: &str, history: &History) -> Result<()> {
    for (expected, record) in (1..).zip(history) {
        if record.version != expected {
            return Err(Error::VersionGap {
                aggregate_id: aggregate_id.to_owned(),
                expected,
                found: record.version,
            });
        }
    }
    Ok(())
}

//! Commands and the dispatcher that runs them against aggregates.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::aggregate::Aggregate;
use crate::context::Context;
use crate::error::{BoxError, Error, Result};
use crate::event::short_type_name;
use crate::repository::Repository;

/// Trait that all commands implement.
pub trait Command: Send + Sync + fmt::Debug {
    /// The aggregate this command targets.
    fn aggregate_id(&self) -> &str;

    /// Whether this command creates a new aggregate instead of loading one.
    fn is_constructor(&self) -> bool {
        false
    }

    /// The type name for this command (for logging and errors).
    fn command_type(&self) -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }
}

/// Runs before a command reaches its aggregate, e.g. to validate or
/// authorise it.
#[async_trait]
pub trait Preprocessor<C: Command>: Send + Sync {
    /// Inspects the command; an error aborts the dispatch.
    async fn before(&self, ctx: &Context, command: &C) -> Result<(), BoxError>;
}

/// Command handling capability of an aggregate.
#[async_trait]
pub trait CommandHandler<C: Command>: Aggregate {
    /// Whether this aggregate accepts `command`.
    fn handles(&self, _command: &C) -> bool {
        true
    }

    /// Decides which events `command` produces. The aggregate is not
    /// mutated; the events are persisted by the dispatcher.
    async fn handle(&self, ctx: &Context, command: &C) -> Result<Vec<Self::Event>, BoxError>;
}

/// Loads (or creates) the target aggregate, runs the command against it and
/// saves the resulting events.
pub struct Dispatcher<A: Aggregate, C: Command> {
    repository: Arc<Repository<A>>,
    preprocessors: Vec<Box<dyn Preprocessor<C>>>,
}

impl<A, C> Dispatcher<A, C>
where
    A: CommandHandler<C>,
    C: Command,
{
    /// Creates a dispatcher with no preprocessors.
    #[must_use]
    pub fn new(repository: Arc<Repository<A>>) -> Self {
        Self {
            repository,
            preprocessors: Vec::new(),
        }
    }

    /// Appends a preprocessor; they run in the order added.
    #[must_use]
    pub fn with_preprocessor(mut self, preprocessor: impl Preprocessor<C> + 'static) -> Self {
        self.preprocessors.push(Box::new(preprocessor));
        self
    }

    /// The repository commands are dispatched through.
    #[must_use]
    pub fn repository(&self) -> &Arc<Repository<A>> {
        &self.repository
    }

    /// Dispatches one command.
    ///
    /// # Errors
    ///
    /// Each stage wraps its failure: `Preprocessor`, `EventLoad`,
    /// `AggregateNotHandler`, `Handler` and `Save`. A `Save` wrapping
    /// `DuplicateVersion` means another writer won; reload and retry.
    #[tracing::instrument(
        skip_all,
        fields(command = command.command_type(), aggregate_id = command.aggregate_id())
    )]
    pub async fn dispatch(&self, ctx: &Context, command: &C) -> Result<()> {
        let command_type = command.command_type();
        let aggregate_type = A::aggregate_type();

        for preprocessor in &self.preprocessors {
            preprocessor
                .before(ctx, command)
                .await
                .map_err(|source| Error::Preprocessor {
                    command: command_type,
                    source,
                })?;
        }

        let aggregate = if command.is_constructor() {
            self.repository.new_aggregate()
        } else {
            self.repository
                .load(ctx, command.aggregate_id())
                .await
                .map_err(|source| Error::EventLoad {
                    aggregate: aggregate_type,
                    aggregate_id: command.aggregate_id().to_owned(),
                    source: Box::new(source),
                })?
        };

        if !aggregate.handles(command) {
            return Err(Error::AggregateNotHandler {
                aggregate: aggregate_type,
                command: command_type,
            });
        }

        let events = aggregate
            .handle(ctx, command)
            .await
            .map_err(|source| Error::Handler {
                command: command_type,
                aggregate: aggregate_type,
                source,
            })?;

        self.repository
            .save(ctx, &events)
            .await
            .map_err(|source| {
                if source.is_duplicate_version() {
                    tracing::warn!("lost optimistic concurrency race");
                }
                Error::Save {
                    aggregate: aggregate_type,
                    aggregate_id: command.aggregate_id().to_owned(),
                    source: Box::new(source),
                }
            })?;

        tracing::debug!(events = events.len(), "command dispatched");
        Ok(())
    }
}

impl<A: Aggregate, C: Command> fmt::Debug for Dispatcher<A, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("repository", &self.repository)
            .field("preprocessors", &self.preprocessors.len())
            .finish()
    }
}

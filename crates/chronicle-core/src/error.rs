//! Error taxonomy shared by every Chronicle crate.

use std::fmt;

use thiserror::Error;

/// Boxed cause carried by errors that wrap foreign failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Convenience alias used throughout the workspace.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Stable, programmatic tag for an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NilInput,
    InvalidField,
    DuplicateTag,
    DuplicateBinding,
    UnboundEventType,
    InvalidEncoding,
    NotFound,
    DuplicateVersion,
    InvalidKey,
    StorageError,
    Cancelled,
    UnhandledEvent,
    AggregateNotHandler,
    PreprocessorError,
    EventLoadError,
    HandlerError,
    SaveError,
    VersionGap,
    InvalidConfig,
}

impl ErrorKind {
    /// Returns the stable code for this kind.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NilInput => "NilInput",
            Self::InvalidField => "InvalidField",
            Self::DuplicateTag => "DuplicateTag",
            Self::DuplicateBinding => "DuplicateBinding",
            Self::UnboundEventType => "UnboundEventType",
            Self::InvalidEncoding => "InvalidEncoding",
            Self::NotFound => "NotFound",
            Self::DuplicateVersion => "DuplicateVersion",
            Self::InvalidKey => "InvalidKey",
            Self::StorageError => "StorageError",
            Self::Cancelled => "Cancelled",
            Self::UnhandledEvent => "UnhandledEvent",
            Self::AggregateNotHandler => "AggregateNotHandler",
            Self::PreprocessorError => "PreprocessorError",
            Self::EventLoadError => "EventLoadError",
            Self::HandlerError => "HandlerError",
            Self::SaveError => "SaveError",
            Self::VersionGap => "VersionGap",
            Self::InvalidConfig => "InvalidConfig",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Top-level error type.
#[derive(Debug, Error)]
pub enum Error {
    /// The inspector was handed a null value.
    #[error("nil input")]
    NilInput,

    /// A field is missing or has an unsupported shape.
    #[error("invalid field `{field}`: {reason}")]
    InvalidField {
        /// The offending field.
        field: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The same tag was declared on more than one field.
    #[error("duplicate tag `{tag}` on field `{field}`")]
    DuplicateTag {
        /// The repeated tag.
        tag: String,
        /// The second field carrying it.
        field: String,
    },

    /// An event type name was bound twice.
    #[error("event type `{0}` is already bound")]
    DuplicateBinding(String),

    /// A record names an event type with no binding.
    #[error("no binding for event type `{0}`")]
    UnboundEventType(String),

    /// Stored bytes could not be encoded or decoded.
    #[error("invalid encoding: {message}")]
    InvalidEncoding {
        /// Human-readable description.
        message: String,
        /// The underlying codec error.
        #[source]
        source: BoxError,
    },

    /// No events exist for the aggregate.
    #[error("aggregate not found: {0}")]
    NotFound(String),

    /// A record with the same `(aggregate_id, version)` already exists.
    #[error("duplicate version for aggregate {aggregate_id}{}", .version.map(|v| format!(" at version {v}")).unwrap_or_default())]
    DuplicateVersion {
        /// The aggregate that had the conflict.
        aggregate_id: String,
        /// The conflicting version, when the store can tell.
        version: Option<i64>,
        /// The store's own conflict error, if any.
        #[source]
        source: Option<BoxError>,
    },

    /// A stored key could not be parsed.
    #[error("invalid event key `{0}`")]
    InvalidKey(String),

    /// The underlying storage failed.
    #[error("storage error: {message}")]
    Storage {
        /// Human-readable description.
        message: String,
        /// The driver or service error.
        #[source]
        source: BoxError,
    },

    /// The operation was cancelled or its deadline expired.
    #[error("operation cancelled")]
    Cancelled,

    /// The aggregate declined an event during replay.
    #[error("aggregate was unable to handle event - {event_type}")]
    UnhandledEvent {
        /// The event type the aggregate rejected.
        event_type: String,
    },

    /// The aggregate does not handle the dispatched command.
    #[error("{aggregate} does not handle command {command}")]
    AggregateNotHandler {
        /// Aggregate type name.
        aggregate: &'static str,
        /// Command type name.
        command: &'static str,
    },

    /// A preprocessor rejected the command.
    #[error("preprocessor failed on command {command}")]
    Preprocessor {
        /// Command type name.
        command: &'static str,
        /// The preprocessor's error.
        #[source]
        source: BoxError,
    },

    /// The target aggregate could not be loaded.
    #[error("unable to load {aggregate} [{aggregate_id}]")]
    EventLoad {
        /// Aggregate type name.
        aggregate: &'static str,
        /// The aggregate identifier.
        aggregate_id: String,
        /// The load failure.
        #[source]
        source: Box<Error>,
    },

    /// The command handler returned an error.
    #[error("failed to apply command {command} to aggregate {aggregate}")]
    Handler {
        /// Command type name.
        command: &'static str,
        /// Aggregate type name.
        aggregate: &'static str,
        /// The handler's error.
        #[source]
        source: BoxError,
    },

    /// The produced events could not be persisted.
    #[error("failed to save events for {aggregate} [{aggregate_id}]")]
    Save {
        /// Aggregate type name.
        aggregate: &'static str,
        /// The aggregate identifier.
        aggregate_id: String,
        /// The persistence failure.
        #[source]
        source: Box<Error>,
    },

    /// A replayed history skipped a version.
    #[error("version gap in aggregate {aggregate_id}: expected {expected}, found {found}")]
    VersionGap {
        /// The aggregate identifier.
        aggregate_id: String,
        /// The version that should have come next.
        expected: i64,
        /// The version actually found.
        found: i64,
    },

    /// A component was configured with unusable options.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Returns the stable kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NilInput => ErrorKind::NilInput,
            Self::InvalidField { .. } => ErrorKind::InvalidField,
            Self::DuplicateTag { .. } => ErrorKind::DuplicateTag,
            Self::DuplicateBinding(_) => ErrorKind::DuplicateBinding,
            Self::UnboundEventType(_) => ErrorKind::UnboundEventType,
            Self::InvalidEncoding { .. } => ErrorKind::InvalidEncoding,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::DuplicateVersion { .. } => ErrorKind::DuplicateVersion,
            Self::InvalidKey(_) => ErrorKind::InvalidKey,
            Self::Storage { .. } => ErrorKind::StorageError,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::UnhandledEvent { .. } => ErrorKind::UnhandledEvent,
            Self::AggregateNotHandler { .. } => ErrorKind::AggregateNotHandler,
            Self::Preprocessor { .. } => ErrorKind::PreprocessorError,
            Self::EventLoad { .. } => ErrorKind::EventLoadError,
            Self::Handler { .. } => ErrorKind::HandlerError,
            Self::Save { .. } => ErrorKind::SaveError,
            Self::VersionGap { .. } => ErrorKind::VersionGap,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
        }
    }

    /// Returns the stable code of this error, e.g. `"DuplicateVersion"`.
    #[must_use]
    pub fn code(&self) -> &'static str {
        self.kind().code()
    }

    /// Returns the error wrapped by a dispatcher stage, if any.
    #[must_use]
    pub fn inner(&self) -> Option<&Error> {
        match self {
            Self::EventLoad { source, .. } | Self::Save { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }

    /// Whether this error, or the store error it wraps, is an optimistic
    /// concurrency conflict. Callers reload and retry on `true`.
    #[must_use]
    pub fn is_duplicate_version(&self) -> bool {
        match self {
            Self::DuplicateVersion { .. } => true,
            other => other.inner().is_some_and(Error::is_duplicate_version),
        }
    }

    /// Builds an `InvalidField` error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Builds an `InvalidEncoding` error from a codec failure.
    pub fn encoding(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::InvalidEncoding {
            message: message.into(),
            source: source.into(),
        }
    }

    /// Builds a `Storage` error from a driver or service failure.
    pub fn storage(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Storage {
            message: message.into(),
            source: source.into(),
        }
    }

    /// Builds a `DuplicateVersion` error without a store-specific cause.
    pub fn duplicate_version(aggregate_id: impl Into<String>, version: Option<i64>) -> Self {
        Self::DuplicateVersion {
            aggregate_id: aggregate_id.into(),
            version,
            source: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable_identifiers() {
        assert_eq!(Error::NilInput.code(), "NilInput");
        assert_eq!(Error::Cancelled.code(), "Cancelled");
        assert_eq!(
            Error::duplicate_version("a", Some(3)).code(),
            "DuplicateVersion"
        );
        assert_eq!(ErrorKind::StorageError.to_string(), "StorageError");
    }

    #[test]
    fn test_duplicate_version_is_visible_through_save_wrapper() {
        let err = Error::Save {
            aggregate: "User",
            aggregate_id: "u1".into(),
            source: Box::new(Error::duplicate_version("u1", Some(3))),
        };

        assert_eq!(err.kind(), ErrorKind::SaveError);
        assert!(err.is_duplicate_version());
        assert_eq!(err.inner().map(Error::kind), Some(ErrorKind::DuplicateVersion));
    }

    #[test]
    fn test_handler_error_is_not_a_duplicate_version() {
        let err = Error::Handler {
            command: "ChangeEmail",
            aggregate: "User",
            source: "boom".into(),
        };

        assert!(!err.is_duplicate_version());
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_duplicate_version_message_includes_version() {
        let err = Error::duplicate_version("u1", Some(7));
        assert_eq!(err.to_string(), "duplicate version for aggregate u1 at version 7");

        let err = Error::duplicate_version("u1", None);
        assert_eq!(err.to_string(), "duplicate version for aggregate u1");
    }
}

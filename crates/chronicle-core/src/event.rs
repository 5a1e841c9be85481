//! Events and the metadata inspector.
//!
//! Every event shape implements [`Event`], which exposes the triple the
//! store layer needs: aggregate id, version and occurrence time, plus a
//! stable type name. Shapes that embed a [`Model`] or keep the triple in
//! named fields get the implementation from [`impl_event!`](crate::impl_event).
//!
//! [`inspect_value`] is the dynamic fallback for untyped JSON values, driven
//! by a [`TagSchema`] built from textual field tags.

use std::borrow::Cow;

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::epoch::EpochMillis;
use crate::error::{Error, Result};

/// A past-tense fact about one aggregate.
pub trait Event: Send + Sync {
    /// The aggregate this event belongs to.
    fn aggregate_id(&self) -> &str;

    /// The aggregate version this event produces.
    fn version(&self) -> i64;

    /// When the event took place.
    fn occurred_at(&self) -> EpochMillis;

    /// Stable registry name. Defaults to the unqualified type name.
    fn event_type(&self) -> &str {
        short_type_name(std::any::type_name::<Self>())
    }
}

/// Strips module paths and generic arguments from a type name.
#[must_use]
pub fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Metadata view of an event, derived on demand and never stored.
#[derive(Debug, Clone)]
pub struct EventMeta<'a, E: ?Sized> {
    /// The aggregate id.
    pub aggregate_id: Cow<'a, str>,
    /// The event version.
    pub version: i64,
    /// When the event took place.
    pub occurred_at: EpochMillis,
    /// Registry name of the event.
    pub event_type: Cow<'a, str>,
    /// The inspected event.
    pub event: &'a E,
}

/// Extracts and validates the metadata of a typed event.
///
/// # Errors
///
/// Returns `InvalidField` if the aggregate id is empty or the version is not
/// positive.
pub fn inspect<E: Event + ?Sized>(event: &E) -> Result<EventMeta<'_, E>> {
    let aggregate_id = event.aggregate_id();
    if aggregate_id.is_empty() {
        return Err(Error::invalid_field("id", "aggregate id must not be empty"));
    }

    let version = event.version();
    if version < 1 {
        return Err(Error::invalid_field(
            "version",
            format!("version must be positive, got {version}"),
        ));
    }

    Ok(EventMeta {
        aggregate_id: Cow::Borrowed(aggregate_id),
        version,
        occurred_at: event.occurred_at(),
        event_type: Cow::Borrowed(event.event_type()),
        event,
    })
}

/// Embeddable base record carrying the event triple.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    /// The aggregate id.
    pub id: String,
    /// The event version.
    pub version: i64,
    /// When the event took place.
    pub at: EpochMillis,
}

impl Model {
    /// Builds a model for `id` at `version`.
    #[must_use]
    pub fn new(id: impl Into<String>, version: i64, at: EpochMillis) -> Self {
        Self {
            id: id.into(),
            version,
            at,
        }
    }
}

/// Implements [`Event`] for a struct.
///
/// Two forms are accepted:
///
/// ```ignore
/// // the triple lives in an embedded `Model`
/// impl_event!(UserCreated, model = model);
///
/// // the triple lives in named fields; `type` overrides the registry name
/// impl_event!(EmailChanged, id = user_id, version = rev, at = when, type = "email_changed");
/// ```
///
/// The `id` field must implement `AsRef<str>`, the `version` field must
/// convert into `i64`, and the `at` field must convert into
/// [`EpochMillis`](crate::epoch::EpochMillis) (`i64` millis, `EpochMillis` or
/// `DateTime<Utc>`).
#[macro_export]
macro_rules! impl_event {
    ($ty:ty, model = $model:ident $(, type = $name:literal)? $(,)?) => {
        impl $crate::event::Event for $ty {
            fn aggregate_id(&self) -> &str {
                &self.$model.id
            }

            fn version(&self) -> i64 {
                self.$model.version
            }

            fn occurred_at(&self) -> $crate::epoch::EpochMillis {
                self.$model.at
            }

            $(
                fn event_type(&self) -> &str {
                    $name
                }
            )?
        }
    };
    ($ty:ty, id = $id:ident, version = $version:ident, at = $at:ident $(, type = $name:literal)? $(,)?) => {
        impl $crate::event::Event for $ty {
            fn aggregate_id(&self) -> &str {
                ::core::convert::AsRef::<str>::as_ref(&self.$id)
            }

            fn version(&self) -> i64 {
                ::core::convert::Into::<i64>::into(self.$version)
            }

            fn occurred_at(&self) -> $crate::epoch::EpochMillis {
                ::core::convert::Into::<$crate::epoch::EpochMillis>::into(self.$at)
            }

            $(
                fn event_type(&self) -> &str {
                    $name
                }
            )?
        }
    };
}

/// Field tags for inspecting untyped JSON events.
///
/// Built from `(field, tag)` pairs where a tag is `id`, `version` or `at`,
/// and an `id` tag may carry a `type:<name>` suffix, e.g. `"id,type:user_created"`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSchema {
    id: Option<String>,
    version: Option<String>,
    at: Option<String>,
    event_type: Option<String>,
}

impl TagSchema {
    /// Parses field tags.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateTag` if `id`, `version`, `at` or `type:` appears on
    /// more than one field, and `InvalidField` for an unknown or empty tag or
    /// a `type:` tag on a field not tagged `id`.
    pub fn parse<'a, I>(tags: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut schema = Self::default();

        for (field, tag) in tags {
            let parts: Vec<&str> = tag.split(',').map(str::trim).filter(|p| !p.is_empty()).collect();
            if parts.iter().any(|p| p.starts_with("type:")) && !parts.contains(&"id") {
                return Err(Error::invalid_field(field, "`type:` is only allowed alongside `id`"));
            }

            for part in parts {
                let (slot, name, value) = match part {
                    "id" => (&mut schema.id, "id", field),
                    "version" => (&mut schema.version, "version", field),
                    "at" => (&mut schema.at, "at", field),
                    other => match other.strip_prefix("type:") {
                        Some("") => {
                            return Err(Error::invalid_field(field, "empty `type:` tag"));
                        }
                        Some(literal) => (&mut schema.event_type, "type", literal),
                        None => {
                            return Err(Error::invalid_field(
                                field,
                                format!("unknown tag `{other}`"),
                            ));
                        }
                    },
                };

                if slot.is_some() {
                    return Err(Error::DuplicateTag {
                        tag: name.to_owned(),
                        field: field.to_owned(),
                    });
                }
                *slot = Some(value.to_owned());
            }
        }

        Ok(schema)
    }

    /// Whether no tags were declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.version.is_none() && self.at.is_none()
    }

    /// The `type:` override, if any.
    #[must_use]
    pub fn event_type(&self) -> Option<&str> {
        self.event_type.as_deref()
    }
}

/// Extracts metadata from an untyped JSON event.
///
/// With an empty schema the triple is discovered from top-level `id`,
/// `version` and `at` fields, or from the first nested object carrying all
/// three (an embedded [`Model`]).
///
/// # Errors
///
/// `NilInput` for `null`; `InvalidField` for a non-object value, a missing
/// field or a field of unsupported shape.
pub fn inspect_value<'a>(
    value: &'a Value,
    schema: &'a TagSchema,
    default_type: &'a str,
) -> Result<EventMeta<'a, Value>> {
    let object = match value {
        Value::Null => return Err(Error::NilInput),
        Value::Object(object) => object,
        other => {
            return Err(Error::invalid_field(
                "<event>",
                format!("expected an object, got {}", json_kind(other)),
            ));
        }
    };

    let (fields, id, version, at) = if schema.is_empty() {
        (embedded_model(object)?, "id", "version", "at")
    } else {
        (
            object,
            required_tag(schema.id.as_deref(), "id")?,
            required_tag(schema.version.as_deref(), "version")?,
            required_tag(schema.at.as_deref(), "at")?,
        )
    };

    let aggregate_id = match field(fields, id)? {
        Value::String(s) if s.is_empty() => {
            return Err(Error::invalid_field(id, "aggregate id must not be empty"));
        }
        Value::String(s) => Cow::Borrowed(s.as_str()),
        Value::Number(n) => Cow::Owned(n.to_string()),
        other => {
            return Err(Error::invalid_field(
                id,
                format!("expected a string, got {}", json_kind(other)),
            ));
        }
    };

    let version = field(fields, version)?
        .as_i64()
        .ok_or_else(|| Error::invalid_field(version, "expected an integer"))?;

    let occurred_at = match field(fields, at)? {
        Value::Number(n) => n
            .as_i64()
            .map(EpochMillis)
            .ok_or_else(|| Error::invalid_field(at, "expected integer milliseconds"))?,
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|t| EpochMillis(t.timestamp_millis()))
            .map_err(|e| Error::invalid_field(at, format!("invalid timestamp: {e}")))?,
        other => {
            return Err(Error::invalid_field(
                at,
                format!("expected a timestamp, got {}", json_kind(other)),
            ));
        }
    };

    Ok(EventMeta {
        aggregate_id,
        version,
        occurred_at,
        event_type: Cow::Borrowed(schema.event_type().unwrap_or(default_type)),
        event: value,
    })
}

fn required_tag<'a>(field: Option<&'a str>, tag: &str) -> Result<&'a str> {
    field.ok_or_else(|| Error::invalid_field(tag, format!("no field tagged `{tag}`")))
}

fn field<'a>(object: &'a Map<String, Value>, name: &str) -> Result<&'a Value> {
    object
        .get(name)
        .ok_or_else(|| Error::invalid_field(name, "missing"))
}

fn embedded_model(object: &Map<String, Value>) -> Result<&Map<String, Value>> {
    let has_triple = |o: &Map<String, Value>| ["id", "version", "at"].iter().all(|k| o.contains_key(*k));

    if has_triple(object) {
        return Ok(object);
    }

    object
        .values()
        .filter_map(Value::as_object)
        .find(|nested| has_triple(nested))
        .ok_or_else(|| Error::invalid_field("id", "no tagged fields and no embedded model"))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

//! Serializer registry and the `{t, d}` envelope.
//!
//! A [`Serializer`] maps stable event type names to decoders. Stored bytes
//! are a self-describing JSON envelope:
//!
//! ```json
//! { "t": "UserCreated", "d": { "model": { "id": "u1", "version": 1, "at": 0 }, "name": "Jo" } }
//! ```

use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::event::{Event, inspect};
use crate::store::Record;

type Decoder<E> = fn(Value) -> serde_json::Result<E>;

/// Registry entry: a type name and a decoder that allocates a fresh event
/// of the bound shape.
pub struct Binding<E> {
    event_type: String,
    decode: Decoder<E>,
}

impl<E> Binding<E> {
    /// Binds shape `T` under the name its [`Event::event_type`] reports.
    #[must_use]
    pub fn of<T>() -> Self
    where
        T: Event + Default + DeserializeOwned + Into<E>,
    {
        Self::named::<T>(T::default().event_type())
    }

    /// Binds shape `T` under an explicit name.
    #[must_use]
    pub fn named<T>(event_type: impl Into<String>) -> Self
    where
        T: DeserializeOwned + Into<E>,
    {
        Self {
            event_type: event_type.into(),
            decode: decode_as::<T, E>,
        }
    }

    /// The bound type name.
    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.event_type
    }
}

impl<E> fmt::Debug for Binding<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("event_type", &self.event_type)
            .finish_non_exhaustive()
    }
}

fn decode_as<T, E>(payload: Value) -> serde_json::Result<E>
where
    T: DeserializeOwned + Into<E>,
{
    serde_json::from_value::<T>(payload).map(Into::into)
}

/// Converts events of type `E` to and from [`Record`]s.
pub trait Serializer<E>: Send + Sync {
    /// Registers a shape.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateBinding` if the name is already bound.
    fn bind(&mut self, binding: Binding<E>) -> Result<()>;

    /// Encodes an event, lifting its version and time into the record.
    ///
    /// # Errors
    ///
    /// Returns the inspector's error for invalid metadata and
    /// `InvalidEncoding` if the payload cannot be encoded.
    fn serialize(&self, event: &E) -> Result<Record>;

    /// Decodes a record into a fresh event of its bound shape.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEncoding` for malformed bytes or payloads and
    /// `UnboundEventType` for an unknown type name.
    fn deserialize(&self, record: &Record) -> Result<E>;
}

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    t: T,
    d: Value,
}

/// JSON envelope serializer. The default for every repository.
pub struct JsonSerializer<E> {
    bindings: HashMap<String, Decoder<E>>,
}

impl<E> JsonSerializer<E> {
    /// Creates a serializer with no bindings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bindings: HashMap::new(),
        }
    }

    /// Whether `event_type` has a binding.
    #[must_use]
    pub fn is_bound(&self, event_type: &str) -> bool {
        self.bindings.contains_key(event_type)
    }
}

impl<E> Default for JsonSerializer<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for JsonSerializer<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.bindings.keys().collect();
        names.sort();
        f.debug_struct("JsonSerializer")
            .field("bindings", &names)
            .finish()
    }
}

impl<E> Serializer<E> for JsonSerializer<E>
where
    E: Event + Serialize,
{
    fn bind(&mut self, binding: Binding<E>) -> Result<()> {
        if self.bindings.contains_key(&binding.event_type) {
            return Err(Error::DuplicateBinding(binding.event_type));
        }

        tracing::debug!(event_type = %binding.event_type, "bound event type");
        self.bindings.insert(binding.event_type, binding.decode);
        Ok(())
    }

    fn serialize(&self, event: &E) -> Result<Record> {
        let meta = inspect(event)?;
        let payload = serde_json::to_value(event)
            .map_err(|e| Error::encoding(format!("unable to encode {}", meta.event_type), e))?;
        let data = serde_json::to_vec(&Envelope {
            t: meta.event_type.as_ref(),
            d: payload,
        })
        .map_err(|e| Error::encoding("unable to encode envelope", e))?;

        Ok(Record {
            version: meta.version,
            at: meta.occurred_at,
            data,
        })
    }

    fn deserialize(&self, record: &Record) -> Result<E> {
        let envelope: Envelope<String> = serde_json::from_slice(&record.data).map_err(|e| {
            Error::encoding(format!("malformed envelope at version {}", record.version), e)
        })?;

        let decode = self
            .bindings
            .get(&envelope.t)
            .ok_or_else(|| Error::UnboundEventType(envelope.t.clone()))?;

        decode(envelope.d)
            .map_err(|e| Error::encoding(format!("unable to decode {}", envelope.t), e))
    }
}

/// Declares an aggregate's event sum type.
///
/// Generates the enum (serialized untagged, so payloads carry only the
/// variant's own fields), a `From` conversion per variant, an [`Event`]
/// implementation that delegates to the variant, and `bindings()` returning
/// one [`Binding`] per variant.
///
/// ```ignore
/// event_set! {
///     #[derive(Debug, Clone, PartialEq)]
///     pub enum UserEvent {
///         Created(UserCreated),
///         EmailChanged(EmailChanged),
///     }
/// }
/// ```
///
/// Variant types must implement `Event`, `Default`, `Serialize` and
/// `DeserializeOwned`, and the calling crate must depend on `serde`.
#[macro_export]
macro_rules! event_set {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident($inner:ty) ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(::serde::Serialize, ::serde::Deserialize)]
        #[serde(untagged)]
        $vis enum $name {
            $( $(#[$vmeta])* $variant($inner) ),+
        }

        $(
            impl ::core::convert::From<$inner> for $name {
                fn from(event: $inner) -> Self {
                    Self::$variant(event)
                }
            }
        )+

        impl $crate::event::Event for $name {
            fn aggregate_id(&self) -> &str {
                match self {
                    $( Self::$variant(event) => $crate::event::Event::aggregate_id(event), )+
                }
            }

            fn version(&self) -> i64 {
                match self {
                    $( Self::$variant(event) => $crate::event::Event::version(event), )+
                }
            }

            fn occurred_at(&self) -> $crate::epoch::EpochMillis {
                match self {
                    $( Self::$variant(event) => $crate::event::Event::occurred_at(event), )+
                }
            }

            fn event_type(&self) -> &str {
                match self {
                    $( Self::$variant(event) => $crate::event::Event::event_type(event), )+
                }
            }
        }

        impl $name {
            /// One binding per variant, named by the variant's event type.
            #[must_use]
            pub fn bindings() -> ::std::vec::Vec<$crate::serializer::Binding<Self>> {
                ::std::vec![ $( $crate::serializer::Binding::of::<$inner>() ),+ ]
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::epoch::EpochMillis;
    use crate::error::ErrorKind;
    use crate::event::Model;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Opened {
        model: Model,
        owner: String,
    }

    crate::impl_event!(Opened, model = model);

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Deposited {
        model: Model,
        amount: u64,
        #[serde(default)]
        memo: Option<String>,
    }

    crate::impl_event!(Deposited, model = model, type = "deposited");

    crate::event_set! {
        #[derive(Debug, Clone, PartialEq)]
        enum AccountEvent {
            Opened(Opened),
            Deposited(Deposited),
        }
    }

    fn serializer() -> JsonSerializer<AccountEvent> {
        let mut serializer = JsonSerializer::new();
        for binding in AccountEvent::bindings() {
            serializer.bind(binding).unwrap();
        }
        serializer
    }

    #[test]
    fn test_round_trip_preserves_event() {
        // Arrange
        let serializer = serializer();
        let event = AccountEvent::from(Deposited {
            model: Model::new("acc-1", 2, EpochMillis(1_000)),
            amount: 50,
            memo: Some("rent".into()),
        });

        // Act
        let record = serializer.serialize(&event).unwrap();
        let back = serializer.deserialize(&record).unwrap();

        // Assert
        assert_eq!(record.version, 2);
        assert_eq!(record.at, EpochMillis(1_000));
        assert_eq!(back, event);
    }

    #[test]
    fn test_envelope_shape() {
        let serializer = serializer();
        let event = AccountEvent::from(Opened {
            model: Model::new("acc-1", 1, EpochMillis(5)),
            owner: "jo".into(),
        });

        let record = serializer.serialize(&event).unwrap();
        let value: Value = serde_json::from_slice(&record.data).unwrap();

        assert_eq!(value["t"], "Opened");
        assert_eq!(value["d"]["owner"], "jo");
        assert_eq!(value["d"]["model"]["id"], "acc-1");
    }

    #[test]
    fn test_rebinding_a_name_fails() {
        let mut serializer = serializer();

        let result = serializer.bind(Binding::of::<Opened>());

        match result {
            Err(Error::DuplicateBinding(name)) => assert_eq!(name, "Opened"),
            other => panic!("expected DuplicateBinding, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_is_unbound() {
        let serializer = serializer();
        let record = Record {
            version: 1,
            at: EpochMillis(0),
            data: br#"{"t":"Closed","d":{}}"#.to_vec(),
        };

        match serializer.deserialize(&record) {
            Err(Error::UnboundEventType(name)) => assert_eq!(name, "Closed"),
            other => panic!("expected UnboundEventType, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_bytes_and_payloads_are_invalid_encoding() {
        let serializer = serializer();
        let garbage = Record {
            version: 1,
            at: EpochMillis(0),
            data: b"not json".to_vec(),
        };
        let wrong_shape = Record {
            version: 1,
            at: EpochMillis(0),
            data: br#"{"t":"deposited","d":{"amount":"lots"}}"#.to_vec(),
        };

        assert_eq!(
            serializer.deserialize(&garbage).unwrap_err().kind(),
            ErrorKind::InvalidEncoding
        );
        assert_eq!(
            serializer.deserialize(&wrong_shape).unwrap_err().kind(),
            ErrorKind::InvalidEncoding
        );
    }

    #[test]
    fn test_old_payload_without_optional_field_still_decodes() {
        let serializer = serializer();
        let record = Record {
            version: 2,
            at: EpochMillis(0),
            data: br#"{"t":"deposited","d":{"model":{"id":"a","version":2,"at":0},"amount":5}}"#
                .to_vec(),
        };

        let event = serializer.deserialize(&record).unwrap();

        match event {
            AccountEvent::Deposited(d) => {
                assert_eq!(d.amount, 5);
                assert_eq!(d.memo, None);
            }
            other => panic!("expected Deposited, got {other:?}"),
        }
    }

    #[test]
    fn test_serialize_rejects_invalid_metadata() {
        let serializer = serializer();
        let event = AccountEvent::from(Opened::default());

        assert_eq!(
            serializer.serialize(&event).unwrap_err().kind(),
            ErrorKind::InvalidField
        );
    }
}

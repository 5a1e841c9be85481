//! Table provisioning shape.

use crate::memory::MemoryTable;

/// Scalar type of a key attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeType {
    /// String (`S`).
    String,
    /// Number (`N`).
    Number,
}

impl AttributeType {
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::String => "S",
            Self::Number => "N",
        }
    }
}

/// Role of a key attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Hash,
    Range,
}

impl KeyType {
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::Hash => "HASH",
            Self::Range => "RANGE",
        }
    }
}

/// One key attribute of the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDefinition {
    pub name: String,
    pub attribute_type: AttributeType,
    pub key_type: KeyType,
}

/// Everything needed to create the event table: a string hash key, a
/// numeric range key, provisioned throughput and, optionally, a stream of
/// new and old images for [`crate::streams`] consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefinition {
    pub table_name: String,
    pub keys: [KeyDefinition; 2],
    pub read_capacity: i64,
    pub write_capacity: i64,
    pub stream_new_and_old_images: bool,
}

impl TableDefinition {
    /// A definition with 1 read and 1 write unit and no stream.
    #[must_use]
    pub fn new(table_name: &str, hash_key: &str, range_key: &str) -> Self {
        Self {
            table_name: table_name.to_owned(),
            keys: [
                KeyDefinition {
                    name: hash_key.to_owned(),
                    attribute_type: AttributeType::String,
                    key_type: KeyType::Hash,
                },
                KeyDefinition {
                    name: range_key.to_owned(),
                    attribute_type: AttributeType::Number,
                    key_type: KeyType::Range,
                },
            ],
            read_capacity: 1,
            write_capacity: 1,
            stream_new_and_old_images: false,
        }
    }

    #[must_use]
    pub fn with_capacity(mut self, read: i64, write: i64) -> Self {
        self.read_capacity = read;
        self.write_capacity = write;
        self
    }

    #[must_use]
    pub fn with_stream(mut self) -> Self {
        self.stream_new_and_old_images = true;
        self
    }

    #[must_use]
    pub fn hash_key(&self) -> &str {
        &self.keys[0].name
    }

    #[must_use]
    pub fn range_key(&self) -> &str {
        &self.keys[1].name
    }

    /// An empty in-memory table with this definition's name and keys.
    #[must_use]
    pub fn create_in_memory(&self) -> MemoryTable {
        MemoryTable::new(&self.table_name).with_keys(self.hash_key(), self.range_key())
    }
}

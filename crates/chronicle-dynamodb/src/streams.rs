//! Decoding table stream records.
//!
//! An append rewrites a whole row, so a change notification carries the old
//! and new images of that row. The events it added are the slots present in
//! the new image and absent from the old one.

use chronicle_core::error::{Error, Result};
use chronicle_core::store::{History, Record};

use crate::model::{AttributeValue, Item};
use crate::slot::{is_slot, parse_slot};

/// One change notification for a row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamRecord {
    /// The row before the change; `None` when the row was created.
    pub old_image: Option<Item>,
    /// The row after the change; `None` when the row was removed.
    pub new_image: Option<Item>,
}

/// Records added by `change`, ascending by version.
///
/// # Errors
///
/// Returns `InvalidKey` for an unparseable slot name and `Storage` for a
/// slot that does not hold binary data.
pub fn new_history(change: &StreamRecord) -> Result<History> {
    let Some(new_image) = &change.new_image else {
        return Ok(History::new());
    };

    let mut history = History::new();
    for (name, value) in new_image {
        if !is_slot(name) {
            continue;
        }
        if change.old_image.as_ref().is_some_and(|old| old.contains_key(name)) {
            continue;
        }
        let (version, at) = parse_slot(name)?;
        let AttributeValue::B(data) = value else {
            return Err(Error::storage(
                format!("slot `{name}` in stream image is not binary"),
                format!("unexpected attribute type for {name}"),
            ));
        };
        history.push(Record {
            version,
            at,
            data: data.clone(),
        });
    }
    history.sort_by_key(|r| r.version);
    Ok(history)
}

/// Envelope bytes of the events added by `change`, ascending by version.
///
/// # Errors
///
/// Same as [`new_history`].
pub fn new_records(change: &StreamRecord) -> Result<Vec<Vec<u8>>> {
    Ok(new_history(change)?.into_iter().map(|r| r.data).collect())
}

/// Table name in a stream or table ARN
/// (`arn:aws:dynamodb:<region>:<account>:table/<name>/stream/<label>`).
#[must_use]
pub fn table_name_from_arn(arn: &str) -> Option<&str> {
    arn.split('/').nth(1).filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use chronicle_core::error::ErrorKind;

    use super::*;

    fn row(slots: &[(&str, &[u8])]) -> Item {
        let mut item = Item::from([
            ("key".to_owned(), AttributeValue::S("agg".into())),
            ("partition".to_owned(), AttributeValue::number(0)),
            ("revision".to_owned(), AttributeValue::number(1)),
        ]);
        for (name, data) in slots {
            item.insert((*name).to_owned(), AttributeValue::B(data.to_vec()));
        }
        item
    }

    #[test]
    fn test_only_added_slots_are_reported_in_order() {
        // Arrange
        let change = StreamRecord {
            old_image: Some(row(&[("_1:0", b"one")])),
            new_image: Some(row(&[("_1:0", b"one"), ("_3:2", b"three"), ("_2:1", b"two")])),
        };

        // Act
        let records = new_records(&change).unwrap();

        // Assert
        assert_eq!(records, vec![b"two".to_vec(), b"three".to_vec()]);
    }

    #[test]
    fn test_created_row_reports_every_slot() {
        let change = StreamRecord {
            old_image: None,
            new_image: Some(row(&[("_1:0", b"one")])),
        };

        let history = new_history(&change).unwrap();

        assert_eq!(history.len(), 1);
        assert_eq!(history[0].version, 1);
    }

    #[test]
    fn test_removed_row_reports_nothing() {
        let change = StreamRecord {
            old_image: Some(row(&[("_1:0", b"one")])),
            new_image: None,
        };

        assert!(new_records(&change).unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_slot_is_invalid_key() {
        let change = StreamRecord {
            old_image: None,
            new_image: Some(row(&[("_x:0", b"one")])),
        };

        assert_eq!(new_records(&change).unwrap_err().kind(), ErrorKind::InvalidKey);
    }

    #[test]
    fn test_table_name_from_arn() {
        assert_eq!(
            table_name_from_arn(
                "arn:aws:dynamodb:us-east-1:123456789012:table/orders/stream/2026-01-01T00:00:00.000"
            ),
            Some("orders")
        );
        assert_eq!(table_name_from_arn("arn:aws:dynamodb:us-east-1:1:table/users"), Some("users"));
        assert_eq!(table_name_from_arn("not-an-arn"), None);
    }
}

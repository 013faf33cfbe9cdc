//! Patch merging.

use docrud_proto::{Document, Value};

/// Merge a partial document over an existing one.
///
/// Null fields of `incoming` never overwrite. Nested documents merge field
/// by field; every other value, arrays included, replaces the existing one.
pub fn merge_patch(existing: &mut Document, incoming: Document) {
    for (key, value) in incoming {
        match value {
            Value::Null => {}
            Value::Document(inner) => match existing.get_mut(&key) {
                Some(Value::Document(current)) => merge_patch(current, inner),
                _ => {
                    existing.insert(key, strip_nulls(inner));
                }
            },
            other => {
                existing.insert(key, other);
            }
        }
    }
}

fn strip_nulls(doc: Document) -> Document {
    doc.into_iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| match value {
            Value::Document(inner) => (key, Value::Document(strip_nulls(inner))),
            other => (key, other),
        })
        .collect()
}

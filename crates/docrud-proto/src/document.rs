//! Ordered string-keyed documents.

use crate::error::Error;
use crate::object_id::ObjectId;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::{self, BTreeMap};

/// Field holding a document's identifier.
pub const ID_FIELD: &str = "_id";

/// Field holding the store-maintained version marker.
pub const VERSION_FIELD: &str = "__v";

/// A document: an ordered map from field name to value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(BTreeMap<String, Value>);

impl Document {
    /// Create an empty document.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Insert a field, returning the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.0.get_mut(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Get a value by dot-path, descending through nested documents.
    ///
    /// Numeric segments index into arrays.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.0.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Document(doc) => doc.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Set a value by dot-path, creating intermediate documents as needed.
    ///
    /// A non-document value sitting on an intermediate segment is replaced.
    pub fn set_path(&mut self, path: &str, value: impl Into<Value>) {
        match path.split_once('.') {
            None => {
                self.0.insert(path.to_string(), value.into());
            }
            Some((head, rest)) => {
                let entry = self
                    .0
                    .entry(head.to_string())
                    .or_insert_with(|| Value::Document(Document::new()));
                if !entry.is_document() {
                    *entry = Value::Document(Document::new());
                }
                if let Value::Document(inner) = entry {
                    inner.set_path(rest, value);
                }
            }
        }
    }

    /// The document's `_id`, when it holds an identifier.
    pub fn object_id(&self) -> Option<ObjectId> {
        match self.0.get(ID_FIELD)? {
            Value::ObjectId(id) => Some(*id),
            Value::String(s) => ObjectId::parse_str(s).ok(),
            _ => None,
        }
    }

    /// Convert a JSON object into a document.
    pub fn from_json(json: serde_json::Value) -> Result<Self, Error> {
        match Value::from_json(json) {
            Value::Document(doc) => Ok(doc),
            other => Err(Error::InvalidDocument(format!(
                "expected an object, got {}",
                other.type_name()
            ))),
        }
    }

    /// Render as a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    /// Consume into the underlying map.
    pub fn into_inner(self) -> BTreeMap<String, Value> {
        self.0
    }
}

impl From<BTreeMap<String, Value>> for Document {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Document {
    type Item = (String, Value);
    type IntoIter = btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Document {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl Extend<(String, Value)> for Document {
    fn extend<I: IntoIterator<Item = (String, Value)>>(&mut self, iter: I) {
        self.0.extend(iter)
    }
}

//! Condition trees.
//!
//! A condition tree is a document whose `$`-prefixed keys are operators and
//! whose other keys are dot-path field names:
//!
//! ```text
//! { "age": { "$gte": 18 }, "$or": [ { "role": "admin" }, { "owner": "u1" } ] }
//! ```
//!
//! The empty tree matches everything and serves as the always-true
//! placeholder when composing authorization filters.

use crate::document::Document;
use crate::error::Error;
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// Logical conjunction over a list of condition trees.
pub const AND: &str = "$and";
/// Logical disjunction over a list of condition trees.
pub const OR: &str = "$or";
/// Negated disjunction over a list of condition trees.
pub const NOR: &str = "$nor";

/// Check whether a key names an operator rather than a field.
pub fn is_operator(key: &str) -> bool {
    key.starts_with('$')
}

/// A condition tree over document fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conditions(Document);

impl Conditions {
    /// The always-true condition.
    pub fn always() -> Self {
        Self(Document::new())
    }

    /// Alias for [`Conditions::always`].
    pub fn new() -> Self {
        Self::always()
    }

    /// Check whether this tree places no constraint.
    pub fn is_always(&self) -> bool {
        self.0.is_empty()
    }

    /// `{field: value}` (implicit equality).
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self(Document::new().with(field, value))
    }

    /// `{field: {op: value}}`.
    pub fn op(field: impl Into<String>, op: &str, value: impl Into<Value>) -> Self {
        Self(Document::new().with(field, Document::new().with(op, value)))
    }

    /// `{"$and": [..]}`.
    pub fn and(conditions: impl IntoIterator<Item = Conditions>) -> Self {
        Self::logical(AND, conditions)
    }

    /// `{"$or": [..]}`.
    pub fn or(conditions: impl IntoIterator<Item = Conditions>) -> Self {
        Self::logical(OR, conditions)
    }

    /// `{"$nor": [..]}`.
    pub fn nor(conditions: impl IntoIterator<Item = Conditions>) -> Self {
        Self::logical(NOR, conditions)
    }

    /// `{"$and": [{}, ..conditions]}`.
    ///
    /// The leading empty tree keeps the conjunction well formed when the list
    /// is empty, in which case the result matches everything.
    pub fn and_always(conditions: impl IntoIterator<Item = Conditions>) -> Self {
        Self::and(std::iter::once(Conditions::always()).chain(conditions))
    }

    fn logical(op: &str, conditions: impl IntoIterator<Item = Conditions>) -> Self {
        let items: Vec<Value> = conditions
            .into_iter()
            .map(|c| Value::Document(c.0))
            .collect();
        Self(Document::new().with(op, Value::Array(items)))
    }

    /// Builder-style implicit equality on a field.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.merge(Conditions::eq(field, value));
        self
    }

    /// Builder-style operator on a field.
    pub fn with_op(mut self, field: impl Into<String>, op: &str, value: impl Into<Value>) -> Self {
        self.merge(Conditions::op(field, op, value));
        self
    }

    /// Merge another tree into this one so that the result matches the
    /// conjunction of both.
    ///
    /// `$and`/`$nor` lists are concatenated, operator maps on the same field
    /// are combined, and any remaining collision is moved into `$and`.
    pub fn merge(&mut self, other: Conditions) {
        for (key, value) in other.0 {
            let Some(existing) = self.0.get_mut(&key) else {
                self.0.insert(key, value);
                continue;
            };
            if *existing == value {
                continue;
            }

            if key == AND || key == NOR {
                if let (Value::Array(left), Value::Array(right)) = (&mut *existing, &value) {
                    left.extend(right.iter().cloned());
                    continue;
                }
            }

            if !is_operator(&key) {
                if let (Value::Document(left), Value::Document(right)) = (&mut *existing, &value) {
                    if is_operator_map(left) && is_operator_map(right) {
                        let mut conflicts = Document::new();
                        for (op, operand) in right.iter() {
                            match left.get(op) {
                                None => {
                                    left.insert(op.clone(), operand.clone());
                                }
                                Some(current) if current == operand => {}
                                Some(_) => {
                                    conflicts.insert(op.clone(), operand.clone());
                                }
                            }
                        }
                        if !conflicts.is_empty() {
                            self.push_and(Document::new().with(key, conflicts));
                        }
                        continue;
                    }
                }
            }

            self.push_and(Document::new().with(key, value));
        }
    }

    fn push_and(&mut self, clause: Document) {
        match self.0.get_mut(AND) {
            Some(Value::Array(items)) => items.push(Value::Document(clause)),
            _ => {
                let mut items = Vec::new();
                if let Some(previous) = self.0.remove(AND) {
                    items.push(Value::Document(Document::new().with(AND, previous)));
                }
                items.push(Value::Document(clause));
                self.0.insert(AND, Value::Array(items));
            }
        }
    }

    /// Convert untyped JSON into a condition tree.
    pub fn from_json(json: serde_json::Value) -> Result<Self, Error> {
        Document::from_json(json).map(Self)
    }

    /// Render as untyped JSON.
    pub fn to_json(&self) -> serde_json::Value {
        self.0.to_json()
    }

    pub fn as_document(&self) -> &Document {
        &self.0
    }

    pub fn into_document(self) -> Document {
        self.0
    }
}

impl From<Document> for Conditions {
    fn from(doc: Document) -> Self {
        Self(doc)
    }
}

fn is_operator_map(doc: &Document) -> bool {
    !doc.is_empty() && doc.keys().all(is_operator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_always_is_empty() {
        assert!(Conditions::always().is_always());
        assert_eq!(Conditions::always().to_json(), json!({}));
        assert!(!Conditions::eq("a", 1).is_always());
    }

    #[test]
    fn test_and_always_with_empty_list() {
        let cond = Conditions::and_always(Vec::new());
        assert_eq!(cond.to_json(), json!({"$and": [{}]}));

        let cond = Conditions::and_always(vec![Conditions::eq("owner", "u1")]);
        assert_eq!(cond.to_json(), json!({"$and": [{}, {"owner": "u1"}]}));
    }

    #[test]
    fn test_merge_disjoint_fields() {
        let mut cond = Conditions::eq("a", 1);
        cond.merge(Conditions::eq("b", 2));
        assert_eq!(cond.to_json(), json!({"a": 1, "b": 2}));
    }

    #[test]
    fn test_merge_concatenates_and() {
        let mut cond = Conditions::and_always(vec![Conditions::eq("a", 1)]);
        cond.merge(Conditions::and_always(vec![Conditions::eq("b", 2)]));
        assert_eq!(
            cond.to_json(),
            json!({"$and": [{}, {"a": 1}, {}, {"b": 2}]})
        );
    }

    #[test]
    fn test_merge_operator_maps() {
        let mut cond = Conditions::op("age", "$gte", 18);
        cond.merge(Conditions::op("age", "$lt", 65));
        assert_eq!(cond.to_json(), json!({"age": {"$gte": 18, "$lt": 65}}));

        cond.merge(Conditions::op("age", "$gte", 21));
        assert_eq!(
            cond.to_json(),
            json!({"age": {"$gte": 18, "$lt": 65}, "$and": [{"age": {"$gte": 21}}]})
        );
    }

    #[test]
    fn test_merge_conflicting_values_moves_into_and() {
        let mut cond = Conditions::eq("status", "open");
        cond.merge(Conditions::eq("status", "closed"));
        assert_eq!(
            cond.to_json(),
            json!({"status": "open", "$and": [{"status": "closed"}]})
        );

        let mut cond = Conditions::or(vec![Conditions::eq("a", 1)]);
        cond.merge(Conditions::or(vec![Conditions::eq("b", 1)]));
        assert_eq!(
            cond.to_json(),
            json!({"$or": [{"a": 1}], "$and": [{"$or": [{"b": 1}]}]})
        );
    }

    #[test]
    fn test_builders() {
        let cond = Conditions::always()
            .with("name", "Bob")
            .with_op("age", "$gt", 30);
        assert_eq!(cond.to_json(), json!({"name": "Bob", "age": {"$gt": 30}}));
    }
}

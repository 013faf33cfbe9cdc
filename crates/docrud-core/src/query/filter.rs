//! Condition evaluation for the bundled stores.
//!
//! This module provides the `FilterEvaluator` that evaluates condition trees
//! against documents in-process.

use std::cmp::Ordering;

use crate::error::Error;
use docrud_proto::condition::{is_operator, AND, NOR, OR};
use docrud_proto::{Conditions, Document, Value};

/// Evaluates condition trees against documents.
pub struct FilterEvaluator;

impl FilterEvaluator {
    /// Evaluate a condition tree against a document.
    ///
    /// Returns `true` if the document matches. Unknown operators and
    /// malformed operands are reported as [`Error::InvalidData`].
    pub fn matches(conditions: &Conditions, doc: &Document) -> Result<bool, Error> {
        Self::matches_document(conditions.as_document(), doc)
    }

    fn matches_document(conditions: &Document, doc: &Document) -> Result<bool, Error> {
        for (key, expected) in conditions {
            let matched = match key.as_str() {
                AND => {
                    let mut all = true;
                    for sub in Self::sub_conditions(key, expected)? {
                        if !Self::matches_document(sub, doc)? {
                            all = false;
                            break;
                        }
                    }
                    all
                }
                OR => {
                    let mut any = false;
                    for sub in Self::sub_conditions(key, expected)? {
                        if Self::matches_document(sub, doc)? {
                            any = true;
                            break;
                        }
                    }
                    any
                }
                NOR => {
                    let mut none = true;
                    for sub in Self::sub_conditions(key, expected)? {
                        if Self::matches_document(sub, doc)? {
                            none = false;
                            break;
                        }
                    }
                    none
                }
                op if is_operator(op) => {
                    return Err(Error::InvalidData(format!(
                        "unknown top-level operator: {}",
                        op
                    )))
                }
                field => Self::matches_field(doc, field, expected)?,
            };
            if !matched {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn sub_conditions<'a>(op: &str, value: &'a Value) -> Result<Vec<&'a Document>, Error> {
        let items = value
            .as_array()
            .ok_or_else(|| Error::InvalidData(format!("{} expects an array", op)))?;
        items
            .iter()
            .map(|item| {
                item.as_document()
                    .ok_or_else(|| Error::InvalidData(format!("{} expects condition documents", op)))
            })
            .collect()
    }

    fn matches_field(doc: &Document, path: &str, expected: &Value) -> Result<bool, Error> {
        let candidates = Self::lookup(doc, path);
        match expected {
            Value::Document(ops) if !ops.is_empty() && ops.keys().all(is_operator) => {
                Self::matches_operators(&candidates, ops)
            }
            _ => Ok(Self::equals_any(&candidates, expected)),
        }
    }

    fn matches_operators(candidates: &[&Value], ops: &Document) -> Result<bool, Error> {
        for (op, operand) in ops {
            let matched = match op.as_str() {
                "$eq" => Self::equals_any(candidates, operand),
                "$ne" => !Self::equals_any(candidates, operand),
                "$gt" => Self::compare_any(candidates, operand, Ordering::is_gt),
                "$gte" => Self::compare_any(candidates, operand, Ordering::is_ge),
                "$lt" => Self::compare_any(candidates, operand, Ordering::is_lt),
                "$lte" => Self::compare_any(candidates, operand, Ordering::is_le),
                "$in" => Self::in_list(candidates, op, operand)?,
                "$nin" => !Self::in_list(candidates, op, operand)?,
                "$exists" => {
                    let wanted = !matches!(operand, Value::Null | Value::Bool(false) | Value::Int(0));
                    candidates.is_empty() != wanted
                }
                "$not" => match operand {
                    Value::Document(inner) if !inner.is_empty() && inner.keys().all(is_operator) => {
                        !Self::matches_operators(candidates, inner)?
                    }
                    _ => {
                        return Err(Error::InvalidData(
                            "$not expects an operator document".to_string(),
                        ))
                    }
                },
                other => return Err(Error::InvalidData(format!("unknown operator: {}", other))),
            };
            if !matched {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn in_list(candidates: &[&Value], op: &str, operand: &Value) -> Result<bool, Error> {
        let items = operand
            .as_array()
            .ok_or_else(|| Error::InvalidData(format!("{} expects an array", op)))?;
        Ok(items.iter().any(|item| Self::equals_any(candidates, item)))
    }

    /// Implicit equality: a null operand also matches a missing field, and
    /// array fields match when any element is equal.
    fn equals_any(candidates: &[&Value], expected: &Value) -> bool {
        if expected.is_null() && candidates.is_empty() {
            return true;
        }
        candidates.iter().any(|candidate| {
            Self::values_equal(candidate, expected)
                || candidate
                    .as_array()
                    .is_some_and(|items| items.iter().any(|item| Self::values_equal(item, expected)))
        })
    }

    fn compare_any(candidates: &[&Value], operand: &Value, accept: fn(Ordering) -> bool) -> bool {
        candidates.iter().any(|candidate| match candidate {
            Value::Array(items) if !operand.is_array() => items
                .iter()
                .any(|item| Self::compare_values(item, operand).is_some_and(accept)),
            _ => Self::compare_values(candidate, operand).is_some_and(accept),
        })
    }

    /// All values found at a dot-path.
    ///
    /// Arrays of documents along the path fan out, so `items.sku` yields the
    /// `sku` of every element of `items`.
    pub fn lookup<'a>(doc: &'a Document, path: &str) -> Vec<&'a Value> {
        let mut found = Vec::new();
        let (head, rest) = match path.split_once('.') {
            Some((head, rest)) => (head, Some(rest)),
            None => (path, None),
        };
        if let Some(value) = doc.get(head) {
            Self::descend(value, rest, &mut found);
        }
        found
    }

    fn descend<'a>(value: &'a Value, rest: Option<&str>, found: &mut Vec<&'a Value>) {
        let Some(rest) = rest else {
            found.push(value);
            return;
        };
        match value {
            Value::Document(inner) => found.extend(Self::lookup(inner, rest)),
            Value::Array(items) => {
                let (head, tail) = match rest.split_once('.') {
                    Some((head, tail)) => (head, Some(tail)),
                    None => (rest, None),
                };
                if let Ok(index) = head.parse::<usize>() {
                    if let Some(item) = items.get(index) {
                        Self::descend(item, tail, found);
                    }
                    return;
                }
                for item in items {
                    if let Value::Document(inner) = item {
                        found.extend(Self::lookup(inner, rest));
                    }
                }
            }
            _ => {}
        }
    }

    /// Check if two values are equal, comparing numbers by value.
    pub fn values_equal(a: &Value, b: &Value) -> bool {
        match (a, b) {
            (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => {
                (*x as f64) == *y
            }
            _ => a == b,
        }
    }

    /// Compare two values of compatible kinds.
    ///
    /// Returns `None` when the kinds cannot be ordered against each other.
    pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
        match (a, b) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                a.as_f64()?.partial_cmp(&b.as_f64()?)
            }
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::ObjectId(a), Value::ObjectId(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Total order used for sorting: missing and null first, then values
    /// grouped by kind.
    pub fn sort_order(a: Option<&Value>, b: Option<&Value>) -> Ordering {
        match (a, b) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => Self::compare_values(a, b)
                .unwrap_or_else(|| Self::kind_rank(a).cmp(&Self::kind_rank(b))),
        }
    }

    fn kind_rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Int(_) | Value::Float(_) => 1,
            Value::String(_) => 2,
            Value::Document(_) => 3,
            Value::Array(_) => 4,
            Value::ObjectId(_) => 5,
            Value::Bool(_) => 6,
            Value::Date(_) => 7,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc() -> Document {
        Document::from_json(json!({
            "name": "Alice",
            "age": 30,
            "score": 4.5,
            "tags": ["admin", "ops"],
            "address": { "city": "Oslo" },
            "items": [ { "sku": "a", "qty": 1 }, { "sku": "b", "qty": 5 } ],
            "nickname": null
        }))
        .unwrap()
    }

    fn check(cond: serde_json::Value) -> bool {
        FilterEvaluator::matches(&Conditions::from_json(cond).unwrap(), &doc()).unwrap()
    }

    #[test]
    fn test_implicit_equality() {
        assert!(check(json!({})));
        assert!(check(json!({"name": "Alice"})));
        assert!(!check(json!({"name": "Bob"})));
        assert!(check(json!({"age": 30.0})));
        assert!(check(json!({"tags": "ops"})));
        assert!(check(json!({"address.city": "Oslo"})));
        assert!(check(json!({"items.sku": "b"})));
        assert!(check(json!({"missing": null})));
        assert!(check(json!({"nickname": null})));
    }

    #[test]
    fn test_comparison_operators() {
        assert!(check(json!({"age": {"$gt": 18, "$lte": 30}})));
        assert!(!check(json!({"age": {"$lt": 30}})));
        assert!(check(json!({"score": {"$gte": 4}})));
        assert!(check(json!({"items.qty": {"$gt": 3}})));
        assert!(!check(json!({"name": {"$gt": 3}})));
        assert!(check(json!({"name": {"$ne": "Bob"}})));
        assert!(check(json!({"name": {"$eq": "Alice"}})));
    }

    #[test]
    fn test_set_operators() {
        assert!(check(json!({"name": {"$in": ["Bob", "Alice"]}})));
        assert!(check(json!({"tags": {"$in": ["ops"]}})));
        assert!(check(json!({"name": {"$nin": ["Bob"]}})));
        assert!(!check(json!({"tags": {"$nin": ["admin"]}})));
    }

    #[test]
    fn test_exists_and_not() {
        assert!(check(json!({"age": {"$exists": true}})));
        assert!(check(json!({"missing": {"$exists": false}})));
        assert!(check(json!({"age": {"$not": {"$gt": 40}}})));
        assert!(!check(json!({"age": {"$not": {"$gt": 20}}})));
    }

    #[test]
    fn test_logical_operators() {
        assert!(check(json!({"$and": [{}, {"name": "Alice"}]})));
        assert!(!check(json!({"$and": [{"name": "Alice"}, {"age": 1}]})));
        assert!(check(json!({"$or": [{"name": "Bob"}, {"age": 30}]})));
        assert!(!check(json!({"$or": []})));
        assert!(check(json!({"$nor": [{"name": "Bob"}]})));
    }

    #[test]
    fn test_unknown_operator_is_rejected() {
        let cond = Conditions::from_json(json!({"age": {"$near": 1}})).unwrap();
        assert!(matches!(
            FilterEvaluator::matches(&cond, &doc()),
            Err(Error::InvalidData(_))
        ));

        let cond = Conditions::from_json(json!({"$where": "1"})).unwrap();
        assert!(FilterEvaluator::matches(&cond, &doc()).is_err());

        let cond = Conditions::from_json(json!({"$and": {"a": 1}})).unwrap();
        assert!(FilterEvaluator::matches(&cond, &doc()).is_err());
    }

    #[test]
    fn test_sort_order() {
        let one = Value::Int(1);
        let text = Value::from("a");
        assert_eq!(FilterEvaluator::sort_order(None, Some(&one)), Ordering::Less);
        assert_eq!(
            FilterEvaluator::sort_order(Some(&one), Some(&Value::Float(0.5))),
            Ordering::Greater
        );
        assert_eq!(FilterEvaluator::sort_order(Some(&one), Some(&text)), Ordering::Less);
    }
}

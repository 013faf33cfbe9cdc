//! Condition casting.
//!
//! Callers send conditions as untyped JSON, so an id arrives as a string and
//! a number may arrive quoted. The caster walks a condition tree and coerces
//! every value whose field has a declared type. Coercion is best effort: a
//! value that cannot be converted is passed through unchanged.

use crate::catalog::{EntityRegistry, ScalarType};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use docrud_proto::condition::is_operator;
use docrud_proto::{Conditions, Document, ObjectId, Value};
use tracing::trace;

/// Operators whose operands are values of the field's type.
const VALUE_OPERATORS: &[&str] = &["$eq", "$ne", "$gt", "$gte", "$lt", "$lte", "$in", "$nin", "$all"];

/// Casts condition trees and documents against one entity's schema.
pub struct ConditionCaster<'a> {
    registry: &'a EntityRegistry,
    entity: &'a str,
}

impl<'a> ConditionCaster<'a> {
    pub fn new(registry: &'a EntityRegistry, entity: &'a str) -> Self {
        Self { registry, entity }
    }

    /// Coerce the values of a condition tree to their declared types.
    ///
    /// Operator keys (`$and`, `$or`, ...) are recursed into; field keys are
    /// resolved through the registry, following relations.
    pub fn cast(&self, conditions: Conditions) -> Conditions {
        Conditions::from(self.cast_conditions(conditions.into_document()))
    }

    fn cast_conditions(&self, conditions: Document) -> Document {
        conditions
            .into_iter()
            .map(|(key, value)| {
                let value = if is_operator(&key) {
                    match value {
                        Value::Array(items) => Value::Array(
                            items
                                .into_iter()
                                .map(|item| match item {
                                    Value::Document(doc) => {
                                        Value::Document(self.cast_conditions(doc))
                                    }
                                    other => other,
                                })
                                .collect(),
                        ),
                        Value::Document(doc) => Value::Document(self.cast_conditions(doc)),
                        other => other,
                    }
                } else {
                    match self.registry.field_type(self.entity, &key) {
                        Some(scalar) => cast_operand(value, scalar),
                        None => value,
                    }
                };
                (key, value)
            })
            .collect()
    }

    /// Coerce the fields of a document about to be written.
    ///
    /// Nested documents are walked through embedded fields, and populated
    /// references are reduced back to their `_id`.
    pub fn cast_document(&self, doc: Document) -> Document {
        self.cast_fields(doc, "")
    }

    fn cast_fields(&self, doc: Document, prefix: &str) -> Document {
        doc.into_iter()
            .map(|(key, value)| {
                let path = format!("{}{}", prefix, key);
                let scalar = self.registry.field_type(self.entity, &path);
                let value = match (value, scalar) {
                    (Value::Document(inner), None) => {
                        Value::Document(self.cast_fields(inner, &format!("{}.", path)))
                    }
                    (Value::Array(items), Some(scalar)) => Value::Array(
                        items
                            .into_iter()
                            .map(|item| coerce_field(item, scalar))
                            .collect(),
                    ),
                    (Value::Array(items), None) => Value::Array(
                        items
                            .into_iter()
                            .map(|item| match item {
                                Value::Document(inner) => {
                                    Value::Document(self.cast_fields(inner, &format!("{}.", path)))
                                }
                                other => other,
                            })
                            .collect(),
                    ),
                    (value, Some(scalar)) => coerce_field(value, scalar),
                    (value, None) => value,
                };
                (key, value)
            })
            .collect()
    }
}

/// Coerce a condition operand for a typed field.
///
/// Operator maps coerce each value operand; arrays coerce element-wise.
fn cast_operand(value: Value, scalar: ScalarType) -> Value {
    match value {
        Value::Document(ops) => Value::Document(
            ops.into_iter()
                .map(|(op, operand)| {
                    let operand = if VALUE_OPERATORS.contains(&op.as_str()) {
                        match operand {
                            Value::Array(items) => Value::Array(
                                items.into_iter().map(|v| coerce(v, scalar)).collect(),
                            ),
                            other => coerce(other, scalar),
                        }
                    } else if op == "$not" {
                        cast_operand(operand, scalar)
                    } else {
                        operand
                    };
                    (op, operand)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(|v| coerce(v, scalar)).collect()),
        other => coerce(other, scalar),
    }
}

/// Coerce a written field value; populated references collapse to their id.
fn coerce_field(value: Value, scalar: ScalarType) -> Value {
    match (value, scalar) {
        (Value::Document(doc), ScalarType::ObjectId) => match doc.object_id() {
            Some(id) => Value::ObjectId(id),
            None => Value::Document(doc),
        },
        (value, scalar) => coerce(value, scalar),
    }
}

/// Coerce a single value to a scalar type.
///
/// Null stays null and arrays and documents pass through. Booleans are true
/// only for `true`, `1`, `"true"` and `"1"`. Anything that fails to convert
/// is returned unchanged.
pub fn coerce(value: Value, scalar: ScalarType) -> Value {
    if matches!(value, Value::Null | Value::Array(_) | Value::Document(_)) {
        return value;
    }
    let original = value.clone();
    let coerced = match scalar {
        ScalarType::String => to_string(value),
        ScalarType::Number => to_number(value),
        ScalarType::Date => to_date(value),
        ScalarType::Boolean => Some(Value::Bool(is_truthy(&value))),
        ScalarType::ObjectId => to_object_id(value),
        ScalarType::Mixed => Some(value),
    };
    match coerced {
        Some(v) => v,
        None => {
            trace!(ty = scalar.name(), value = ?original, "coercion failed; passing value through");
            original
        }
    }
}

fn to_string(value: Value) -> Option<Value> {
    let s = match value {
        Value::String(s) => s,
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Date(d) => d.to_rfc3339_opts(SecondsFormat::Millis, true),
        Value::ObjectId(id) => id.to_hex(),
        _ => return None,
    };
    Some(Value::String(s))
}

fn to_number(value: Value) -> Option<Value> {
    match value {
        Value::Int(_) | Value::Float(_) => Some(value),
        Value::Bool(b) => Some(Value::Int(b as i64)),
        Value::Date(d) => Some(Value::Int(d.timestamp_millis())),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            if let Ok(i) = s.parse::<i64>() {
                return Some(Value::Int(i));
            }
            s.parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(Value::Float)
        }
        _ => None,
    }
}

fn to_date(value: Value) -> Option<Value> {
    match value {
        Value::Date(_) => Some(value),
        Value::Int(ms) => Utc.timestamp_millis_opt(ms).single().map(Value::Date),
        Value::Float(ms) if ms.is_finite() => {
            Utc.timestamp_millis_opt(ms as i64).single().map(Value::Date)
        }
        Value::String(s) => parse_date(s.trim()).map(Value::Date),
        _ => None,
    }
}

fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(d) = DateTime::parse_from_rfc3339(s) {
        return Some(d.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Int(i) => *i == 1,
        Value::Float(f) => *f == 1.0,
        Value::String(s) => s == "true" || s == "1",
        _ => false,
    }
}

fn to_object_id(value: Value) -> Option<Value> {
    match value {
        Value::ObjectId(_) => Some(value),
        Value::String(s) => ObjectId::parse_str(&s).ok().map(Value::ObjectId),
        _ => None,
    }
}

/*!
 * Structured Values
 * Generic tagged container for open-ended monitoring payloads
 *
 * Maps keep unique string keys in insertion order for deterministic
 * serialization; re-setting a key replaces the value in place. Arrays keep
 * insertion order. Equality is deep: order-sensitive for arrays,
 * order-insensitive over map key sets.
 */

use crate::core::errors::DataError;
use crate::core::json::{self, JsonResult};
use serde::de::{self, MapAccess, SeqAccess, Visitor};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Discriminant of a [`Value`], used in error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    Float,
    String,
    Array,
    Map,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "boolean",
            ValueKind::Int => "integer",
            ValueKind::Float => "float",
            ValueKind::String => "string",
            ValueKind::Array => "array",
            ValueKind::Map => "map",
        };
        write!(f, "{}", name)
    }
}

/// Generic tagged container over scalars, arrays, and maps
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Map(Vec<(String, Value)>),
}

impl Value {
    /// Create an empty map value
    #[inline]
    pub fn new_map() -> Self {
        Value::Map(Vec::new())
    }

    /// Create an empty array value
    #[inline]
    pub fn new_array() -> Self {
        Value::Array(Vec::new())
    }

    /// Kind discriminant of this value
    #[inline]
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Null => ValueKind::Null,
            Value::Bool(_) => ValueKind::Bool,
            Value::Int(_) => ValueKind::Int,
            Value::Float(_) => ValueKind::Float,
            Value::String(_) => ValueKind::String,
            Value::Array(_) => ValueKind::Array,
            Value::Map(_) => ValueKind::Map,
        }
    }

    #[inline]
    pub fn is_map(&self) -> bool {
        matches!(self, Value::Map(_))
    }

    #[inline]
    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    /// Number of direct entries in a container, zero for scalars
    pub fn len(&self) -> usize {
        match self {
            Value::Array(items) => items.len(),
            Value::Map(entries) => entries.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a map entry by key
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    // Map operations

    pub fn set_string(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), DataError> {
        self.map_insert(key.into(), Value::String(value.into()))
    }

    pub fn set_integer(&mut self, key: impl Into<String>, value: i64) -> Result<(), DataError> {
        self.map_insert(key.into(), Value::Int(value))
    }

    pub fn set_float(&mut self, key: impl Into<String>, value: f64) -> Result<(), DataError> {
        self.map_insert(key.into(), Value::Float(check_finite(value)?))
    }

    pub fn set_boolean(&mut self, key: impl Into<String>, value: bool) -> Result<(), DataError> {
        self.map_insert(key.into(), Value::Bool(value))
    }

    pub fn set_null(&mut self, key: impl Into<String>) -> Result<(), DataError> {
        self.map_insert(key.into(), Value::Null)
    }

    /// Attach a nested value under a map key, taking ownership
    pub fn set_data(&mut self, key: impl Into<String>, value: Value) -> Result<(), DataError> {
        self.map_insert(key.into(), value)
    }

    // Array operations

    pub fn append_string(&mut self, value: impl Into<String>) -> Result<(), DataError> {
        self.array_push(Value::String(value.into()))
    }

    pub fn append_integer(&mut self, value: i64) -> Result<(), DataError> {
        self.array_push(Value::Int(value))
    }

    pub fn append_float(&mut self, value: f64) -> Result<(), DataError> {
        self.array_push(Value::Float(check_finite(value)?))
    }

    pub fn append_boolean(&mut self, value: bool) -> Result<(), DataError> {
        self.array_push(Value::Bool(value))
    }

    pub fn append_null(&mut self) -> Result<(), DataError> {
        self.array_push(Value::Null)
    }

    /// Append a nested value, taking ownership
    pub fn append_data(&mut self, value: Value) -> Result<(), DataError> {
        self.array_push(value)
    }

    /// Canonical JSON text of this value
    pub fn to_json(&self) -> JsonResult<String> {
        json::to_string(self)
    }

    /// Parse a value back from JSON text
    pub fn from_json(text: &str) -> JsonResult<Value> {
        json::from_str(text)
    }

    fn map_insert(&mut self, key: String, value: Value) -> Result<(), DataError> {
        match self {
            Value::Map(entries) => {
                // Last write wins; the original insertion position is kept
                if let Some(entry) = entries.iter_mut().find(|(k, _)| *k == key) {
                    entry.1 = value;
                } else {
                    entries.push((key, value));
                }
                Ok(())
            }
            other => Err(DataError::InvalidVariantOperation(format!(
                "map operation on {} value",
                other.kind()
            ))),
        }
    }

    fn array_push(&mut self, value: Value) -> Result<(), DataError> {
        match self {
            Value::Array(items) => {
                items.push(value);
                Ok(())
            }
            other => Err(DataError::InvalidVariantOperation(format!(
                "array operation on {} value",
                other.kind()
            ))),
        }
    }
}

#[inline]
fn check_finite(value: f64) -> Result<f64, DataError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(DataError::InvalidArgumentType(format!(
            "non-finite float {}",
            value
        )))
    }
}

/// Deep structural equality: arrays compare in order, maps compare as key
/// sets with exact values.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(key, value)| {
                        b.iter().any(|(other_key, other_value)| {
                            key == other_key && value == other_value
                        })
                    })
            }
            _ => false,
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::Int(v) => serializer.serialize_i64(*v),
            Value::Float(v) => serializer.serialize_f64(*v),
            Value::String(v) => serializer.serialize_str(v),
            Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct ValueVisitor;

        impl<'de> Visitor<'de> for ValueVisitor {
            type Value = Value;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON value")
            }

            fn visit_bool<E>(self, v: bool) -> Result<Value, E> {
                Ok(Value::Bool(v))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Value, E> {
                Ok(Value::Int(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Value, E> {
                if v <= i64::MAX as u64 {
                    Ok(Value::Int(v as i64))
                } else {
                    Ok(Value::Float(v as f64))
                }
            }

            fn visit_f64<E>(self, v: f64) -> Result<Value, E> {
                Ok(Value::Float(v))
            }

            fn visit_str<E>(self, v: &str) -> Result<Value, E> {
                Ok(Value::String(v.to_string()))
            }

            fn visit_string<E>(self, v: String) -> Result<Value, E> {
                Ok(Value::String(v))
            }

            fn visit_unit<E>(self) -> Result<Value, E> {
                Ok(Value::Null)
            }

            fn visit_none<E>(self) -> Result<Value, E> {
                Ok(Value::Null)
            }

            fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<Value, D::Error> {
                Deserialize::deserialize(deserializer)
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Value, A::Error> {
                let mut items = Vec::new();
                while let Some(item) = seq.next_element()? {
                    items.push(item);
                }
                Ok(Value::Array(items))
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Value, A::Error> {
                // Document order becomes insertion order; duplicate keys are
                // last-write-wins, matching the mutation API.
                let mut value = Value::new_map();
                while let Some((key, entry)) = access.next_entry::<String, Value>()? {
                    value
                        .set_data(key, entry)
                        .map_err(|e| de::Error::custom(e.to_string()))?;
                }
                Ok(value)
            }
        }

        deserializer.deserialize_any(ValueVisitor)
    }
}

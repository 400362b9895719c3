//! Wire mapping between [`Value`] trees and JSON.
//!
//! A `Ref` becomes a JSON object carrying the reserved `@type` field plus one
//! field per property; collections become arrays; primitives become native
//! scalars; nulls become JSON `null` (the surrounding envelope, not an
//! embedded field, distinguishes "no value" from "the null value").

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Number};

use crate::error::CodecError;

use super::{Property, TypeName, Value};

/// Reserved field holding the fully qualified type name of a `Ref`.
pub const TYPE_FIELD: &str = "@type";

/// Lower a value tree into its wire JSON form.
///
/// A property named `@type` would clobber the type tag of its enclosing
/// object, so it is rejected rather than silently overwriting it.
pub fn to_wire(value: &Value) -> Result<serde_json::Value, CodecError> {
    match value {
        Value::Null(_) => Ok(serde_json::Value::Null),
        Value::Bool(_, v) => Ok(json!(v)),
        Value::Int(_, v) => Ok(json!(v)),
        Value::Double(_, v) => Ok(Number::from_f64(*v)
            .map(serde_json::Value::Number)
            // Non-finite doubles have no JSON form; `null` keeps the frame valid.
            .unwrap_or(serde_json::Value::Null)),
        Value::String(_, v) => Ok(json!(v)),
        Value::Collection(_, items) => Ok(serde_json::Value::Array(
            items.iter().map(to_wire).collect::<Result<_, _>>()?,
        )),
        Value::Ref(ty, props) => {
            let mut map = Map::with_capacity(props.len() + 1);
            map.insert(TYPE_FIELD.to_string(), json!(ty.as_str()));
            for prop in props {
                if prop.name == TYPE_FIELD {
                    return Err(CodecError::MalformedWire(format!(
                        "property name {TYPE_FIELD} is reserved for the type tag"
                    )));
                }
                map.insert(prop.name.clone(), to_wire(&prop.value)?);
            }
            Ok(serde_json::Value::Object(map))
        }
    }
}

/// Rebuild a value tree from wire JSON.
///
/// Objects without an `@type` field decode as `map`-typed refs; numbers that
/// fit an `i64` decode as integers, everything else as doubles.
pub fn from_wire(json: &serde_json::Value) -> Result<Value, CodecError> {
    match json {
        serde_json::Value::Null => Ok(Value::Null(TypeName::unit())),
        serde_json::Value::Bool(v) => Ok(Value::bool(*v)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::int(i))
            } else if let Some(f) = n.as_f64() {
                Ok(Value::double(f))
            } else {
                Err(CodecError::MalformedWire(format!(
                    "number out of range: {n}"
                )))
            }
        }
        serde_json::Value::String(v) => Ok(Value::string(v.clone())),
        serde_json::Value::Array(items) => {
            let decoded = items.iter().map(from_wire).collect::<Result<_, _>>()?;
            Ok(Value::collection(decoded))
        }
        serde_json::Value::Object(map) => {
            let ty = match map.get(TYPE_FIELD) {
                Some(serde_json::Value::String(name)) => TypeName::new(name.clone()),
                Some(other) => {
                    return Err(CodecError::MalformedWire(format!(
                        "{TYPE_FIELD} must be a string, got {other}"
                    )))
                }
                None => TypeName::map(),
            };
            let mut props = Vec::with_capacity(map.len());
            for (name, value) in map {
                if name == TYPE_FIELD {
                    continue;
                }
                props.push(Property::new(name.clone(), from_wire(value)?));
            }
            Ok(Value::reference(ty, props))
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        to_wire(self)
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        from_wire(&json).map_err(D::Error::custom)
    }
}

/// Serde adapter for `Option<Value>` fields that must distinguish an absent
/// value from a present null: pair it with `#[serde(default, skip_serializing_if
/// = "Option::is_none")]` so `None` omits the field entirely while
/// `Some(Value::Null(_))` writes a literal JSON `null`.
pub mod nullable {
    use super::*;

    pub fn serialize<S: Serializer>(
        value: &Option<Value>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => v.serialize(serializer),
            // Unreachable when paired with skip_serializing_if, but total anyway.
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Value>, D::Error> {
        // A present field always yields Some, even for JSON null.
        let json = serde_json::Value::deserialize(deserializer)?;
        from_wire(&json).map(Some).map_err(D::Error::custom)
    }
}

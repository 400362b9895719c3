//! Generic value model for inspectable application state.
//!
//! Every object graph that crosses the debug wire is first lowered into the
//! closed [`Value`] sum type: nulls, primitive wrappers, ordered collections,
//! and [`Ref`]s (named-property records tagged with a nominal type). The model
//! is deliberately schema-free so the protocol can carry arbitrary, evolving
//! application types without migration steps.

mod json;

pub use json::{from_wire, nullable, to_wire, TYPE_FIELD};

use std::fmt;

use serde::{Deserialize, Serialize};

/// Fully qualified nominal type name attached to every non-null value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeName(String);

impl TypeName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Canonical name for boolean primitives.
    pub fn bool() -> Self {
        Self::new("bool")
    }

    /// Canonical name for integer primitives.
    pub fn int() -> Self {
        Self::new("i64")
    }

    /// Canonical name for floating-point primitives.
    pub fn double() -> Self {
        Self::new("f64")
    }

    /// Canonical name for string primitives.
    pub fn string() -> Self {
        Self::new("str")
    }

    /// Canonical name for ordered collections.
    pub fn collection() -> Self {
        Self::new("vec")
    }

    /// Canonical name for string-keyed maps.
    pub fn map() -> Self {
        Self::new("map")
    }

    /// Canonical name for nulls whose declared type is unknown.
    pub fn unit() -> Self {
        Self::new("unit")
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TypeName {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Named entry of a [`Value::Ref`].
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    pub value: Value,
}

impl Property {
    pub fn new(name: impl Into<String>, value: Value) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Closed representation of any serializable object graph.
///
/// Invariants: collections preserve order; property names are unique within
/// one `Ref` (upheld by [`Value::reference`]).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null(TypeName),
    Bool(TypeName, bool),
    Int(TypeName, i64),
    Double(TypeName, f64),
    String(TypeName, String),
    Collection(TypeName, Vec<Value>),
    Ref(TypeName, Vec<Property>),
}

impl Value {
    /// Null tagged with its declared type.
    pub fn null(ty: impl Into<TypeName>) -> Self {
        Value::Null(ty.into())
    }

    pub fn bool(v: bool) -> Self {
        Value::Bool(TypeName::bool(), v)
    }

    pub fn int(v: i64) -> Self {
        Value::Int(TypeName::int(), v)
    }

    pub fn double(v: f64) -> Self {
        Value::Double(TypeName::double(), v)
    }

    pub fn string(v: impl Into<String>) -> Self {
        Value::String(TypeName::string(), v.into())
    }

    pub fn collection(items: Vec<Value>) -> Self {
        Value::Collection(TypeName::collection(), items)
    }

    /// Build a `Ref`, keeping the last value for any duplicated property name.
    pub fn reference(ty: impl Into<TypeName>, properties: Vec<Property>) -> Self {
        let mut unique: Vec<Property> = Vec::with_capacity(properties.len());
        for prop in properties {
            if let Some(existing) = unique.iter_mut().find(|p| p.name == prop.name) {
                existing.value = prop.value;
            } else {
                unique.push(prop);
            }
        }
        Value::Ref(ty.into(), unique)
    }

    /// The nominal type tag carried by this value.
    pub fn type_name(&self) -> &TypeName {
        match self {
            Value::Null(ty)
            | Value::Bool(ty, _)
            | Value::Int(ty, _)
            | Value::Double(ty, _)
            | Value::String(ty, _)
            | Value::Collection(ty, _)
            | Value::Ref(ty, _) => ty,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null(_))
    }

    /// Look up a property of a `Ref` by name. `None` for other variants.
    pub fn property(&self, name: &str) -> Option<&Property> {
        match self {
            Value::Ref(_, props) => props.iter().find(|p| p.name == name),
            _ => None,
        }
    }

    /// Properties of a `Ref`, empty for other variants.
    pub fn properties(&self) -> &[Property] {
        match self {
            Value::Ref(_, props) => props,
            _ => &[],
        }
    }
}

//! Pluggable type introspection.
//!
//! The codec core is reflection-agnostic: whatever enumerates a type's fields
//! sits behind [`TypeIntrospector`]. The default implementation derives the
//! field list from a witness value that the serializer already produced.

use crate::error::CodecError;
use crate::value::{TypeName, Value};

/// Cached per-type metadata: the introspected field list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMetadata {
    pub type_name: TypeName,
    pub fields: Vec<String>,
}

impl ClassMetadata {
    /// Check an incoming `Ref` against this shape. Extra fields are tolerated
    /// (the sender may run a newer type revision); missing fields are not.
    pub fn validate(&self, value: &Value) -> Result<(), CodecError> {
        let missing: Vec<&String> = self
            .fields
            .iter()
            .filter(|field| value.property(field).is_none())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(CodecError::ShapeMismatch {
                type_name: self.type_name.to_string(),
                reason: format!(
                    "missing fields: {}",
                    missing
                        .iter()
                        .map(|s| s.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            })
        }
    }
}

/// Adapter producing [`ClassMetadata`] for a type, given a witness value of it.
pub trait TypeIntrospector: Send + Sync {
    fn introspect(&self, ty: &TypeName, witness: &Value) -> Result<ClassMetadata, CodecError>;
}

/// Default introspector: reads the property names off a witness `Ref`.
#[derive(Debug, Default)]
pub struct ValueIntrospector;

impl TypeIntrospector for ValueIntrospector {
    fn introspect(&self, ty: &TypeName, witness: &Value) -> Result<ClassMetadata, CodecError> {
        match witness {
            Value::Ref(_, props) => Ok(ClassMetadata {
                type_name: ty.clone(),
                fields: props.iter().map(|p| p.name.clone()).collect(),
            }),
            other => Err(CodecError::Unsupported(format!(
                "cannot introspect {} from a {:?} witness",
                ty, other
            ))),
        }
    }
}

//! Startup-built table mapping type-name strings to constructors.
//!
//! Tagged `Ref` values arriving off the wire carry only a type name; the
//! registry turns that name back into a concrete Rust value. Registration is
//! explicit, there is no dynamic class loading, so an unknown name is a
//! reportable [`CodecError::UnknownType`], never a crash.

use std::any::Any;
use std::collections::HashMap;

use serde::de::DeserializeOwned;

use crate::error::CodecError;
use crate::value::Value;

type DecodeFn = Box<dyn Fn(&Value) -> Result<Box<dyn Any + Send>, CodecError> + Send + Sync>;

/// Registration table from type names to decode constructors.
#[derive(Default)]
pub struct TypeRegistry {
    decoders: HashMap<String, DecodeFn>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under `name`.
    ///
    /// For enums, register under the bare enum name; values tagged
    /// `"Name::Variant"` resolve to it automatically.
    pub fn register<T>(&mut self, name: impl Into<String>)
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.decoders.insert(
            name.into(),
            Box::new(|value| {
                let decoded: T = super::de::from_value(value)?;
                Ok(Box::new(decoded) as Box<dyn Any + Send>)
            }),
        );
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    fn lookup(&self, name: &str) -> Option<&DecodeFn> {
        if let Some(decoder) = self.decoders.get(name) {
            return Some(decoder);
        }
        // "Enum::Variant" tags resolve through the enum's registration.
        name.split_once("::")
            .and_then(|(enum_name, _)| self.decoders.get(enum_name))
    }

    /// Decode `value` through the constructor registered for its type name.
    pub fn decode_dyn(&self, value: &Value) -> Result<Box<dyn Any + Send>, CodecError> {
        let name = value.type_name().as_str();
        let decoder = self
            .lookup(name)
            .ok_or_else(|| CodecError::UnknownType(name.to_string()))?;
        decoder(value)
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.decoders.keys().collect::<Vec<_>>())
            .finish()
    }
}

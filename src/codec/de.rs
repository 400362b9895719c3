//! `serde::Deserializer` reading [`Value`] trees back into Rust values.
//!
//! Mirrors the shapes produced by [`super::ser`]: `Ref`s drive struct and
//! map visitors, `"Enum::Variant"` tags drive enum visitors, collections
//! drive sequences, and `Null` is either a unit or an absent option depending
//! on what the target type asks for.

use serde::de::value::StrDeserializer;
use serde::de::{self, DeserializeOwned, DeserializeSeed, Visitor};
use serde::forward_to_deserialize_any;

use crate::error::CodecError;
use crate::value::{Property, Value};

use super::ser::VARIANT_PAYLOAD;

/// Rebuild a concrete value from a value tree.
pub fn from_value<T: DeserializeOwned>(value: &Value) -> Result<T, CodecError> {
    T::deserialize(ValueDeserializer::new(value))
}

#[derive(Clone, Copy)]
pub struct ValueDeserializer<'a> {
    value: &'a Value,
}

impl<'a> ValueDeserializer<'a> {
    pub fn new(value: &'a Value) -> Self {
        Self { value }
    }

    fn describe(&self) -> String {
        format!("{} value", self.value.type_name())
    }
}

impl<'de> de::Deserializer<'de> for ValueDeserializer<'de> {
    type Error = CodecError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, CodecError> {
        match self.value {
            Value::Null(_) => visitor.visit_unit(),
            Value::Bool(_, v) => visitor.visit_bool(*v),
            Value::Int(_, v) => visitor.visit_i64(*v),
            Value::Double(_, v) => visitor.visit_f64(*v),
            Value::String(_, v) => visitor.visit_str(v),
            Value::Collection(_, items) => visitor.visit_seq(SeqAccess {
                iter: items.iter(),
            }),
            Value::Ref(_, props) => visitor.visit_map(MapAccess {
                iter: props.iter(),
                pending: None,
            }),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, CodecError> {
        match self.value {
            Value::Null(_) => visitor.visit_none(),
            _ => visitor.visit_some(self),
        }
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, CodecError> {
        match self.value {
            Value::Null(_) => visitor.visit_unit(),
            _ => Err(CodecError::Message(format!(
                "expected null, found {}",
                self.describe()
            ))),
        }
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, CodecError> {
        self.deserialize_unit(visitor)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, CodecError> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, CodecError> {
        match self.value {
            Value::Ref(_, props) => visitor.visit_map(MapAccess {
                iter: props.iter(),
                pending: None,
            }),
            _ => Err(CodecError::Message(format!(
                "expected a ref, found {}",
                self.describe()
            ))),
        }
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, CodecError> {
        match self.value {
            Value::Ref(ty, props) => {
                // "Enum::Variant" tags; a bare tag is taken as the variant name.
                let variant = match ty.as_str().split_once("::") {
                    Some((_, variant)) => variant,
                    None => ty.as_str(),
                };
                visitor.visit_enum(EnumAccess { variant, props })
            }
            Value::String(_, s) => visitor.visit_enum(EnumAccess {
                variant: s,
                props: &[],
            }),
            _ => Err(CodecError::Message(format!(
                "expected an enum ref, found {}",
                self.describe()
            ))),
        }
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf seq tuple tuple_struct map identifier ignored_any
    }
}

struct SeqAccess<'a> {
    iter: std::slice::Iter<'a, Value>,
}

impl<'de> de::SeqAccess<'de> for SeqAccess<'de> {
    type Error = CodecError;

    fn next_element_seed<T: DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> Result<Option<T::Value>, CodecError> {
        match self.iter.next() {
            Some(value) => seed.deserialize(ValueDeserializer { value }).map(Some),
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

struct MapAccess<'a> {
    iter: std::slice::Iter<'a, Property>,
    pending: Option<&'a Value>,
}

impl<'de> de::MapAccess<'de> for MapAccess<'de> {
    type Error = CodecError;

    fn next_key_seed<K: DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, CodecError> {
        match self.iter.next() {
            Some(prop) => {
                self.pending = Some(&prop.value);
                seed.deserialize(StrDeserializer::new(&prop.name)).map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value, CodecError> {
        let value = self
            .pending
            .take()
            .ok_or_else(|| CodecError::Message("value requested before key".into()))?;
        seed.deserialize(ValueDeserializer { value })
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

struct EnumAccess<'a> {
    variant: &'a str,
    props: &'a [Property],
}

impl<'de> de::EnumAccess<'de> for EnumAccess<'de> {
    type Error = CodecError;
    type Variant = VariantAccess<'de>;

    fn variant_seed<V: DeserializeSeed<'de>>(
        self,
        seed: V,
    ) -> Result<(V::Value, VariantAccess<'de>), CodecError> {
        let tag = seed.deserialize(StrDeserializer::<CodecError>::new(self.variant))?;
        Ok((tag, VariantAccess { props: self.props }))
    }
}

struct VariantAccess<'a> {
    props: &'a [Property],
}

impl<'a> VariantAccess<'a> {
    fn payload(&self) -> Result<&'a Value, CodecError> {
        self.props
            .iter()
            .find(|p| p.name == VARIANT_PAYLOAD)
            .map(|p| &p.value)
            .ok_or_else(|| CodecError::Message("missing variant payload".into()))
    }
}

impl<'de> de::VariantAccess<'de> for VariantAccess<'de> {
    type Error = CodecError;

    fn unit_variant(self) -> Result<(), CodecError> {
        Ok(())
    }

    fn newtype_variant_seed<T: DeserializeSeed<'de>>(self, seed: T) -> Result<T::Value, CodecError> {
        seed.deserialize(ValueDeserializer {
            value: self.payload()?,
        })
    }

    fn tuple_variant<V: Visitor<'de>>(
        self,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value, CodecError> {
        match self.payload()? {
            Value::Collection(_, items) => visitor.visit_seq(SeqAccess {
                iter: items.iter(),
            }),
            other => Err(CodecError::Message(format!(
                "expected a tuple payload, found {} value",
                other.type_name()
            ))),
        }
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, CodecError> {
        visitor.visit_map(MapAccess {
            iter: self.props.iter(),
            pending: None,
        })
    }
}

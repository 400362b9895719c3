//! `serde::Serializer` producing [`Value`] trees.
//!
//! This is the introspection half of the codec: serde's data model reports
//! struct names, field names, and variant tags, which become the nominal
//! `TypeName`s and `Property` lists of the value model. Enum variants are
//! lowered to `Ref`s tagged `"Enum::Variant"`, the tagged-variant wire shape
//! the registry resolves on decode.

use serde::ser::{self, Serialize};

use crate::error::CodecError;
use crate::value::{Property, TypeName, Value};

/// Lower any serializable object graph into a value tree.
///
/// Assumes acyclic data; cyclic graphs recurse until the serializer itself
/// overflows, which is outside this codec's contract.
pub fn to_value<T: Serialize + ?Sized>(value: &T) -> Result<Value, CodecError> {
    value.serialize(ValueSerializer)
}

/// Variant tag in `Enum::Variant` form.
fn variant_tag(name: &str, variant: &str) -> TypeName {
    TypeName::new(format!("{name}::{variant}"))
}

/// Payload slot for newtype and tuple variants.
pub(crate) const VARIANT_PAYLOAD: &str = "0";

pub struct ValueSerializer;

impl ser::Serializer for ValueSerializer {
    type Ok = Value;
    type Error = CodecError;

    type SerializeSeq = SeqCollector;
    type SerializeTuple = SeqCollector;
    type SerializeTupleStruct = SeqCollector;
    type SerializeTupleVariant = TupleVariantCollector;
    type SerializeMap = MapCollector;
    type SerializeStruct = StructCollector;
    type SerializeStructVariant = StructVariantCollector;

    fn serialize_bool(self, v: bool) -> Result<Value, CodecError> {
        Ok(Value::bool(v))
    }

    fn serialize_i8(self, v: i8) -> Result<Value, CodecError> {
        Ok(Value::int(v as i64))
    }

    fn serialize_i16(self, v: i16) -> Result<Value, CodecError> {
        Ok(Value::int(v as i64))
    }

    fn serialize_i32(self, v: i32) -> Result<Value, CodecError> {
        Ok(Value::int(v as i64))
    }

    fn serialize_i64(self, v: i64) -> Result<Value, CodecError> {
        Ok(Value::int(v))
    }

    fn serialize_u8(self, v: u8) -> Result<Value, CodecError> {
        Ok(Value::int(v as i64))
    }

    fn serialize_u16(self, v: u16) -> Result<Value, CodecError> {
        Ok(Value::int(v as i64))
    }

    fn serialize_u32(self, v: u32) -> Result<Value, CodecError> {
        Ok(Value::int(v as i64))
    }

    fn serialize_u64(self, v: u64) -> Result<Value, CodecError> {
        i64::try_from(v)
            .map(Value::int)
            .map_err(|_| CodecError::Unsupported(format!("u64 value {v} exceeds i64 range")))
    }

    fn serialize_f32(self, v: f32) -> Result<Value, CodecError> {
        Ok(Value::double(v as f64))
    }

    fn serialize_f64(self, v: f64) -> Result<Value, CodecError> {
        Ok(Value::double(v))
    }

    fn serialize_char(self, v: char) -> Result<Value, CodecError> {
        Ok(Value::string(v.to_string()))
    }

    fn serialize_str(self, v: &str) -> Result<Value, CodecError> {
        Ok(Value::string(v))
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<Value, CodecError> {
        Ok(Value::collection(
            v.iter().map(|b| Value::int(*b as i64)).collect(),
        ))
    }

    fn serialize_none(self) -> Result<Value, CodecError> {
        Ok(Value::Null(TypeName::unit()))
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Result<Value, CodecError> {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Value, CodecError> {
        Ok(Value::Null(TypeName::unit()))
    }

    fn serialize_unit_struct(self, name: &'static str) -> Result<Value, CodecError> {
        Ok(Value::Null(TypeName::new(name)))
    }

    fn serialize_unit_variant(
        self,
        name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<Value, CodecError> {
        Ok(Value::Ref(variant_tag(name, variant), Vec::new()))
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<Value, CodecError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        name: &'static str,
        _index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Value, CodecError> {
        let payload = value.serialize(ValueSerializer)?;
        Ok(Value::Ref(
            variant_tag(name, variant),
            vec![Property::new(VARIANT_PAYLOAD, payload)],
        ))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<SeqCollector, CodecError> {
        Ok(SeqCollector {
            items: Vec::with_capacity(len.unwrap_or(0)),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<SeqCollector, CodecError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<SeqCollector, CodecError> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        name: &'static str,
        _index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<TupleVariantCollector, CodecError> {
        Ok(TupleVariantCollector {
            tag: variant_tag(name, variant),
            items: Vec::with_capacity(len),
        })
    }

    fn serialize_map(self, len: Option<usize>) -> Result<MapCollector, CodecError> {
        Ok(MapCollector {
            props: Vec::with_capacity(len.unwrap_or(0)),
            pending_key: None,
        })
    }

    fn serialize_struct(
        self,
        name: &'static str,
        len: usize,
    ) -> Result<StructCollector, CodecError> {
        Ok(StructCollector {
            ty: TypeName::new(name),
            props: Vec::with_capacity(len),
        })
    }

    fn serialize_struct_variant(
        self,
        name: &'static str,
        _index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<StructVariantCollector, CodecError> {
        Ok(StructVariantCollector {
            tag: variant_tag(name, variant),
            props: Vec::with_capacity(len),
        })
    }
}

pub struct SeqCollector {
    items: Vec<Value>,
}

impl ser::SerializeSeq for SeqCollector {
    type Ok = Value;
    type Error = CodecError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), CodecError> {
        self.items.push(value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, CodecError> {
        Ok(Value::collection(self.items))
    }
}

impl ser::SerializeTuple for SeqCollector {
    type Ok = Value;
    type Error = CodecError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), CodecError> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Value, CodecError> {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeTupleStruct for SeqCollector {
    type Ok = Value;
    type Error = CodecError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), CodecError> {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Value, CodecError> {
        ser::SerializeSeq::end(self)
    }
}

pub struct TupleVariantCollector {
    tag: TypeName,
    items: Vec<Value>,
}

impl ser::SerializeTupleVariant for TupleVariantCollector {
    type Ok = Value;
    type Error = CodecError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), CodecError> {
        self.items.push(value.serialize(ValueSerializer)?);
        Ok(())
    }

    fn end(self) -> Result<Value, CodecError> {
        Ok(Value::Ref(
            self.tag,
            vec![Property::new(VARIANT_PAYLOAD, Value::collection(self.items))],
        ))
    }
}

pub struct MapCollector {
    props: Vec<Property>,
    pending_key: Option<String>,
}

impl ser::SerializeMap for MapCollector {
    type Ok = Value;
    type Error = CodecError;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Result<(), CodecError> {
        self.pending_key = Some(key.serialize(MapKeySerializer)?);
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), CodecError> {
        let key = self
            .pending_key
            .take()
            .ok_or_else(|| CodecError::Unsupported("map value without key".into()))?;
        self.props
            .push(Property::new(key, value.serialize(ValueSerializer)?));
        Ok(())
    }

    fn end(self) -> Result<Value, CodecError> {
        Ok(Value::reference(TypeName::map(), self.props))
    }
}

pub struct StructCollector {
    ty: TypeName,
    props: Vec<Property>,
}

impl ser::SerializeStruct for StructCollector {
    type Ok = Value;
    type Error = CodecError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), CodecError> {
        self.props
            .push(Property::new(key, value.serialize(ValueSerializer)?));
        Ok(())
    }

    fn end(self) -> Result<Value, CodecError> {
        Ok(Value::reference(self.ty, self.props))
    }
}

pub struct StructVariantCollector {
    tag: TypeName,
    props: Vec<Property>,
}

impl ser::SerializeStructVariant for StructVariantCollector {
    type Ok = Value;
    type Error = CodecError;

    fn serialize_field<T: Serialize + ?Sized>(
        &mut self,
        key: &'static str,
        value: &T,
    ) -> Result<(), CodecError> {
        self.props
            .push(Property::new(key, value.serialize(ValueSerializer)?));
        Ok(())
    }

    fn end(self) -> Result<Value, CodecError> {
        Ok(Value::reference(self.tag, self.props))
    }
}

/// Map keys must render as property names; only scalar keys qualify.
struct MapKeySerializer;

macro_rules! key_to_string {
    ($method:ident, $ty:ty) => {
        fn $method(self, v: $ty) -> Result<String, CodecError> {
            Ok(v.to_string())
        }
    };
}

impl ser::Serializer for MapKeySerializer {
    type Ok = String;
    type Error = CodecError;

    type SerializeSeq = ser::Impossible<String, CodecError>;
    type SerializeTuple = ser::Impossible<String, CodecError>;
    type SerializeTupleStruct = ser::Impossible<String, CodecError>;
    type SerializeTupleVariant = ser::Impossible<String, CodecError>;
    type SerializeMap = ser::Impossible<String, CodecError>;
    type SerializeStruct = ser::Impossible<String, CodecError>;
    type SerializeStructVariant = ser::Impossible<String, CodecError>;

    key_to_string!(serialize_bool, bool);
    key_to_string!(serialize_i8, i8);
    key_to_string!(serialize_i16, i16);
    key_to_string!(serialize_i32, i32);
    key_to_string!(serialize_i64, i64);
    key_to_string!(serialize_u8, u8);
    key_to_string!(serialize_u16, u16);
    key_to_string!(serialize_u32, u32);
    key_to_string!(serialize_u64, u64);
    key_to_string!(serialize_char, char);

    fn serialize_f32(self, _v: f32) -> Result<String, CodecError> {
        Err(CodecError::Unsupported("float map keys".into()))
    }

    fn serialize_f64(self, _v: f64) -> Result<String, CodecError> {
        Err(CodecError::Unsupported("float map keys".into()))
    }

    fn serialize_str(self, v: &str) -> Result<String, CodecError> {
        Ok(v.to_string())
    }

    fn serialize_bytes(self, _v: &[u8]) -> Result<String, CodecError> {
        Err(CodecError::Unsupported("byte map keys".into()))
    }

    fn serialize_none(self) -> Result<String, CodecError> {
        Err(CodecError::Unsupported("null map keys".into()))
    }

    fn serialize_some<T: Serialize + ?Sized>(self, _value: &T) -> Result<String, CodecError> {
        Err(CodecError::Unsupported("optional map keys".into()))
    }

    fn serialize_unit(self) -> Result<String, CodecError> {
        Err(CodecError::Unsupported("unit map keys".into()))
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<String, CodecError> {
        Err(CodecError::Unsupported("unit struct map keys".into()))
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _index: u32,
        variant: &'static str,
    ) -> Result<String, CodecError> {
        Ok(variant.to_string())
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<String, CodecError> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _value: &T,
    ) -> Result<String, CodecError> {
        Err(CodecError::Unsupported("newtype variant map keys".into()))
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq, CodecError> {
        Err(CodecError::Unsupported("sequence map keys".into()))
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple, CodecError> {
        Err(CodecError::Unsupported("tuple map keys".into()))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct, CodecError> {
        Err(CodecError::Unsupported("tuple struct map keys".into()))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant, CodecError> {
        Err(CodecError::Unsupported("tuple variant map keys".into()))
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, CodecError> {
        Err(CodecError::Unsupported("map map keys".into()))
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct, CodecError> {
        Err(CodecError::Unsupported("struct map keys".into()))
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, CodecError> {
        Err(CodecError::Unsupported("struct variant map keys".into()))
    }
}

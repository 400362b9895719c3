//! Reflective encoder/decoder between domain objects and [`Value`] trees.
//!
//! The serde data model does the introspection, the [`TypeRegistry`] maps
//! wire type names back to constructors, and a shared LRU keeps per-type
//! [`ClassMetadata`] so repeated encodes of one type skip re-introspection
//! and incoming refs can be shape-checked before dynamic decode.

mod de;
mod introspect;
mod lru;
mod registry;
mod ser;

pub use de::from_value;
pub use introspect::{ClassMetadata, TypeIntrospector, ValueIntrospector};
pub use lru::{LruCache, SharedLru};
pub use registry::TypeRegistry;
pub use ser::to_value;

use std::any::Any;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CodecError;
use crate::value::{TypeName, Value};

/// Default capacity of the per-type metadata cache.
pub const DEFAULT_METADATA_CAPACITY: usize = 64;

/// Shared encoder/decoder context. One instance serves every component
/// pipeline of a process; all mutation goes through the internal LRU lock.
pub struct Codec {
    registry: TypeRegistry,
    introspector: Box<dyn TypeIntrospector>,
    metadata: SharedLru<TypeName, ClassMetadata>,
}

impl Codec {
    pub fn new(registry: TypeRegistry) -> Self {
        Self::with_capacity(registry, DEFAULT_METADATA_CAPACITY)
    }

    pub fn with_capacity(registry: TypeRegistry, metadata_capacity: usize) -> Self {
        Self {
            registry,
            introspector: Box::new(ValueIntrospector),
            metadata: SharedLru::new(metadata_capacity),
        }
    }

    /// Swap in a different introspection adapter.
    pub fn with_introspector(mut self, introspector: Box<dyn TypeIntrospector>) -> Self {
        self.introspector = introspector;
        self
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Encode an arbitrary (acyclic) object graph into a value tree,
    /// recording the shape of every `Ref` in the metadata cache.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Value, CodecError> {
        let encoded = ser::to_value(value)?;
        self.record_shapes(&encoded);
        Ok(encoded)
    }

    /// Decode a value tree into a known target type.
    pub fn decode<T: DeserializeOwned>(&self, value: &Value) -> Result<T, CodecError> {
        de::from_value(value)
    }

    /// Decode a value tree through the registry, selecting the concrete type
    /// by the root `Ref`'s type name. The result downcasts to whatever type
    /// was registered under that name.
    ///
    /// Incoming refs with cached metadata are shape-checked first, so a
    /// truncated or mismatched snapshot fails with a diagnostic instead of a
    /// partially decoded value.
    pub fn decode_dyn(&self, value: &Value) -> Result<Box<dyn Any + Send>, CodecError> {
        if let Value::Ref(ty, _) = value {
            if let Some(meta) = self.metadata.get(ty) {
                meta.validate(value)?;
            }
        }
        self.registry.decode_dyn(value)
    }

    /// Number of types currently held in the metadata cache.
    pub fn cached_types(&self) -> usize {
        self.metadata.len()
    }

    fn record_shapes(&self, value: &Value) {
        match value {
            Value::Ref(ty, props) => {
                // Map-typed refs have no stable shape worth caching.
                if ty != &TypeName::map() && self.metadata.get(ty).is_none() {
                    if let Ok(meta) = self.introspector.introspect(ty, value) {
                        self.metadata.get_or_insert(ty.clone(), || meta);
                    }
                }
                for prop in props {
                    self.record_shapes(&prop.value);
                }
            }
            Value::Collection(_, items) => {
                for item in items {
                    self.record_shapes(item);
                }
            }
            _ => {}
        }
    }

    /// The cached metadata for a type, if present.
    pub fn metadata_for(&self, ty: &TypeName) -> Option<Arc<ClassMetadata>> {
        self.metadata.get(ty)
    }
}

impl std::fmt::Debug for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codec")
            .field("registry", &self.registry)
            .field("cached_types", &self.metadata.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Property;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Url {
        domain: String,
        port: u16,
        protocol: String,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Contact {
        site: Url,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct User {
        name: String,
        contacts: Vec<Contact>,
        nickname: Option<String>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    enum Counter {
        Increment,
        Add(i64),
        Seed { value: i64, label: String },
    }

    fn sample_user() -> User {
        User {
            name: "ada".into(),
            contacts: vec![Contact {
                site: Url {
                    domain: "example.com".into(),
                    port: 443,
                    protocol: "https".into(),
                },
            }],
            nickname: None,
        }
    }

    fn codec() -> Codec {
        let mut registry = TypeRegistry::new();
        registry.register::<User>("User");
        registry.register::<Counter>("Counter");
        Codec::new(registry)
    }

    #[test]
    fn test_encode_produces_typed_refs() {
        let encoded = codec().encode(&sample_user()).unwrap();
        assert_eq!(encoded.type_name().as_str(), "User");

        let contacts = encoded.property("contacts").unwrap();
        let Value::Collection(_, items) = &contacts.value else {
            panic!("contacts should be a collection");
        };
        assert_eq!(items[0].type_name().as_str(), "Contact");
        assert_eq!(
            items[0].property("site").unwrap().value.type_name().as_str(),
            "Url"
        );
        assert!(encoded.property("nickname").unwrap().value.is_null());
    }

    #[test]
    fn test_round_trip_nested_refs() {
        let codec = codec();
        let original = sample_user();
        let decoded: User = codec.decode(&codec.encode(&original).unwrap()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_round_trip_enum_variants() {
        let codec = codec();
        for msg in [
            Counter::Increment,
            Counter::Add(42),
            Counter::Seed {
                value: -1,
                label: "reset".into(),
            },
        ] {
            let encoded = codec.encode(&msg).unwrap();
            let decoded: Counter = codec.decode(&encoded).unwrap();
            assert_eq!(decoded, msg);
        }
    }

    #[test]
    fn test_unit_variant_tag_shape() {
        let encoded = codec().encode(&Counter::Increment).unwrap();
        assert_eq!(encoded.type_name().as_str(), "Counter::Increment");
        assert!(encoded.properties().is_empty());
    }

    #[test]
    fn test_decode_dyn_resolves_through_registry() {
        let codec = codec();
        let encoded = codec.encode(&sample_user()).unwrap();
        let decoded = codec.decode_dyn(&encoded).unwrap();
        assert_eq!(*decoded.downcast::<User>().unwrap(), sample_user());
    }

    #[test]
    fn test_decode_dyn_unknown_type_is_reported() {
        let codec = codec();
        let stranger = Value::reference("com.example.Missing", vec![]);
        match codec.decode_dyn(&stranger) {
            Err(CodecError::UnknownType(name)) => assert_eq!(name, "com.example.Missing"),
            other => panic!("expected UnknownType, got {other:?}"),
        }
    }

    #[test]
    fn test_repeated_encode_hits_metadata_cache() {
        let codec = codec();
        codec.encode(&sample_user()).unwrap();
        let first = codec.metadata_for(&TypeName::new("User")).unwrap();
        codec.encode(&sample_user()).unwrap();
        let second = codec.metadata_for(&TypeName::new("User")).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        // User, Contact, and Url shapes all recorded.
        assert!(codec.cached_types() >= 3);
    }

    #[test]
    fn test_shape_mismatch_is_caught_before_decode() {
        let codec = codec();
        codec.encode(&sample_user()).unwrap();

        let truncated = Value::reference(
            "User",
            vec![Property::new("name", Value::string("ada"))],
        );
        match codec.decode_dyn(&truncated) {
            Err(CodecError::ShapeMismatch { type_name, .. }) => assert_eq!(type_name, "User"),
            other => panic!("expected ShapeMismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_maps_round_trip() {
        use std::collections::BTreeMap;

        let codec = codec();
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), 1i64);
        map.insert("b".to_string(), 2i64);

        let encoded = codec.encode(&map).unwrap();
        assert_eq!(encoded.type_name(), &TypeName::map());
        let decoded: BTreeMap<String, i64> = codec.decode(&encoded).unwrap();
        assert_eq!(decoded, map);
    }

    #[test]
    fn test_some_null_distinction_in_options() {
        let codec = codec();
        let with_nickname = User {
            nickname: Some("countess".into()),
            ..sample_user()
        };
        let decoded: User = codec.decode(&codec.encode(&with_nickname).unwrap()).unwrap();
        assert_eq!(decoded.nickname.as_deref(), Some("countess"));

        let decoded_none: User = codec.decode(&codec.encode(&sample_user()).unwrap()).unwrap();
        assert_eq!(decoded_none.nickname, None);
    }
}

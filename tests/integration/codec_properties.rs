//! Property-based tests for the codec and the wire form.

use proptest::prelude::*;

use hindsight::value::{from_wire, to_wire};
use hindsight::{Property, TypeName, Value};

use super::common::counter::{self, Msg};

/// Arbitrary value trees. Property names are drawn from a sorted unique set
/// so equality is stable across the wire's object ordering.
fn value_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::null(TypeName::unit())),
        any::<bool>().prop_map(Value::bool),
        any::<i64>().prop_map(Value::int),
        (-1.0e9..1.0e9f64).prop_map(Value::double),
        "[a-zA-Z0-9 ]{0,16}".prop_map(Value::string),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::collection),
            (
                "[A-Z][a-z]{0,8}",
                prop::collection::btree_map("[a-z]{1,8}", inner, 0..4),
            )
                .prop_map(|(name, props)| {
                    Value::reference(
                        name,
                        props
                            .into_iter()
                            .map(|(k, v)| Property::new(k, v))
                            .collect::<Vec<_>>(),
                    )
                }),
        ]
    })
}

fn msg_strategy() -> impl Strategy<Value = Msg> {
    prop_oneof![
        Just(Msg::Increment),
        any::<i64>().prop_map(Msg::Add),
        Just(Msg::Load),
        "[a-z ]{0,12}".prop_map(Msg::LoadFailed),
    ]
}

proptest! {
    #[test]
    fn prop_value_tree_survives_the_wire(value in value_strategy()) {
        let wire = to_wire(&value).unwrap();
        prop_assert_eq!(from_wire(&wire).unwrap(), value);
    }

    #[test]
    fn prop_message_round_trips_through_codec(msg in msg_strategy()) {
        let codec = counter::codec();
        let encoded = codec.encode(&msg).unwrap();

        let decoded: Msg = codec.decode(&encoded).unwrap();
        prop_assert_eq!(&decoded, &msg);

        // The registry resolves the same value dynamically.
        let dynamic = codec.decode_dyn(&encoded).unwrap();
        prop_assert_eq!(*dynamic.downcast::<Msg>().unwrap(), msg);
    }
}

mod common;

use common::strategies::*;
use common::OrderParams;
use proptest::prelude::*;
use queue_processors::codec;
use queue_processors::{PropertyMap, PropertyValue};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NameOnly {
    name: String,
}

proptest! {
    /// Property: decoding an encoded record yields the record
    #[test]
    fn encoded_orders_decode_to_themselves(order in order_params_strategy()) {
        let fields = codec::encode(&order).unwrap();
        let decoded: OrderParams = codec::decode(&fields).unwrap();
        prop_assert_eq!(decoded, order);
    }

    /// Property: keys with no matching member never affect the decoded record
    #[test]
    fn foreign_keys_are_ignored(
        order in order_params_strategy(),
        key in foreign_key_strategy(),
        value in any::<String>(),
    ) {
        let mut fields = codec::encode(&order).unwrap();
        fields.insert(key, PropertyValue::String(value));

        let decoded: OrderParams = codec::decode(&fields).unwrap();
        prop_assert_eq!(decoded, order);
    }

    /// Property: foreign keys are skipped whatever they hold, NaN included
    #[test]
    fn foreign_float_keys_are_ignored(
        order in order_params_strategy(),
        key in foreign_key_strategy(),
        value in prop_oneof![Just(f64::NAN), Just(f64::INFINITY), any::<f64>()],
    ) {
        let mut fields = codec::encode(&order).unwrap();
        fields.insert(key, PropertyValue::Float(value));

        let decoded: OrderParams = codec::decode(&fields).unwrap();
        prop_assert_eq!(decoded, order);
    }

    /// Property: encoding emits only member names
    #[test]
    fn encoded_keys_are_members(order in order_params_strategy()) {
        let members = codec::member_names::<OrderParams>().unwrap();
        let fields = codec::encode(&order).unwrap();
        prop_assert!(fields.keys().all(|key| members.contains(key)));
    }
}

#[test]
fn test_routing_tag_alongside_payload() {
    let mut fields = PropertyMap::new();
    fields.insert("Name".to_string(), PropertyValue::from("x"));
    fields.insert("RoutingTag".to_string(), PropertyValue::from("Q"));

    let decoded: NameOnly = codec::decode(&fields).unwrap();

    assert_eq!(decoded, NameOnly { name: "x".to_string() });
}

#[test]
fn test_empty_map_decodes_to_default() {
    let decoded: OrderParams = codec::decode(&PropertyMap::new()).unwrap();
    assert_eq!(decoded, OrderParams::default());
}

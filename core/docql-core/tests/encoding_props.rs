// 키 인코딩 속성 테스트
//
// 바이트 순서 == 값의 전순서, 그리고 decode(encode(v)) == v

use docql_core::encoding::{decode_value, decode_values, encode_value, encode_values};
use docql_core::{Document, Value};
use proptest::prelude::*;

fn scalar() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        (-1e6..1e6f64).prop_map(Value::Double),
        // integers above 2^53 share double images
        ((1i64 << 53)..(1i64 << 54)).prop_map(Value::Integer),
        ((1i64 << 53)..(1i64 << 54)).prop_map(|i| Value::Double(i as f64)),
        (-100i64..100).prop_map(|i| Value::Double(i as f64)),
        (-100i64..100).prop_map(Value::Integer),
        "[a-c\u{0}]{0,4}".prop_map(Value::Text),
        prop::collection::vec(prop_oneof![Just(0u8), Just(1u8), Just(0xff), any::<u8>()], 0..4)
            .prop_map(Value::Blob),
    ]
}

fn value() -> impl Strategy<Value = Value> {
    scalar().prop_recursive(3, 16, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-c]{1,2}", inner, 0..3).prop_map(|fields| {
                let mut doc = Document::new();
                for (k, v) in fields {
                    doc.set(k, v);
                }
                Value::Document(doc)
            }),
        ]
    })
}

proptest! {
    #[test]
    fn byte_order_matches_value_order(a in value(), b in value()) {
        let (ea, eb) = (encode_value(&a), encode_value(&b));
        prop_assert_eq!(ea.cmp(&eb), a.cmp(&b), "{} vs {}", a, b);
    }

    #[test]
    fn decode_inverts_encode(v in value()) {
        let decoded = decode_value(&encode_value(&v)).unwrap();
        prop_assert_eq!(&decoded, &v);
        // representation survives, not just the order class
        prop_assert_eq!(decoded.value_type(), v.value_type());
    }

    #[test]
    fn composite_keys_order_component_wise(
        a in prop::collection::vec(scalar(), 1..3),
        b in prop::collection::vec(scalar(), 1..3),
    ) {
        let (ea, eb) = (encode_values(&a), encode_values(&b));
        prop_assert_eq!(ea.cmp(&eb), a.cmp(&b));
        prop_assert_eq!(decode_values(&ea).unwrap(), a);
    }
}

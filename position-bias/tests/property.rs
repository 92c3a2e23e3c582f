//! Property-based tests for answer relocation and reply parsing

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{Map, Value};

use position_bias::dataset::QuestionRow;
use position_bias::response::{locate_json, parse_json};

// =========================================================================
// Strategies
// =========================================================================

/// Distinct option texts, up to the largest option count in use
fn arb_options() -> impl Strategy<Value = Vec<String>> {
    prop::collection::hash_set("[a-z ]{1,12}", 1..=6).prop_map(|set| set.into_iter().collect())
}

/// JSON leaves that survive a text round trip unchanged (no floats)
fn arb_leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        // Brackets inside strings must not confuse the locator
        "[a-zA-Z0-9_ {}\\[\\]\"]{0,20}".prop_map(Value::String),
    ]
}

fn arb_value(depth: u32) -> BoxedStrategy<Value> {
    if depth == 0 {
        arb_leaf().boxed()
    } else {
        prop_oneof![
            3 => arb_leaf(),
            1 => prop::collection::vec(arb_value(depth - 1), 0..4).prop_map(Value::Array),
            1 => prop::collection::btree_map("[a-z_]{1,8}", arb_value(depth - 1), 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect::<Map<String, Value>>())),
        ]
        .boxed()
    }
}

/// Top-level reply payload: always an object or an array
fn arb_payload() -> impl Strategy<Value = Value> {
    prop_oneof![
        prop::collection::btree_map("[a-z_]{1,8}", arb_value(2), 0..5)
            .prop_map(|m| Value::Object(m.into_iter().collect::<Map<String, Value>>())),
        prop::collection::vec(arb_value(2), 0..5).prop_map(Value::Array),
    ]
}

/// Chatter around the payload, free of JSON delimiters
fn arb_prose() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 .,!?:'\n-]{0,40}"
}

// =========================================================================
// Property: relocation puts the answer at the target and keeps the options
// =========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn relocation_moves_answer_to_target(
        options in arb_options(),
        answer in any::<prop::sample::Index>(),
        target in any::<prop::sample::Index>(),
        shuffle in any::<bool>(),
        seed in any::<u64>()
    ) {
        let answer = options[answer.index(options.len())].clone();
        let k = target.index(options.len());
        let original = QuestionRow::new("Q", options.clone(), answer.clone()).unwrap();

        let mut row = original.clone();
        row.relocate_answer(k, shuffle, &mut StdRng::seed_from_u64(seed)).unwrap();

        prop_assert_eq!(&row.options[k], &answer);
        prop_assert_eq!(row.answer_idx, k);
        let mut before = original.options.clone();
        let mut after = row.options.clone();
        before.sort();
        after.sort();
        prop_assert_eq!(before, after);
        prop_assert!(row.validate(options.len()).is_ok());
    }

    #[test]
    fn relocation_past_the_end_is_rejected(options in arb_options(), extra in 0usize..3) {
        let answer = options[0].clone();
        let mut row = QuestionRow::new("Q", options.clone(), answer).unwrap();
        let before = row.clone();
        let target = options.len() + extra;
        prop_assert!(row.relocate_answer(target, true, &mut StdRng::seed_from_u64(0)).is_err());
        prop_assert_eq!(row, before);
    }
}

// =========================================================================
// Property: prose around a payload does not change what is parsed
// =========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn parse_recovers_payload_inside_prose(
        payload in arb_payload(),
        before in arb_prose(),
        after in arb_prose()
    ) {
        let compact = serde_json::to_string(&payload).unwrap();
        let text = format!("{}{}{}", before, compact, after);

        prop_assert_eq!(locate_json(&text).unwrap(), compact.as_str());
        let (value, reserialized) = parse_json(&text).unwrap();
        prop_assert_eq!(value, payload);
        prop_assert_eq!(reserialized, compact);
    }

    #[test]
    fn parse_ignores_pretty_printing(payload in arb_payload(), before in arb_prose()) {
        let pretty = serde_json::to_string_pretty(&payload).unwrap();
        let (value, _) = parse_json(&format!("{}{}", before, pretty)).unwrap();
        prop_assert_eq!(value, payload);
    }
}

//! Deep merge over JSON values.
//!
//! # Algorithm
//!
//! `deep_merge(base, update)`:
//!
//! - object + object: keys merge recursively; keys only in `base` survive.
//! - anything else: `update` wins. Arrays are replaced wholesale, never
//!   merged element by element.
//!
//! [`apply`] layers the update mode on top: `Replace` discards `base`.

use serde_json::Value;

use crate::codec::UpdateMode;

/// Merge `update` into `base` in place.
pub fn deep_merge(base: &mut Value, update: Value) {
    match (base, update) {
        (Value::Object(base_map), Value::Object(update_map)) => {
            for (key, value) in update_map {
                match base_map.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Apply one update to `state` according to `mode`.
pub fn apply(state: &mut Value, data: Value, mode: UpdateMode) {
    match mode {
        UpdateMode::Append => deep_merge(state, data),
        UpdateMode::Replace => *state = data,
    }
}

/// Fold a sequence of updates into `base`.
#[must_use]
pub fn apply_all<I>(mut base: Value, updates: I) -> Value
where
    I: IntoIterator<Item = (Value, UpdateMode)>,
{
    for (data, mode) in updates {
        apply(&mut base, data, mode);
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn nested_objects_merge_recursively() {
        let mut base = json!({"a": {"x": 1, "y": 2}, "b": 1});
        deep_merge(&mut base, json!({"a": {"y": 3, "z": 4}}));
        assert_eq!(base, json!({"a": {"x": 1, "y": 3, "z": 4}, "b": 1}));
    }

    #[test]
    fn arrays_are_replaced() {
        let mut base = json!({"tags": [1, 2, 3]});
        deep_merge(&mut base, json!({"tags": [4]}));
        assert_eq!(base, json!({"tags": [4]}));
    }

    #[test]
    fn type_conflicts_take_the_update() {
        let mut base = json!({"a": {"x": 1}, "b": "s"});
        deep_merge(&mut base, json!({"a": 5, "b": {"nested": true}}));
        assert_eq!(base, json!({"a": 5, "b": {"nested": true}}));

        let mut scalar = json!(1);
        deep_merge(&mut scalar, json!({"a": 1}));
        assert_eq!(scalar, json!({"a": 1}));
    }

    #[test]
    fn null_update_overwrites() {
        let mut base = json!({"a": 1});
        deep_merge(&mut base, json!({"a": null}));
        assert_eq!(base, json!({"a": null}));
    }

    #[test]
    fn append_then_append() {
        let state = apply_all(
            json!({}),
            [
                (json!({"a": 1}), UpdateMode::Append),
                (json!({"a": 2, "b": 3}), UpdateMode::Append),
            ],
        );
        assert_eq!(state, json!({"a": 2, "b": 3}));
    }

    #[test]
    fn replace_discards_intermediate_state() {
        let state = apply_all(
            json!({"old": true}),
            [
                (json!({"a": 1}), UpdateMode::Replace),
                (json!({"a": 2, "b": 3}), UpdateMode::Replace),
            ],
        );
        assert_eq!(state, json!({"a": 2, "b": 3}));

        let state = apply_all(
            json!({"keep": 1}),
            [(json!({"c": 1}), UpdateMode::Replace)],
        );
        assert!(state.get("keep").is_none());
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i32>().prop_map(|n| json!(n)),
            "[a-z]{0,4}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 24, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::btree_map("[a-d]", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn merging_an_empty_object_is_identity(base in arb_json()) {
            let mut merged = base.clone();
            deep_merge(&mut merged, json!({}));
            if base.is_object() {
                prop_assert_eq!(merged, base);
            } else {
                prop_assert_eq!(merged, json!({}));
            }
        }

        #[test]
        fn merge_is_idempotent(base in arb_json(), update in arb_json()) {
            let mut once = base.clone();
            deep_merge(&mut once, update.clone());
            let mut twice = once.clone();
            deep_merge(&mut twice, update);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn top_level_update_keys_win(base in arb_json(), update in arb_json()) {
            let mut merged = base.clone();
            deep_merge(&mut merged, update.clone());
            if let (Some(_), Some(update_map)) = (base.as_object(), update.as_object()) {
                for (key, value) in update_map {
                    if !value.is_object() {
                        prop_assert_eq!(&merged[key], value);
                    }
                }
            } else {
                prop_assert_eq!(merged, update);
            }
        }

        #[test]
        fn replace_equals_update(base in arb_json(), update in arb_json()) {
            let mut state = base;
            apply(&mut state, update.clone(), UpdateMode::Replace);
            prop_assert_eq!(state, update);
        }
    }
}

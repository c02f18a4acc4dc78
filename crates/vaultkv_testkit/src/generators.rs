//! Property-based test generators using proptest.
//!
//! Keys produced here are valid for every bundled backend, including the
//! file backend's path rules, and never touch the barrier's reserved
//! namespace.

use proptest::prelude::*;

/// Strategy for a single key segment.
pub fn segment_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z0-9][a-z0-9_-]{0,11}").expect("Invalid regex")
}

/// Strategy for hierarchical keys of one to four segments.
pub fn key_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec(segment_strategy(), 1..=4)
        .prop_map(|segments| segments.join("/"))
        .prop_filter("Key must not be reserved", |key| !key.starts_with("core/barrier"))
}

/// Strategy for view prefixes such as `"app-1/"`.
pub fn prefix_strategy() -> impl Strategy<Value = String> {
    segment_strategy()
        .prop_filter("Prefix must not be reserved", |segment| segment != "core")
        .prop_map(|segment| format!("{segment}/"))
}

/// Strategy for entry values, including the empty value.
pub fn value_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..2048)
}

/// Strategy for a batch of distinct keys with values.
pub fn entries_strategy(max: usize) -> impl Strategy<Value = Vec<(String, Vec<u8>)>> {
    prop::collection::btree_map(key_strategy(), value_strategy(), 1..=max)
        .prop_map(|map| map.into_iter().collect())
}

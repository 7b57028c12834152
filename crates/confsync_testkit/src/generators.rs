//! Property-based test generators using proptest.

use confsync_core::ConfigMap;
use proptest::prelude::*;

/// Strategy for dotted configuration keys such as `db.pool.size`.
pub fn config_key_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9]{0,7}(\\.[a-z][a-z0-9]{0,7}){0,2}")
        .expect("Invalid regex")
}

/// Strategy for printable configuration values, empty included.
pub fn config_value_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[ -~]{0,16}").expect("Invalid regex")
}

/// Strategy for configuration maps of up to `max` entries.
pub fn config_map_strategy(max: usize) -> impl Strategy<Value = ConfigMap> {
    prop::collection::btree_map(config_key_strategy(), config_value_strategy(), 0..=max)
}

/// Strategy for a non-empty sequence of maps, as successive payloads.
pub fn payload_sequence_strategy(len: usize) -> impl Strategy<Value = Vec<ConfigMap>> {
    prop::collection::vec(config_map_strategy(8), 1..=len)
}

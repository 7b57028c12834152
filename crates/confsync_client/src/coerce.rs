//! Conversion of raw configuration strings to typed values.

use crate::error::{BindingError, BindingResult};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Type a binding converts its value to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetType {
    /// Text, assigned verbatim.
    String,
    /// 32-bit signed integer.
    Integer,
    /// 64-bit signed integer.
    Long,
    /// 64-bit float.
    Double,
    /// 32-bit float.
    Float,
    /// `true` or `false`.
    Boolean,
    /// A type with no conversion; the raw string is assigned.
    Unsupported(&'static str),
}

impl TargetType {
    /// Returns the type name.
    pub fn name(&self) -> &'static str {
        match self {
            TargetType::String => "string",
            TargetType::Integer => "integer",
            TargetType::Long => "long",
            TargetType::Double => "double",
            TargetType::Float => "float",
            TargetType::Boolean => "boolean",
            TargetType::Unsupported(name) => *name,
        }
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A converted value.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    /// Text.
    String(String),
    /// 32-bit integer.
    Integer(i32),
    /// 64-bit integer.
    Long(i64),
    /// 64-bit float.
    Double(f64),
    /// 32-bit float.
    Float(f32),
    /// Boolean.
    Boolean(bool),
    /// Unconverted text for an unsupported target type.
    Raw(String),
}

/// Converts `raw` to `target`.
///
/// Numbers and booleans are trimmed first. Booleans accept `true` and
/// `false` in any case and nothing else. An unsupported target yields
/// [`ConfigValue::Raw`].
pub fn coerce(key: &str, raw: &str, target: TargetType) -> BindingResult<ConfigValue> {
    let fail = || BindingError::conversion(key, raw, target.name());
    let trimmed = raw.trim();
    match target {
        TargetType::String => Ok(ConfigValue::String(raw.to_string())),
        TargetType::Integer => trimmed.parse().map(ConfigValue::Integer).map_err(|_| fail()),
        TargetType::Long => trimmed.parse().map(ConfigValue::Long).map_err(|_| fail()),
        TargetType::Double => trimmed.parse().map(ConfigValue::Double).map_err(|_| fail()),
        TargetType::Float => trimmed.parse().map(ConfigValue::Float).map_err(|_| fail()),
        TargetType::Boolean => {
            if trimmed.eq_ignore_ascii_case("true") {
                Ok(ConfigValue::Boolean(true))
            } else if trimmed.eq_ignore_ascii_case("false") {
                Ok(ConfigValue::Boolean(false))
            } else {
                Err(fail())
            }
        }
        TargetType::Unsupported(name) => {
            debug!(key, target = name, "no conversion for target type, assigning raw string");
            Ok(ConfigValue::Raw(raw.to_string()))
        }
    }
}

/// A Rust type a configuration value can be bound to.
pub trait ConfigType: Clone + Send + Sync + 'static {
    /// Conversion target for this type.
    const TARGET: TargetType;

    /// Extracts the typed value.
    fn from_value(value: ConfigValue) -> Option<Self>;

    /// Converts a raw string.
    fn parse(key: &str, raw: &str) -> BindingResult<Self> {
        let value = coerce(key, raw, Self::TARGET)?;
        Self::from_value(value).ok_or_else(|| BindingError::conversion(key, raw, Self::TARGET.name()))
    }
}

impl ConfigType for String {
    const TARGET: TargetType = TargetType::String;

    fn from_value(value: ConfigValue) -> Option<Self> {
        match value {
            ConfigValue::String(s) | ConfigValue::Raw(s) => Some(s),
            _ => None,
        }
    }
}

macro_rules! config_type {
    ($ty:ty, $target:ident) => {
        impl ConfigType for $ty {
            const TARGET: TargetType = TargetType::$target;

            fn from_value(value: ConfigValue) -> Option<Self> {
                match value {
                    ConfigValue::$target(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

config_type!(i32, Integer);
config_type!(i64, Long);
config_type!(f64, Double);
config_type!(f32, Float);
config_type!(bool, Boolean);

/// Parses a comma-separated list, skipping empty entries.
pub fn parse_list<T: ConfigType>(key: &str, raw: &str) -> BindingResult<Vec<T>> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| T::parse(key, item))
        .collect()
}

/// Parses `k=v,k=v` into a map.
pub fn parse_map(key: &str, raw: &str) -> BindingResult<BTreeMap<String, String>> {
    let mut map = BTreeMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (k, v) = entry
            .split_once('=')
            .ok_or_else(|| BindingError::conversion(key, raw, "map"))?;
        let k = k.trim();
        if k.is_empty() {
            return Err(BindingError::conversion(key, raw, "map"));
        }
        map.insert(k.to_string(), v.trim().to_string());
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn numbers_are_trimmed() {
        assert_eq!(coerce("k", " 42 ", TargetType::Integer), Ok(ConfigValue::Integer(42)));
        assert_eq!(
            coerce("k", "9000000000", TargetType::Long),
            Ok(ConfigValue::Long(9_000_000_000))
        );
        assert_eq!(coerce("k", "1.5", TargetType::Double), Ok(ConfigValue::Double(1.5)));
        assert_eq!(coerce("k", "0.25", TargetType::Float), Ok(ConfigValue::Float(0.25)));
    }

    #[test]
    fn integer_overflow_fails() {
        assert!(coerce("k", "9000000000", TargetType::Integer).is_err());
    }

    #[test]
    fn strings_are_verbatim() {
        assert_eq!(
            coerce("k", "  padded ", TargetType::String),
            Ok(ConfigValue::String("  padded ".into()))
        );
    }

    #[test]
    fn booleans_are_strict() {
        assert_eq!(coerce("k", "TRUE", TargetType::Boolean), Ok(ConfigValue::Boolean(true)));
        assert_eq!(coerce("k", " false", TargetType::Boolean), Ok(ConfigValue::Boolean(false)));
        for bad in ["yes", "1", "", "on"] {
            assert!(coerce("k", bad, TargetType::Boolean).is_err(), "{bad}");
        }
    }

    #[test]
    fn unsupported_targets_get_raw_text() {
        assert_eq!(
            coerce("k", "5s", TargetType::Unsupported("duration")),
            Ok(ConfigValue::Raw("5s".into()))
        );
        assert_eq!(<String as ConfigType>::parse("k", "5s").unwrap(), "5s");
    }

    #[test]
    fn failure_names_the_target() {
        let err = <i32 as ConfigType>::parse("pool.size", "ten").unwrap_err();
        assert_eq!(err, BindingError::conversion("pool.size", "ten", "integer"));
    }

    #[test]
    fn lists_and_maps() {
        assert_eq!(parse_list::<i32>("k", "1, 2,,3").unwrap(), vec![1, 2, 3]);
        assert!(parse_list::<i32>("k", "1,x").is_err());
        let map = parse_map("k", "a=1, b = two").unwrap();
        assert_eq!(map["a"], "1");
        assert_eq!(map["b"], "two");
        assert!(parse_map("k", "a=1,b").is_err());
        assert!(parse_map("k", "=1").is_err());
        assert!(parse_map("k", "").unwrap().is_empty());
    }

    proptest! {
        #[test]
        fn integers_survive_formatting(n in any::<i64>()) {
            prop_assert_eq!(<i64 as ConfigType>::parse("k", &n.to_string()).unwrap(), n);
        }

        #[test]
        fn coercion_is_total(raw in ".*") {
            for target in [
                TargetType::String,
                TargetType::Integer,
                TargetType::Long,
                TargetType::Double,
                TargetType::Float,
                TargetType::Boolean,
                TargetType::Unsupported("x"),
            ] {
                let _ = coerce("k", &raw, target);
            }
        }
    }
}

//! Configuration items carried by snapshots.

use crate::error::{CoreError, CoreResult};
use confsync_protocol::ConfigMap;
use serde::{Deserialize, Serialize};

/// Declared format of a configuration value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    /// Plain text.
    #[default]
    String,
    /// Numeric text.
    Number,
    /// `true` / `false`.
    Boolean,
    /// A JSON document.
    Json,
    /// A YAML document.
    Yaml,
    /// A properties document.
    Properties,
}

impl ValueType {
    /// Returns the numeric code used by storage exports.
    pub fn code(&self) -> u8 {
        match self {
            ValueType::String => 1,
            ValueType::Number => 2,
            ValueType::Boolean => 3,
            ValueType::Json => 4,
            ValueType::Yaml => 5,
            ValueType::Properties => 6,
        }
    }

    /// Parses a numeric code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(ValueType::String),
            2 => Some(ValueType::Number),
            3 => Some(ValueType::Boolean),
            4 => Some(ValueType::Json),
            5 => Some(ValueType::Yaml),
            6 => Some(ValueType::Properties),
            _ => None,
        }
    }
}

/// One key of a snapshot with its value and metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigItem {
    /// Configuration key.
    pub key: String,
    /// Raw value; may be empty when a default applies.
    pub value: String,
    /// Declared format.
    pub value_type: ValueType,
    /// Whether the value is stored encrypted.
    pub encrypted: bool,
    /// Whether clients must receive a value.
    pub required: bool,
    /// Value used when `value` is empty.
    pub default_value: Option<String>,
    /// Free-form description.
    pub description: Option<String>,
    /// Owning group, if any.
    pub group_id: Option<u64>,
    /// Display order within the group.
    pub sort_order: i32,
}

impl ConfigItem {
    /// Creates a plain string item.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            value_type: ValueType::String,
            encrypted: false,
            required: false,
            default_value: None,
            description: None,
            group_id: None,
            sort_order: 0,
        }
    }

    /// Sets the declared format.
    #[must_use]
    pub fn with_type(mut self, value_type: ValueType) -> Self {
        self.value_type = value_type;
        self
    }

    /// Marks the item as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Marks the value as encrypted.
    #[must_use]
    pub fn encrypted(mut self) -> Self {
        self.encrypted = true;
        self
    }

    /// Sets the default value.
    #[must_use]
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default_value = Some(default.into());
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the group and sort order.
    #[must_use]
    pub fn in_group(mut self, group_id: u64, sort_order: i32) -> Self {
        self.group_id = Some(group_id);
        self.sort_order = sort_order;
        self
    }

    /// The value clients see: the raw value, or the default when the value is empty.
    pub fn effective_value(&self) -> &str {
        match (&self.default_value, self.value.is_empty()) {
            (Some(default), true) => default,
            _ => &self.value,
        }
    }

    /// Builds plain string items from a flat map, in key order.
    pub fn from_map(map: &ConfigMap) -> Vec<ConfigItem> {
        map.iter()
            .enumerate()
            .map(|(i, (k, v))| {
                let mut item = ConfigItem::new(k.clone(), v.clone());
                item.sort_order = i32::try_from(i).unwrap_or(i32::MAX);
                item
            })
            .collect()
    }
}

/// Flattens a nested JSON document into dot-path keys.
///
/// Objects recurse; strings are taken verbatim; numbers and booleans use
/// their JSON text; arrays are kept as JSON text; `null` becomes an empty
/// string. The top level must be an object.
pub fn flatten_json(document: &serde_json::Value) -> CoreResult<ConfigMap> {
    let object = document
        .as_object()
        .ok_or_else(|| CoreError::invalid("nested configuration must be a JSON object"))?;
    let mut out = ConfigMap::new();
    flatten_into(&mut out, "", object);
    Ok(out)
}

fn flatten_into(out: &mut ConfigMap, prefix: &str, object: &serde_json::Map<String, serde_json::Value>) {
    for (key, value) in object {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            serde_json::Value::Object(inner) => flatten_into(out, &path, inner),
            serde_json::Value::String(s) => {
                out.insert(path, s.clone());
            }
            serde_json::Value::Null => {
                out.insert(path, String::new());
            }
            other => {
                out.insert(path, other.to_string());
            }
        }
    }
}

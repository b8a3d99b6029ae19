//! Dynamically typed configuration values

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// A single configuration value
///
/// Mapping keys are stored lower-cased so that lookups are case-insensitive.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ConfigValue {
    /// Missing key or explicit null
    #[default]
    Absent,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Sequence(Vec<ConfigValue>),
    Mapping(BTreeMap<String, ConfigValue>),
}

impl ConfigValue {
    /// Whether this value is absent
    pub fn is_absent(&self) -> bool {
        matches!(self, ConfigValue::Absent)
    }

    /// Whether this value carries nothing usable (absent, empty string,
    /// empty sequence or empty mapping)
    pub fn is_empty(&self) -> bool {
        match self {
            ConfigValue::Absent => true,
            ConfigValue::String(s) => s.is_empty(),
            ConfigValue::Sequence(items) => items.is_empty(),
            ConfigValue::Mapping(entries) => entries.is_empty(),
            _ => false,
        }
    }

    /// Borrow the inner string, if this is a string value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow the inner mapping, if this is a mapping value
    pub fn as_mapping(&self) -> Option<&BTreeMap<String, ConfigValue>> {
        match self {
            ConfigValue::Mapping(entries) => Some(entries),
            _ => None,
        }
    }

    /// Scalar rendered as a string; non-scalars become the empty string
    pub fn to_string_lossy(&self) -> String {
        match self {
            ConfigValue::Bool(b) => b.to_string(),
            ConfigValue::Int(i) => i.to_string(),
            ConfigValue::Float(f) => f.to_string(),
            ConfigValue::String(s) => s.clone(),
            _ => String::new(),
        }
    }

    /// Loose boolean conversion (`true`, `1`, `yes`, `on` are truthy)
    pub fn to_bool(&self) -> bool {
        match self {
            ConfigValue::Bool(b) => *b,
            ConfigValue::Int(i) => *i != 0,
            ConfigValue::Float(f) => *f != 0.0,
            ConfigValue::String(s) => matches!(
                s.trim().to_ascii_lowercase().as_str(),
                "true" | "1" | "yes" | "on" | "t"
            ),
            _ => false,
        }
    }

    /// Loose integer conversion; unparseable values become 0
    pub fn to_i64(&self) -> i64 {
        match self {
            ConfigValue::Bool(b) => i64::from(*b),
            ConfigValue::Int(i) => *i,
            ConfigValue::Float(f) => *f as i64,
            ConfigValue::String(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .or_else(|_| s.parse::<f64>().map(|f| f as i64))
                    .unwrap_or(0)
            }
            _ => 0,
        }
    }

    /// Sequence of scalars as strings
    ///
    /// A plain string is split on whitespace.
    pub fn to_string_vec(&self) -> Vec<String> {
        match self {
            ConfigValue::Sequence(items) => items
                .iter()
                .filter(|item| !item.is_absent())
                .map(ConfigValue::to_string_lossy)
                .collect(),
            ConfigValue::String(s) => s.split_whitespace().map(str::to_string).collect(),
            _ => Vec::new(),
        }
    }

    /// Mapping of scalars as strings; non-mappings become an empty map
    pub fn to_string_map(&self) -> BTreeMap<String, String> {
        match self {
            ConfigValue::Mapping(entries) => entries
                .iter()
                .map(|(k, v)| (k.clone(), v.to_string_lossy()))
                .collect(),
            _ => BTreeMap::new(),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::String(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::String(value)
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Bool(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Int(value)
    }
}

impl From<BTreeMap<String, ConfigValue>> for ConfigValue {
    fn from(value: BTreeMap<String, ConfigValue>) -> Self {
        ConfigValue::Mapping(value)
    }
}

impl From<Vec<ConfigValue>> for ConfigValue {
    fn from(value: Vec<ConfigValue>) -> Self {
        ConfigValue::Sequence(value)
    }
}

impl Serialize for ConfigValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ConfigValue::Absent => serializer.serialize_unit(),
            ConfigValue::Bool(b) => serializer.serialize_bool(*b),
            ConfigValue::Int(i) => serializer.serialize_i64(*i),
            ConfigValue::Float(f) => serializer.serialize_f64(*f),
            ConfigValue::String(s) => serializer.serialize_str(s),
            ConfigValue::Sequence(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            ConfigValue::Mapping(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (k, v) in entries {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
        }
    }
}

struct ConfigValueVisitor;

impl<'de> Visitor<'de> for ConfigValueVisitor {
    type Value = ConfigValue;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a configuration value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<ConfigValue, E> {
        Ok(ConfigValue::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<ConfigValue, E> {
        Ok(ConfigValue::Int(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<ConfigValue, E> {
        Ok(i64::try_from(v)
            .map(ConfigValue::Int)
            .unwrap_or(ConfigValue::Float(v as f64)))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<ConfigValue, E> {
        Ok(ConfigValue::Float(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<ConfigValue, E> {
        Ok(ConfigValue::String(v.to_string()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<ConfigValue, E> {
        Ok(ConfigValue::String(v))
    }

    fn visit_unit<E: de::Error>(self) -> Result<ConfigValue, E> {
        Ok(ConfigValue::Absent)
    }

    fn visit_none<E: de::Error>(self) -> Result<ConfigValue, E> {
        Ok(ConfigValue::Absent)
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<ConfigValue, D::Error> {
        Deserialize::deserialize(deserializer)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<ConfigValue, A::Error> {
        let mut items = Vec::new();
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(ConfigValue::Sequence(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<ConfigValue, A::Error> {
        let mut entries = BTreeMap::new();
        while let Some((key, value)) = map.next_entry::<String, ConfigValue>()? {
            entries.insert(key.to_lowercase(), value);
        }
        Ok(ConfigValue::Mapping(entries))
    }
}

impl<'de> Deserialize<'de> for ConfigValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ConfigValueVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loose_conversions() {
        assert_eq!(ConfigValue::from("42").to_i64(), 42);
        assert_eq!(ConfigValue::Int(7).to_string_lossy(), "7");
        assert!(ConfigValue::from("TRUE").to_bool());
        assert!(!ConfigValue::Absent.to_bool());
        assert_eq!(ConfigValue::from("a b  c").to_string_vec(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_yaml_keys_are_lowercased() {
        let value: ConfigValue = serde_yaml::from_str("MemorySize: 256\nnested: {Key: v}").unwrap();
        let map = value.as_mapping().unwrap();
        assert_eq!(map.get("memorysize"), Some(&ConfigValue::Int(256)));
        assert_eq!(
            map.get("nested").and_then(|n| n.as_mapping()).and_then(|n| n.get("key")),
            Some(&ConfigValue::from("v"))
        );
    }
}

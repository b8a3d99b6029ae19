//! Hierarchical configuration tree addressed by dotted paths

use crate::error::Result;
use crate::value::ConfigValue;
use std::collections::BTreeMap;

static ABSENT: ConfigValue = ConfigValue::Absent;

/// Hierarchical key/value store
///
/// Paths are dotted (`serverless.functions.hello`) and case-insensitive.
/// A missing path yields [`ConfigValue::Absent`], never an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigTree {
    root: BTreeMap<String, ConfigValue>,
}

fn segments(path: &str) -> impl Iterator<Item = String> + '_ {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .map(str::to_lowercase)
}

impl ConfigTree {
    /// Empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap a value; anything other than a mapping yields an empty tree
    pub fn from_value(value: ConfigValue) -> Self {
        match value {
            ConfigValue::Mapping(root) => Self { root },
            _ => Self::default(),
        }
    }

    /// Parse a YAML document
    pub fn from_yaml(document: &str) -> Result<Self> {
        let value: ConfigValue = serde_yaml::from_str(document)?;
        Ok(Self::from_value(value))
    }

    /// Render as YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.root)?)
    }

    /// The whole tree as one mapping value
    pub fn to_value(&self) -> ConfigValue {
        ConfigValue::Mapping(self.root.clone())
    }

    /// Top-level entries
    pub fn entries(&self) -> &BTreeMap<String, ConfigValue> {
        &self.root
    }

    /// Raw value at `path`
    pub fn get(&self, path: &str) -> &ConfigValue {
        let mut current = &self.root;
        let mut parts = segments(path).peekable();
        while let Some(part) = parts.next() {
            let Some(value) = current.get(&part) else {
                return &ABSENT;
            };
            if parts.peek().is_none() {
                return value;
            }
            match value {
                ConfigValue::Mapping(next) => current = next,
                _ => return &ABSENT,
            }
        }
        &ABSENT
    }

    /// Whether `path` holds a non-null value
    pub fn is_set(&self, path: &str) -> bool {
        !self.get(path).is_absent()
    }

    /// Store `value` at `path`, creating intermediate mappings
    ///
    /// A non-mapping value sitting on an intermediate segment is replaced.
    pub fn set(&mut self, path: &str, value: impl Into<ConfigValue>) {
        let parts: Vec<String> = segments(path).collect();
        let Some((last, parents)) = parts.split_last() else {
            return;
        };
        let mut current = &mut self.root;
        for part in parents {
            let slot = current
                .entry(part.clone())
                .or_insert_with(|| ConfigValue::Mapping(BTreeMap::new()));
            if !matches!(slot, ConfigValue::Mapping(_)) {
                *slot = ConfigValue::Mapping(BTreeMap::new());
            }
            let ConfigValue::Mapping(next) = slot else {
                return;
            };
            current = next;
        }
        current.insert(last.clone(), value.into());
    }

    /// Store `value` at `path` only when nothing is there yet
    pub fn set_default(&mut self, path: &str, value: impl Into<ConfigValue>) {
        if !self.is_set(path) {
            self.set(path, value);
        }
    }

    /// Independent copy of the mapping at `path`
    pub fn sub(&self, path: &str) -> ConfigTree {
        Self::from_value(self.get(path).clone())
    }

    /// Keys of the mapping at `path`
    pub fn keys(&self, path: &str) -> Vec<String> {
        self.get(path)
            .as_mapping()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// One independent view per named entry of the mapping at `path`, each
    /// with `defaults` overlaid
    ///
    /// Pass [`ConfigValue::Absent`] to get the bare views.
    pub fn sub_trees(&self, path: &str, defaults: &ConfigValue) -> BTreeMap<String, ConfigTree> {
        self.keys(path)
            .into_iter()
            .map(|name| {
                let mut view = self.sub(&format!("{path}.{name}"));
                view.overlay_defaults(defaults);
                (name, view)
            })
            .collect()
    }

    /// Overlay `defaults` without overwriting what this tree defines locally
    ///
    /// Mapping-valued keys present on both sides are merged key by key with
    /// local entries winning; every other default only fills an absent key.
    pub fn overlay_defaults(&mut self, defaults: &ConfigValue) {
        let Some(defaults) = defaults.as_mapping() else {
            return;
        };
        for (key, default) in defaults {
            let slot = self
                .root
                .entry(key.clone())
                .or_insert(ConfigValue::Absent);
            if slot.is_absent() {
                *slot = default.clone();
                continue;
            }
            if let (ConfigValue::Mapping(local), ConfigValue::Mapping(inherited)) = (slot, default) {
                for (inner_key, inner_value) in inherited {
                    local
                        .entry(inner_key.clone())
                        .or_insert_with(|| inner_value.clone());
                }
            }
        }
    }

    pub fn get_string(&self, path: &str) -> String {
        self.get(path).to_string_lossy()
    }

    pub fn get_bool(&self, path: &str) -> bool {
        self.get(path).to_bool()
    }

    pub fn get_i64(&self, path: &str) -> i64 {
        self.get(path).to_i64()
    }

    pub fn get_string_vec(&self, path: &str) -> Vec<String> {
        self.get(path).to_string_vec()
    }

    pub fn get_string_map(&self, path: &str) -> BTreeMap<String, String> {
        self.get(path).to_string_map()
    }
}

impl From<BTreeMap<String, ConfigValue>> for ConfigTree {
    fn from(root: BTreeMap<String, ConfigValue>) -> Self {
        Self { root }
    }
}

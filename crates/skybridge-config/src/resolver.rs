//! Lazy, memoized resolution of reference expressions over a [`ConfigTree`]

use crate::cache::MemoCache;
use crate::error::{ConfigError, Result};
use crate::reference::{is_reference, ReferenceExpression, ReferenceKind};
use crate::tree::ConfigTree;
use crate::value::ConfigValue;
use std::collections::BTreeMap;
use tracing::trace;

/// Namespace for whole-value resolution
pub const VALUE_NAMESPACE: &str = "resolve_value";
/// Namespace for mapping resolution
pub const MAP_NAMESPACE: &str = "resolve_map";

/// Resolves reference expressions against a raw tree
///
/// Every resolution goes through the resolver's [`MemoCache`], so a given
/// expression is evaluated at most once for the resolver's lifetime.
#[derive(Debug)]
pub struct Resolver<'a> {
    tree: &'a ConfigTree,
    cache: MemoCache,
}

impl<'a> Resolver<'a> {
    pub fn new(tree: &'a ConfigTree) -> Self {
        Self {
            tree,
            cache: MemoCache::new(),
        }
    }

    /// The memoization cache backing this resolver
    pub fn cache(&self) -> &MemoCache {
        &self.cache
    }

    /// Resolve the value stored at `key`
    ///
    /// A reference value is replaced by what the referenced key resolves to;
    /// anything else is returned unchanged.
    pub fn resolve(&self, key: &str) -> Result<ConfigValue> {
        match self.tree.get(key) {
            ConfigValue::String(raw) if is_reference(raw) => self.resolve_reference(raw),
            other => Ok(other.clone()),
        }
    }

    /// Resolve a reference expression string
    pub fn resolve_reference(&self, expression: &str) -> Result<ConfigValue> {
        self.cache
            .memoized(expression, VALUE_NAMESPACE, |subject| self.evaluate(subject))
    }

    /// Resolve the mapping at `path`, replacing reference entries
    pub fn resolve_map(&self, path: &str) -> Result<BTreeMap<String, ConfigValue>> {
        let resolved = self.cache.memoized(path, MAP_NAMESPACE, |subject| {
            let mut entries = BTreeMap::new();
            if let Some(raw) = self.tree.get(subject).as_mapping() {
                for (key, value) in raw {
                    let value = match value {
                        ConfigValue::String(s) if is_reference(s) => self.resolve_reference(s)?,
                        other => other.clone(),
                    };
                    entries.insert(key.clone(), value);
                }
            }
            Ok(ConfigValue::Mapping(entries))
        })?;
        Ok(resolved.as_mapping().cloned().unwrap_or_default())
    }

    /// Fully resolved copy of the whole tree
    pub fn resolve_tree(&self) -> Result<ConfigTree> {
        let mut expanding = Vec::new();
        let resolved = self.resolve_deep(&self.tree.to_value(), &mut expanding)?;
        Ok(ConfigTree::from_value(resolved))
    }

    /// `expanding` holds the references whose mapping or sequence result is
    /// being expanded; meeting one of them again is a cycle.
    fn resolve_deep(&self, value: &ConfigValue, expanding: &mut Vec<String>) -> Result<ConfigValue> {
        match value {
            ConfigValue::String(raw) if is_reference(raw) => {
                let resolved = self.resolve_reference(raw)?;
                match resolved {
                    ConfigValue::Mapping(_) | ConfigValue::Sequence(_) => {
                        if expanding.iter().any(|seen| seen == raw) {
                            return Err(ConfigError::ReferenceCycle(format!(
                                "{VALUE_NAMESPACE}:{raw}"
                            )));
                        }
                        expanding.push(raw.clone());
                        let expanded = self.resolve_deep(&resolved, expanding);
                        expanding.pop();
                        expanded
                    }
                    scalar => Ok(scalar),
                }
            }
            ConfigValue::Mapping(entries) => {
                let mut resolved = BTreeMap::new();
                for (key, entry) in entries {
                    resolved.insert(key.clone(), self.resolve_deep(entry, expanding)?);
                }
                Ok(ConfigValue::Mapping(resolved))
            }
            ConfigValue::Sequence(items) => Ok(ConfigValue::Sequence(
                items
                    .iter()
                    .map(|item| self.resolve_deep(item, expanding))
                    .collect::<Result<Vec<_>>>()?,
            )),
            other => Ok(other.clone()),
        }
    }

    /// Evaluate one expression without following chains; the cache does that
    fn evaluate(&self, expression: &str) -> Result<ConfigValue> {
        let reference = ReferenceExpression::parse(expression)?;
        let found = match reference.kind {
            ReferenceKind::Config => self.tree.get(&reference.path).clone(),
            ReferenceKind::Env => std::env::var(&reference.path)
                .map(ConfigValue::String)
                .unwrap_or_default(),
        };
        trace!(expression = %expression, empty = found.is_empty(), "Evaluated reference");

        if found.is_empty() {
            Ok(ConfigValue::String(reference.default))
        } else {
            Ok(found)
        }
    }
}

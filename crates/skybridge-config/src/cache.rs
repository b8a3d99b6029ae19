//! At-most-once memoization of resolution work

use crate::error::{ConfigError, Result};
use crate::reference::is_reference;
use crate::value::ConfigValue;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

/// Composite memoization key: the calling resolver's namespace plus the
/// subject being resolved
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub namespace: &'static str,
    pub subject: String,
}

impl CacheKey {
    pub fn new(namespace: &'static str, subject: impl Into<String>) -> Self {
        Self {
            namespace,
            subject: subject.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.subject)
    }
}

/// Key/value store giving at-most-once computation per [`CacheKey`]
///
/// Entries are never evicted or invalidated; the cache lives exactly as long
/// as the snapshot build that owns it.
///
/// The cache is deliberately `!Sync`: resolution must happen on a single
/// control path before any parallel work begins. Concurrent first use of one
/// key would need per-key single-flight locking, which this type does not
/// provide.
#[derive(Debug, Default)]
pub struct MemoCache {
    entries: RefCell<HashMap<CacheKey, ConfigValue>>,
}

impl MemoCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Cached value for `namespace:subject`, if any
    pub fn peek(&self, namespace: &'static str, subject: &str) -> Option<ConfigValue> {
        self.entries
            .borrow()
            .get(&CacheKey::new(namespace, subject))
            .cloned()
    }

    /// Resolve `subject` through `compute`, at most once per key
    ///
    /// A result that is itself a reference expression is resolved further
    /// under the same namespace, and every link of such a chain is cached, so
    /// later reads of any link collapse through the cache without calling
    /// `compute` again. A chain that revisits a subject fails with
    /// [`ConfigError::ReferenceCycle`].
    pub fn memoized<F>(&self, subject: &str, namespace: &'static str, compute: F) -> Result<ConfigValue>
    where
        F: Fn(&str) -> Result<ConfigValue>,
    {
        let mut chain = Vec::new();
        self.follow(subject, namespace, &compute, &mut chain)
    }

    fn follow<F>(
        &self,
        subject: &str,
        namespace: &'static str,
        compute: &F,
        chain: &mut Vec<String>,
    ) -> Result<ConfigValue>
    where
        F: Fn(&str) -> Result<ConfigValue>,
    {
        let key = CacheKey::new(namespace, subject);
        if chain.iter().any(|seen| seen == subject) {
            return Err(ConfigError::ReferenceCycle(key.to_string()));
        }
        chain.push(subject.to_string());

        // The borrow is released before `compute` runs so that it may
        // resolve other keys through this cache.
        let cached = self.entries.borrow().get(&key).cloned();
        let value = match cached {
            Some(value) => value,
            None => {
                let value = compute(subject)?;
                self.entries.borrow_mut().insert(key, value.clone());
                value
            }
        };

        match value.as_str() {
            Some(next) if is_reference(next) => {
                let next = next.to_string();
                self.follow(&next, namespace, compute, chain)
            }
            _ => Ok(value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_computes_at_most_once() {
        let cache = MemoCache::new();
        let calls = Cell::new(0);
        let compute = |subject: &str| {
            calls.set(calls.get() + 1);
            Ok(ConfigValue::from(subject.to_uppercase()))
        };

        let first = cache.memoized("abc", "test", compute).unwrap();
        let second = cache.memoized("abc", "test", compute).unwrap();

        assert_eq!(first, ConfigValue::from("ABC"));
        assert_eq!(first, second);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_namespaces_do_not_collide() {
        let cache = MemoCache::new();
        cache.memoized("k", "one", |_| Ok(ConfigValue::from("1"))).unwrap();
        let other = cache.memoized("k", "two", |_| Ok(ConfigValue::from("2"))).unwrap();
        assert_eq!(other, ConfigValue::from("2"));
        assert_eq!(cache.len(), 2);
        assert_eq!(CacheKey::new("one", "k").to_string(), "one:k");
    }

    #[test]
    fn test_failures_are_not_cached() {
        let cache = MemoCache::new();
        let result = cache.memoized("k", "ns", |s| Err(ConfigError::MalformedReference(s.into())));
        assert!(result.is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let cache = MemoCache::new();
        let result = cache.memoized("${config:a}", "ns", |_| Ok(ConfigValue::from("${config:a}")));
        assert!(matches!(result, Err(ConfigError::ReferenceCycle(_))));
    }
}

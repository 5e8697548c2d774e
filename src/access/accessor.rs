//! Scoped slot accessors and their process-wide cache
//!
//! An accessor is the capability to read or write one slot as if the code ran
//! inside the slot's declaring class. It is bound once per (declaring class,
//! slot) pair and holds no instance state, so a single global cache serves
//! every object of every proxied type.

use crate::core::value::Value;
use crate::shape::{PropertyTable, SlotKey};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Get/set/exists/remove on one slot, regardless of the slot's visibility
pub trait VisibilityAccessor: Send + Sync + fmt::Debug {
    fn key(&self) -> &SlotKey;

    fn declaring_class(&self) -> &str;

    /// Current value, or `None` when the slot is unset
    fn get(&self, table: &PropertyTable) -> Option<Value>;

    /// Reference to the slot, reviving an unset slot as `Null`
    fn get_mut<'t>(&self, table: &'t mut PropertyTable) -> Option<&'t mut Value>;

    fn set(&self, table: &mut PropertyTable, value: Value);

    /// True when the slot is set and not `Null`
    fn exists(&self, table: &PropertyTable) -> bool;

    fn remove(&self, table: &mut PropertyTable);
}

#[derive(Debug)]
pub struct SlotAccessor {
    key: SlotKey,
    declaring_class: String,
}

impl SlotAccessor {
    pub fn new(declaring_class: impl Into<String>, key: SlotKey) -> Self {
        Self {
            key,
            declaring_class: declaring_class.into(),
        }
    }
}

impl VisibilityAccessor for SlotAccessor {
    fn key(&self) -> &SlotKey {
        &self.key
    }

    fn declaring_class(&self) -> &str {
        &self.declaring_class
    }

    fn get(&self, table: &PropertyTable) -> Option<Value> {
        table.get(&self.key).cloned()
    }

    fn get_mut<'t>(&self, table: &'t mut PropertyTable) -> Option<&'t mut Value> {
        table.entry(&self.key)
    }

    fn set(&self, table: &mut PropertyTable, value: Value) {
        table.set(&self.key, value);
    }

    fn exists(&self, table: &PropertyTable) -> bool {
        table.get(&self.key).map_or(false, Value::is_set)
    }

    fn remove(&self, table: &mut PropertyTable) {
        table.remove(&self.key);
    }
}

type CacheKey = (String, SlotKey);

/// First-writer-wins cache of bound accessors
pub struct AccessorCache {
    entries: DashMap<CacheKey, Arc<dyn VisibilityAccessor>>,
    misses: AtomicU64,
}

static GLOBAL: Lazy<AccessorCache> = Lazy::new(AccessorCache::new);

impl AccessorCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::with_capacity(256),
            misses: AtomicU64::new(0),
        }
    }

    /// The process-wide cache used by every dispatcher
    pub fn global() -> &'static AccessorCache {
        &GLOBAL
    }

    /// Returns the accessor for `key` declared by `declaring_class`, binding it on first use
    pub fn accessor(&self, declaring_class: &str, key: &SlotKey) -> Arc<dyn VisibilityAccessor> {
        let cache_key = (declaring_class.to_string(), key.clone());

        // Fast path: already bound
        if let Some(accessor) = self.entries.get(&cache_key) {
            return accessor.value().clone();
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        trace!(
            event = "accessor_bind",
            class = %declaring_class,
            slot = %key,
            "Binding scoped accessor"
        );

        self.entries
            .entry(cache_key)
            .or_insert_with(|| {
                Arc::new(SlotAccessor::new(declaring_class, key.clone())) as Arc<dyn VisibilityAccessor>
            })
            .value()
            .clone()
    }

    pub fn contains(&self, declaring_class: &str, key: &SlotKey) -> bool {
        self.entries
            .contains_key(&(declaring_class.to_string(), key.clone()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of lookups that had to bind a new accessor
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl Default for AccessorCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::class::{ClassDef, ClassRegistry, FieldDef};
    use crate::shape::OriginalTypeShape;

    fn table() -> PropertyTable {
        let registry = ClassRegistry::new();
        registry.register(
            ClassDef::new("Holder")
                .field(FieldDef::private("flag", false))
                .field(FieldDef::public("name", "n")),
        );
        let shape = OriginalTypeShape::classify(&registry, "Holder").unwrap();
        PropertyTable::with_defaults(Arc::new(shape))
    }

    #[test]
    fn test_exists_treats_false_as_set_and_null_as_absent() {
        let mut table = table();
        let accessor = SlotAccessor::new("Holder", SlotKey::private("Holder", "flag"));

        assert!(accessor.exists(&table));
        accessor.set(&mut table, Value::Null);
        assert!(!accessor.exists(&table));
        assert_eq!(accessor.get(&table), Some(Value::Null));

        accessor.remove(&mut table);
        assert_eq!(accessor.get(&table), None);
        assert!(!accessor.exists(&table));
    }

    #[test]
    fn test_get_mut_revives_removed_slot() {
        let mut table = table();
        let accessor = SlotAccessor::new("Holder", SlotKey::public("name"));

        accessor.remove(&mut table);
        *accessor.get_mut(&mut table).unwrap() = Value::str("revived");
        assert_eq!(accessor.get(&table), Some(Value::str("revived")));
    }

    #[test]
    fn test_cache_binds_once_per_declaring_class() {
        let cache = AccessorCache::new();
        let key = SlotKey::private("Base", "property0");

        let first = cache.accessor("Base", &key);
        let second = cache.accessor("Base", &key);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.misses(), 1);

        let child_key = SlotKey::private("Child", "property0");
        let child = cache.accessor("Child", &child_key);
        assert!(!Arc::ptr_eq(&first, &child));
        assert_eq!(cache.len(), 2);
        assert!(cache.contains("Child", &child_key));
    }
}

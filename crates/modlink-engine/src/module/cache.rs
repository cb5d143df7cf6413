//! Module cache
//!
//! Arena of module records indexed by [`ModuleId`]. A record is inserted the
//! moment its key is first requested, before it is loaded or linked, so
//! re-entrant requests during cycle resolution see the same record. Records
//! are never evicted.

use rustc_hash::FxHashMap;
use std::fmt;

use super::key::CanonicalKey;
use super::record::ModuleRecord;

/// Index of a record in the cache arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(u32);

impl ModuleId {
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    /// Records in the cache
    pub entries: usize,
    /// Requests that found an existing record
    pub hits: u64,
    /// Requests that created a record
    pub misses: u64,
}

impl CacheStats {
    /// Fraction of requests served by an existing record
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Canonical key to module record registry
#[derive(Debug, Default)]
pub struct ModuleCache {
    records: Vec<ModuleRecord>,
    index: FxHashMap<CanonicalKey, ModuleId>,
    hits: u64,
    misses: u64,
}

impl ModuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing record for `key`, or a new Unlinked one
    ///
    /// Returns the record id and whether it was created by this call.
    pub fn get_or_create(&mut self, key: &CanonicalKey) -> (ModuleId, bool) {
        if let Some(&id) = self.index.get(key) {
            self.hits += 1;
            return (id, false);
        }
        self.misses += 1;
        let id = ModuleId(self.records.len() as u32);
        self.records.push(ModuleRecord::new(key.clone()));
        self.index.insert(key.clone(), id);
        (id, true)
    }

    /// Id of the record for `key`, without counting a request
    pub fn lookup(&self, key: &CanonicalKey) -> Option<ModuleId> {
        self.index.get(key).copied()
    }

    pub fn get(&self, id: ModuleId) -> Option<&ModuleRecord> {
        self.records.get(id.index())
    }

    /// Record for an id handed out by this cache
    pub(crate) fn at(&self, id: ModuleId) -> &ModuleRecord {
        &self.records[id.index()]
    }

    pub(crate) fn at_mut(&mut self, id: ModuleId) -> &mut ModuleRecord {
        &mut self.records[id.index()]
    }

    /// Record for `key`, if one exists
    pub fn record(&self, key: &CanonicalKey) -> Option<&ModuleRecord> {
        self.lookup(key).and_then(|id| self.get(id))
    }

    /// Records in creation order
    pub fn iter(&self) -> impl Iterator<Item = (ModuleId, &ModuleRecord)> {
        self.records
            .iter()
            .enumerate()
            .map(|(i, record)| (ModuleId(i as u32), record))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.records.len(),
            hits: self.hits,
            misses: self.misses,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::key::{Attributes, Location, ModuleKind};
    use crate::module::record::ModuleState;
    use std::sync::Arc;

    fn key(path: &str, attributes: Attributes) -> CanonicalKey {
        CanonicalKey::new(Location::Path(Arc::from(path)), attributes, ModuleKind::Script)
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let mut cache = ModuleCache::new();
        let a = key("/a.js", Attributes::new());

        let (first, created) = cache.get_or_create(&a);
        assert!(created);
        let (second, created) = cache.get_or_create(&key("/a.js", Attributes::new()));
        assert!(!created);
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(first).unwrap().state(), ModuleState::Unlinked);
    }

    #[test]
    fn test_attributes_create_distinct_records() {
        let mut cache = ModuleCache::new();
        let (plain, _) = cache.get_or_create(&key("/a.cfg", Attributes::new()));
        let (typed, _) = cache.get_or_create(&key("/a.cfg", Attributes::of_type("data")));
        assert_ne!(plain, typed);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_stats() {
        let mut cache = ModuleCache::new();
        assert_eq!(cache.stats().hit_ratio(), 0.0);

        let a = key("/a.js", Attributes::new());
        cache.get_or_create(&a);
        cache.get_or_create(&a);
        cache.get_or_create(&a);
        cache.get_or_create(&key("/b.js", Attributes::new()));

        let stats = cache.stats();
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.hit_ratio(), 0.5);
    }

    #[test]
    fn test_lookup_does_not_count() {
        let mut cache = ModuleCache::new();
        let a = key("/a.js", Attributes::new());
        assert!(cache.lookup(&a).is_none());
        cache.get_or_create(&a);
        assert!(cache.record(&a).is_some());
        assert_eq!(cache.stats().hits, 0);
    }
}

use super::cached_data::CachedData;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use tracing::debug;

/// Session-scoped map from query key to a fully resolved value.
///
/// No eviction: the map holds at most one entry per distinct key seen by its owner, and
/// lives exactly as long as that owner.
#[derive(Debug)]
pub struct QueryCache<K, V> {
    entries: HashMap<K, CachedData<V>>,
}

impl<K, V> Default for QueryCache<K, V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<K, V> QueryCache<K, V>
where
    K: Eq + Hash + Debug,
    V: Clone,
{
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).map(|entry| entry.data.clone())
    }

    pub fn entry(&self, key: &K) -> Option<&CachedData<V>> {
        self.entries.get(key)
    }

    /// Replaces any prior entry for `key` in one step
    pub fn put(&mut self, key: K, value: V) {
        let entry = match self.entries.get(&key) {
            Some(previous) => previous.successor(value),
            None => CachedData::new(value),
        };
        debug!("💾 Cache STORE: {:?} (v{})", key, entry.version);
        self.entries.insert(key, entry);
    }

    pub fn invalidate(&mut self, key: &K) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            debug!("🗑️  Cache INVALIDATE: {:?}", key);
        }
        removed
    }

    /// Drop every entry whose key matches `predicate`
    pub fn invalidate_where<P>(&mut self, mut predicate: P) -> usize
    where
        P: FnMut(&K) -> bool,
    {
        let before = self.entries.len();
        self.entries.retain(|key, _| !predicate(key));
        before - self.entries.len()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

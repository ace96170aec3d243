//! Lookup cache for derived values keyed by row identity.
//!
//! Caches are ordinary values handed to whoever needs them. The eviction
//! policy is chosen when the cache is built and never changes afterwards.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

use parking_lot::Mutex;

/// When entries leave the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    /// Keep every entry until the cache is dropped or cleared
    #[default]
    SessionUnbounded,
    /// Keep at most `n` entries, evicting the oldest insertion first
    Capacity(usize),
}

#[derive(Debug)]
struct CacheState<K, V> {
    entries: HashMap<K, V>,
    order: VecDeque<K>,
}

#[derive(Debug)]
pub struct LookupCache<K, V> {
    policy: CachePolicy,
    state: Mutex<CacheState<K, V>>,
}

impl<K, V> Default for LookupCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new(CachePolicy::default())
    }
}

impl<K, V> LookupCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            policy,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.state.lock().entries.get(key).cloned()
    }

    pub fn insert(&self, key: K, value: V) {
        let mut state = self.state.lock();
        if state.entries.insert(key.clone(), value).is_none() {
            state.order.push_back(key);
        }

        if let CachePolicy::Capacity(capacity) = self.policy {
            while state.entries.len() > capacity {
                let Some(oldest) = state.order.pop_front() else {
                    break;
                };
                state.entries.remove(&oldest);
            }
        }
    }

    pub fn extend(&self, entries: impl IntoIterator<Item = (K, V)>) {
        for (key, value) in entries {
            self.insert(key, value);
        }
    }

    /// Split `keys` into cached values and the keys still to be looked up.
    pub fn partition<'a>(&self, keys: impl IntoIterator<Item = &'a K>) -> (HashMap<K, V>, Vec<K>)
    where
        K: 'a,
    {
        let state = self.state.lock();
        let mut found = HashMap::new();
        let mut missing = Vec::new();
        for key in keys {
            match state.entries.get(key) {
                Some(value) => {
                    found.insert(key.clone(), value.clone());
                }
                None if !missing.contains(key) => missing.push(key.clone()),
                None => {}
            }
        }
        (found, missing)
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_cache_keeps_everything() {
        let cache: LookupCache<String, u64> = LookupCache::default();
        for i in 0..500 {
            cache.insert(format!("org-{i}"), i);
        }
        assert_eq!(cache.len(), 500);
        assert_eq!(cache.get(&"org-0".to_string()), Some(0));
    }

    #[test]
    fn test_capacity_evicts_oldest_insertion() {
        let cache = LookupCache::new(CachePolicy::Capacity(2));
        cache.insert("a", 1);
        cache.insert("b", 2);
        cache.insert("a", 10);
        cache.insert("c", 3);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&"a"), None);
        assert_eq!(cache.get(&"b"), Some(2));
        assert_eq!(cache.get(&"c"), Some(3));
    }

    #[test]
    fn test_partition_reports_missing_once() {
        let cache = LookupCache::default();
        cache.insert("a".to_string(), 4u64);

        let keys = ["a".to_string(), "b".to_string(), "b".to_string()];
        let (found, missing) = cache.partition(keys.iter());
        assert_eq!(found.get("a"), Some(&4));
        assert_eq!(missing, vec!["b".to_string()]);
    }

    #[test]
    fn test_clear() {
        let cache = LookupCache::default();
        cache.insert(1, "x");
        cache.clear();
        assert!(cache.is_empty());
    }
}

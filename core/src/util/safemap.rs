use std::{collections::HashMap, hash::Hash};

/// A small concurrent map that is hard to misuse from async code: the lock is only ever held for
/// the duration of a single map operation, never across an await or a call out to user code.
#[derive(Default)]
pub struct SafeMap<K: Hash + Eq, V>(std::sync::RwLock<HashMap<K, V>>);

impl<K: Hash + Eq, V> SafeMap<K, V> {
    pub fn new() -> Self { Self(std::sync::RwLock::new(HashMap::new())) }

    pub fn insert(&self, key: K, value: V) { self.0.write().expect("Failed to lock the map").insert(key, value); }

    pub fn remove(&self, key: &K) -> Option<V> { self.0.write().expect("Failed to lock the map").remove(key) }

    pub fn len(&self) -> usize { self.0.read().expect("Failed to lock the map").len() }

    pub fn is_empty(&self) -> bool { self.0.read().expect("Failed to lock the map").is_empty() }

    pub fn clear(&self) { self.0.write().expect("Failed to lock the map").clear(); }

    pub fn contains_key(&self, key: &K) -> bool { self.0.read().expect("Failed to lock the map").contains_key(key) }

    /// Run `f` against the entry under the read lock. `f` must not block.
    pub fn with<R>(&self, key: &K, f: impl FnOnce(Option<&V>) -> R) -> R { f(self.0.read().expect("Failed to lock the map").get(key)) }
}

impl<K: Hash + Eq, V: Clone> SafeMap<K, V> {
    pub fn get(&self, key: &K) -> Option<V> { self.0.read().expect("Failed to lock the map").get(key).cloned() }
}

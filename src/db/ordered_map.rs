use std::collections::HashMap;
use std::hash::Hash;

/// Map that iterates in insertion order.
///
/// Quiz hydration relies on this: questions are drawn in random order by the
/// database and must come back in that same order once their answers are
/// attached.
#[derive(Debug, Clone)]
pub struct OrderedMap<K, V> {
    order: Vec<K>,
    values: HashMap<K, V>,
}

impl<K, V> Default for OrderedMap<K, V> {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            values: HashMap::new(),
        }
    }
}

impl<K: Hash + Eq + Clone, V> OrderedMap<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            order: Vec::with_capacity(capacity),
            values: HashMap::with_capacity(capacity),
        }
    }

    /// Inserts `value` under `key`. Re-inserting an existing key replaces the
    /// value and keeps the original position.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let previous = self.values.insert(key.clone(), value);
        if previous.is_none() {
            self.order.push(key);
        }
        previous
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.values.get(key)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.values.get_mut(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.values.contains_key(key)
    }

    pub fn keys(&self) -> &[K] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.order.iter().map(|k| (k, &self.values[k]))
    }

    pub fn into_values(mut self) -> Vec<V> {
        self.order
            .iter()
            .filter_map(|k| self.values.remove(k))
            .collect()
    }
}

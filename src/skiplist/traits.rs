use std::collections::BTreeMap;

use crate::skiplist::SkipList;

/// Trait defining the core operations of a concurrent ordered index
pub trait OrderedIndex<K, V> {
    /// Inserts a key-value pair, returning true if a new entry was created
    fn insert(&self, key: K, value: V) -> bool;
    /// Retrieves the value for a key if a live entry holds it
    fn get(&self, key: &K) -> Option<V>;
    /// Removes the entry for a key, returning true if one was removed
    fn remove(&self, key: &K) -> bool;
    /// Collects all entries with keys in `[start, end]`, ordered by key
    fn range(&self, start: &K, end: &K) -> BTreeMap<K, V>;
    /// Returns the number of live entries
    fn len(&self) -> usize;
    /// Returns true if the index holds no live entries
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> OrderedIndex<K, V> for SkipList<K, V>
where
    K: Ord + Clone,
    V: Clone,
{
    fn insert(&self, key: K, value: V) -> bool {
        SkipList::insert(self, key, value)
    }

    fn get(&self, key: &K) -> Option<V> {
        SkipList::get(self, key)
    }

    fn remove(&self, key: &K) -> bool {
        SkipList::remove(self, key)
    }

    fn range(&self, start: &K, end: &K) -> BTreeMap<K, V> {
        SkipList::range(self, start, end)
    }

    fn len(&self) -> usize {
        SkipList::len(self)
    }

    fn is_empty(&self) -> bool {
        SkipList::is_empty(self)
    }
}

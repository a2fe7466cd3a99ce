//! Persistent collections used for lock-free journal snapshots.
//!
//! Both collections keep their contents behind an `Arc` and never mutate a
//! published value: every update builds a new collection and returns it,
//! leaving older handles untouched. Cloning a handle is a reference count
//! bump, so readers can hold on to a snapshot for as long as they like.
//!
//! Updates copy the backing storage. Journal tables are pruned as
//! transactions retire, which keeps the copies small.

use std::collections::hash_map;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

/// An immutable, structurally shared hash map.
pub struct ImmutableMap<K, V> {
    inner: Arc<HashMap<K, V>>,
}

impl<K, V> ImmutableMap<K, V> {
    /// Returns an empty map.
    pub fn empty() -> Self {
        Self {
            inner: Arc::new(HashMap::new()),
        }
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if the map has no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Iterates over the entries in arbitrary order.
    pub fn iter(&self) -> hash_map::Iter<'_, K, V> {
        self.inner.iter()
    }

    /// Returns true if both handles share the same backing storage.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<K, V> ImmutableMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Looks up a key.
    pub fn get(&self, key: &K) -> Option<&V> {
        self.inner.get(key)
    }

    /// Returns true if the key is present.
    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.contains_key(key)
    }

    /// Returns a new map with `key` set to `value`.
    #[must_use]
    pub fn insert(&self, key: K, value: V) -> Self {
        self.set_items(std::iter::once((key, value)))
    }

    /// Returns a new map with every item applied, later items winning.
    #[must_use]
    pub fn set_items(&self, items: impl IntoIterator<Item = (K, V)>) -> Self {
        let mut items = items.into_iter().peekable();
        if items.peek().is_none() {
            return self.clone();
        }

        let mut map = HashMap::clone(&self.inner);
        map.extend(items);
        Self {
            inner: Arc::new(map),
        }
    }

    /// Returns a new map without the given keys.
    #[must_use]
    pub fn remove_range<'a>(&self, keys: impl IntoIterator<Item = &'a K>) -> Self
    where
        K: 'a,
    {
        let mut keys = keys.into_iter().peekable();
        if keys.peek().is_none() {
            return self.clone();
        }

        let mut map = HashMap::clone(&self.inner);
        for key in keys {
            map.remove(key);
        }
        Self {
            inner: Arc::new(map),
        }
    }

    /// Returns a new map without the entries matching `predicate`, together
    /// with the removed entries.
    #[must_use]
    pub fn remove_where(&self, mut predicate: impl FnMut(&K, &V) -> bool) -> (Self, Vec<(K, V)>) {
        let removed: Vec<(K, V)> = self
            .inner
            .iter()
            .filter(|(k, v)| predicate(k, v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let map = self.remove_range(removed.iter().map(|(k, _)| k));
        (map, removed)
    }
}

impl<K, V> Clone for ImmutableMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K, V> Default for ImmutableMap<K, V> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<K: Eq + Hash, V> FromIterator<(K, V)> for ImmutableMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            inner: Arc::new(iter.into_iter().collect()),
        }
    }
}

impl<K: Eq + Hash, V: PartialEq> PartialEq for ImmutableMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner) || *self.inner == *other.inner
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for ImmutableMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.inner.iter()).finish()
    }
}

impl<'a, K, V> IntoIterator for &'a ImmutableMap<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = hash_map::Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter()
    }
}

/// An immutable, structurally shared list.
pub struct ImmutableList<T> {
    inner: Arc<Vec<T>>,
}

impl<T> ImmutableList<T> {
    /// Returns an empty list.
    pub fn empty() -> Self {
        Self {
            inner: Arc::new(Vec::new()),
        }
    }

    /// Returns the number of items.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if the list has no items.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Iterates over the items in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.inner.iter()
    }
}

impl<T: Clone> ImmutableList<T> {
    /// Returns a new list with `items` appended.
    #[must_use]
    pub fn add_range(&self, items: impl IntoIterator<Item = T>) -> Self {
        let mut items = items.into_iter().peekable();
        if items.peek().is_none() {
            return self.clone();
        }

        let mut list = Vec::clone(&self.inner);
        list.extend(items);
        Self {
            inner: Arc::new(list),
        }
    }

    /// Returns a new list without the items matching `predicate`, together
    /// with the discarded items in their original order.
    #[must_use]
    pub fn remove_all_and_get_discards(
        &self,
        mut predicate: impl FnMut(&T) -> bool,
    ) -> (Self, Vec<T>) {
        let (discarded, kept): (Vec<T>, Vec<T>) =
            self.inner.iter().cloned().partition(|item| predicate(item));

        if discarded.is_empty() {
            return (self.clone(), discarded);
        }

        (
            Self {
                inner: Arc::new(kept),
            },
            discarded,
        )
    }
}

impl<T> Clone for ImmutableList<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for ImmutableList<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> FromIterator<T> for ImmutableList<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            inner: Arc::new(iter.into_iter().collect()),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ImmutableList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.inner.iter()).finish()
    }
}

impl<'a, T> IntoIterator for &'a ImmutableList<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_updates_do_not_touch_old_snapshot() {
        let empty: ImmutableMap<u64, &str> = ImmutableMap::empty();
        let one = empty.insert(1, "a");
        let two = one.set_items(vec![(2, "b"), (1, "c")]);

        assert!(empty.is_empty());
        assert_eq!(one.len(), 1);
        assert_eq!(one.get(&1), Some(&"a"));
        assert_eq!(two.len(), 2);
        assert_eq!(two.get(&1), Some(&"c"));
        assert_eq!(two.get(&2), Some(&"b"));
    }

    #[test]
    fn test_map_empty_update_shares_storage() {
        let map: ImmutableMap<u64, u64> = vec![(1, 1)].into_iter().collect();
        let same = map.set_items(Vec::new());
        assert!(map.ptr_eq(&same));

        let same = map.remove_range(std::iter::empty());
        assert!(map.ptr_eq(&same));
    }

    #[test]
    fn test_map_remove_where() {
        let map: ImmutableMap<u64, u64> = (0..10).map(|i| (i, i * 10)).collect();
        let (kept, mut removed) = map.remove_where(|_, v| *v < 30);
        removed.sort_unstable();

        assert_eq!(removed, vec![(0, 0), (1, 10), (2, 20)]);
        assert_eq!(kept.len(), 7);
        assert!(!kept.contains_key(&2));
        assert_eq!(map.len(), 10);
    }

    #[test]
    fn test_list_add_and_discard() {
        let list: ImmutableList<u64> = ImmutableList::empty();
        let filled = list.add_range(vec![5, 1, 7, 2]);
        let (kept, discarded) = filled.remove_all_and_get_discards(|v| *v < 5);

        assert!(list.is_empty());
        assert_eq!(filled.len(), 4);
        assert_eq!(discarded, vec![1, 2]);
        assert_eq!(kept.iter().copied().collect::<Vec<_>>(), vec![5, 7]);
    }

    #[test]
    fn test_map_equality() {
        let a: ImmutableMap<u64, u64> = vec![(1, 2), (3, 4)].into_iter().collect();
        let b: ImmutableMap<u64, u64> = vec![(3, 4), (1, 2)].into_iter().collect();
        assert_eq!(a, b);
        assert_ne!(a, b.insert(5, 6));
    }
}

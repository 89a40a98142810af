//! Size-bounded caches with least-recently-used eviction.
//!
//! Both caches pair the entry map with a recency index, keyed by a monotonically increasing
//! tick. Touching an entry moves it to a fresh tick, so the first entry of the recency index is
//! always the least recently used one.

use std::{
    borrow::Borrow,
    collections::{BTreeMap, HashMap},
    hash::Hash,
    marker::PhantomData,
    ops::RangeBounds,
};

#[derive(Debug)]
pub(crate) struct Entry<V> {
    tick: u64,
    value: V,
}

/// The map backing a [`LruCache`].
pub(crate) trait EntryMap<K, V>: Default {
    fn get(&self, key: &K) -> Option<&Entry<V>>;
    fn get_mut(&mut self, key: &K) -> Option<&mut Entry<V>>;
    fn insert(&mut self, key: K, entry: Entry<V>);
    fn remove(&mut self, key: &K) -> Option<Entry<V>>;
    fn len(&self) -> usize;
    fn iter<'a>(&'a self) -> impl Iterator<Item = (&'a K, &'a Entry<V>)>
    where
        K: 'a,
        V: 'a;
}

impl<K: Hash + Eq, V> EntryMap<K, V> for HashMap<K, Entry<V>> {
    fn get(&self, key: &K) -> Option<&Entry<V>> {
        HashMap::get(self, key)
    }

    fn get_mut(&mut self, key: &K) -> Option<&mut Entry<V>> {
        HashMap::get_mut(self, key)
    }

    fn insert(&mut self, key: K, entry: Entry<V>) {
        HashMap::insert(self, key, entry);
    }

    fn remove(&mut self, key: &K) -> Option<Entry<V>> {
        HashMap::remove(self, key)
    }

    fn len(&self) -> usize {
        HashMap::len(self)
    }

    fn iter<'a>(&'a self) -> impl Iterator<Item = (&'a K, &'a Entry<V>)>
    where
        K: 'a,
        V: 'a,
    {
        HashMap::iter(self)
    }
}

impl<K: Ord, V> EntryMap<K, V> for BTreeMap<K, Entry<V>> {
    fn get(&self, key: &K) -> Option<&Entry<V>> {
        BTreeMap::get(self, key)
    }

    fn get_mut(&mut self, key: &K) -> Option<&mut Entry<V>> {
        BTreeMap::get_mut(self, key)
    }

    fn insert(&mut self, key: K, entry: Entry<V>) {
        BTreeMap::insert(self, key, entry);
    }

    fn remove(&mut self, key: &K) -> Option<Entry<V>> {
        BTreeMap::remove(self, key)
    }

    fn len(&self) -> usize {
        BTreeMap::len(self)
    }

    fn iter<'a>(&'a self) -> impl Iterator<Item = (&'a K, &'a Entry<V>)>
    where
        K: 'a,
        V: 'a,
    {
        BTreeMap::iter(self)
    }
}

#[derive(Debug)]
pub(crate) struct LruCache<K, V, M> {
    entries: M,
    recency: BTreeMap<u64, K>,
    tick: u64,
    capacity: usize,
    _marker: PhantomData<V>,
}

pub(crate) type UnorderedCache<K, V> = LruCache<K, V, HashMap<K, Entry<V>>>;
pub(crate) type OrderedCache<K, V> = LruCache<K, V, BTreeMap<K, Entry<V>>>;

impl<K: Clone, V, M: EntryMap<K, V>> LruCache<K, V, M> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            entries: M::default(),
            recency: BTreeMap::new(),
            tick: 0,
            capacity,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Looks up an entry without marking it as used.
    pub(crate) fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|e| &e.value)
    }

    /// Iterates all entries, in the order of the backing map.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|(k, e)| (k, &e.value))
    }

    /// Applies `f` to the entry of `key`, creating it with `default` if missing, and marks it as
    /// the most recently used one. Inserting into a full cache evicts the least recently used
    /// entry, which is returned.
    pub(crate) fn upsert(
        &mut self,
        key: K,
        default: impl FnOnce() -> V,
        f: impl FnOnce(&mut V),
    ) -> Option<(K, V)> {
        if self.capacity == 0 {
            return None;
        }
        self.tick += 1;
        let tick = self.tick;

        match self.entries.get_mut(&key) {
            Some(entry) => {
                self.recency.remove(&entry.tick);
                entry.tick = tick;
                f(&mut entry.value);
                self.recency.insert(tick, key);
                None
            }
            None => {
                let evicted = if self.entries.len() >= self.capacity {
                    self.evict_lru()
                } else {
                    None
                };
                let mut value = default();
                f(&mut value);
                self.entries.insert(key.clone(), Entry { tick, value });
                self.recency.insert(tick, key);
                evicted
            }
        }
    }

    fn evict_lru(&mut self) -> Option<(K, V)> {
        let (_, key) = self.recency.pop_first()?;
        let entry = self.entries.remove(&key)?;
        Some((key, entry.value))
    }
}

impl<K: Ord + Clone, V> OrderedCache<K, V> {
    /// Iterates the entries within `range`, in key order.
    pub(crate) fn range<T, R>(&self, range: R) -> impl Iterator<Item = (&K, &V)>
    where
        T: Ord + ?Sized,
        K: Borrow<T>,
        R: RangeBounds<T>,
    {
        self.entries.range(range).map(|(k, e)| (k, &e.value))
    }
}

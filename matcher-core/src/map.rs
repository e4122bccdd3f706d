use parking_lot::RwLock;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Bucket count for a [`StripedMap`]; a prime keeps hashed keys spread
/// evenly across buckets.
pub const DEFAULT_BUCKETS: usize = 2003;

/// Fixed-capacity, bucket-striped associative container.
///
/// Each bucket is guarded by its own reader-writer lock; readers in one
/// bucket never block readers or writers in another. There is no resize —
/// callers size `buckets` up front. `put` is first-writer-wins: inserting
/// an already-present key is a silent no-op, which is exactly the
/// semantics the order-id index wants (ids are unique by construction; a
/// duplicate insert is a client bug, not ours).
pub struct StripedMap<K, V> {
    buckets: Vec<RwLock<Vec<(K, V)>>>,
}

impl<K, V> StripedMap<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Self::with_buckets(DEFAULT_BUCKETS)
    }

    pub fn with_buckets(buckets: usize) -> Self {
        let mut v = Vec::with_capacity(buckets);
        v.resize_with(buckets, || RwLock::new(Vec::new()));
        StripedMap { buckets: v }
    }

    fn bucket_index(&self, key: &K) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.buckets.len()
    }

    /// Shared lock, chain scan.
    pub fn get(&self, key: &K) -> Option<V> {
        let idx = self.bucket_index(key);
        let chain = self.buckets[idx].read();
        chain.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
    }

    /// Exclusive lock; no-op if the key is already present.
    pub fn put(&self, key: K, value: V) {
        let idx = self.bucket_index(&key);
        let mut chain = self.buckets[idx].write();
        if chain.iter().any(|(k, _)| *k == key) {
            return;
        }
        chain.push((key, value));
    }

    /// Exclusive lock, unlink.
    pub fn remove(&self, key: &K) {
        let idx = self.bucket_index(key);
        let mut chain = self.buckets[idx].write();
        chain.retain(|(k, _)| k != key);
    }

    pub fn contains(&self, key: &K) -> bool {
        let idx = self.bucket_index(key);
        self.buckets[idx].read().iter().any(|(k, _)| k == key)
    }
}

impl<K, V> Default for StripedMap<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get() {
        let m: StripedMap<u32, &'static str> = StripedMap::new();
        m.put(1, "one");
        assert_eq!(m.get(&1), Some("one"));
        assert_eq!(m.get(&2), None);
    }

    #[test]
    fn put_is_first_writer_wins() {
        let m: StripedMap<u32, &'static str> = StripedMap::new();
        m.put(1, "one");
        m.put(1, "uno");
        assert_eq!(m.get(&1), Some("one"));
    }

    #[test]
    fn remove_unlinks() {
        let m: StripedMap<u32, &'static str> = StripedMap::new();
        m.put(1, "one");
        m.remove(&1);
        assert_eq!(m.get(&1), None);
        assert!(!m.contains(&1));
    }

    #[test]
    fn small_bucket_count_still_chains_correctly() {
        let m: StripedMap<u32, u32> = StripedMap::with_buckets(4);
        for i in 0..50 {
            m.put(i, i * 10);
        }
        for i in 0..50 {
            assert_eq!(m.get(&i), Some(i * 10));
        }
    }
}

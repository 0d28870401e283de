//! In-memory bounded cache shared across concurrent requests.
//!
//! Capacity-bounded with insertion-order eviction. Every entry carries a
//! TTL; expired entries read as misses and are dropped on that read.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.inserted_at) >= ttl
    }
}

struct Inner<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    order: VecDeque<K>,
}

impl<K: Eq + Hash, V> Inner<K, V> {
    fn forget(&mut self, key: &K) {
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
    }
}

/// A capacity- and TTL-bounded key/value store.
pub struct BoundedCache<K, V> {
    inner: Mutex<Inner<K, V>>,
    capacity: usize,
    ttl: Duration,
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Capacity is clamped to at least one entry.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::with_capacity(capacity),
                order: VecDeque::with_capacity(capacity),
            }),
            capacity,
            ttl,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<K, V>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Look up a key. Returns None if missing or expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut inner = self.lock();

        let expired = inner.entries.get(key)?.is_expired(now, self.ttl);
        if expired {
            inner.entries.remove(key);
            inner.forget(key);
            return None;
        }
        inner.entries.get(key).map(|e| e.value.clone())
    }

    /// Insert or replace a value. At capacity the oldest insertion goes.
    pub fn set(&self, key: K, value: V) {
        let entry = CacheEntry {
            value,
            inserted_at: Instant::now(),
        };
        let mut inner = self.lock();

        if inner.entries.contains_key(&key) {
            inner.forget(&key);
        } else {
            while inner.entries.len() >= self.capacity {
                match inner.order.pop_front() {
                    Some(oldest) => {
                        inner.entries.remove(&oldest);
                    }
                    None => break,
                }
            }
        }

        inner.order.push_back(key.clone());
        inner.entries.insert(key, entry);
    }

    /// Number of stored entries, expired ones included until read.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

//! In-process memoization with a fixed time-to-live.
//!
//! Entries expire `ttl` after insertion and are otherwise never invalidated.
//! Expired entries are evicted on the next miss.
//! There is no single-flight: two misses for the same key both compute.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Default lifetime of a fetched playlist.
pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

pub struct Memo<K, V> {
    name: &'static str,
    ttl: Duration,
    entries: HashMap<K, (Instant, V)>,
}

impl<K, V> Memo<K, V>
where
    K: Eq + Hash + Clone + Debug,
    V: Clone,
{
    /// `name` identifies the memoized operation in log output.
    pub fn new(name: &'static str, ttl: Duration) -> Self {
        Self {
            name,
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Cached value for `key` if it has not expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let (stored, value) = self.entries.get(key)?;
        if stored.elapsed() < self.ttl {
            Some(value.clone())
        } else {
            None
        }
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.entries.insert(key, (Instant::now(), value));
    }

    /// Return the cached value or compute, store and return a fresh one.
    /// Errors are returned as-is and nothing is stored.
    pub fn get_or_try_insert_with<E>(
        &mut self,
        key: &K,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(value) = self.get(key) {
            log::debug!("{} cache hit for {:?}", self.name, key);
            return Ok(value);
        }
        let purged = self.purge_expired();
        log::debug!(
            "{} cache miss for {:?} ({} stored, {} expired dropped)",
            self.name,
            key,
            self.len(),
            purged
        );
        let value = compute()?;
        self.insert(key.clone(), value.clone());
        Ok(value)
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn purge_expired(&mut self) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, (stored, _)| stored.elapsed() < ttl);
        before - self.entries.len()
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

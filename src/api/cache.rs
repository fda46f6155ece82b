//! Small keyed cache for server reads.
//!
//! Entries are considered fresh for a fixed stale time, after which the next
//! read refetches. Failed fetches are never cached.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    fetched_at: Instant,
}

pub struct QueryCache<K, V> {
    stale_after: Duration,
    entries: Mutex<HashMap<K, Entry<V>>>,
}

impl<K, V> QueryCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(stale_after: Duration) -> Self {
        Self {
            stale_after,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The cached value for `key`, if it has not gone stale.
    pub fn get_fresh(&self, key: &K) -> Option<V> {
        let entries = self.entries.lock();
        entries
            .get(key)
            .filter(|e| e.fetched_at.elapsed() < self.stale_after)
            .map(|e| e.value.clone())
    }

    pub fn insert(&self, key: K, value: V) {
        self.entries.lock().insert(
            key,
            Entry {
                value,
                fetched_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, key: &K) {
        self.entries.lock().remove(key);
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Return the fresh cached value or run `fetch` and cache its result.
    ///
    /// The lock is released while `fetch` runs, so concurrent misses for the
    /// same key may both fetch; the later result wins.
    pub async fn get_or_fetch<F, Fut, E>(&self, key: K, fetch: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get_fresh(&key) {
            return Ok(value);
        }
        let value = fetch().await?;
        self.insert(key, value.clone());
        Ok(value)
    }
}

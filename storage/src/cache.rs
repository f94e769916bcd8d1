//! Tag-keyed memoization for repository reads, backed by moka.
//!
//! Entries live under a string key for a fixed TTL and are labelled with
//! tags. Invalidating a tag drops every entry carrying it. The tag index only
//! tracks live entries: moka's eviction listener prunes keys that expire or
//! fall out of capacity.

use moka::future::Cache;
use moka::notification::RemovalCause;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
struct Entry {
    /// Distinguishes this insert from later ones under the same key.
    stamp: u64,
    tags: Arc<[String]>,
    value: Arc<dyn Any + Send + Sync>,
}

#[derive(Default)]
struct TagIndex {
    keys: HashMap<String, HashSet<String>>,
    generations: HashMap<String, u64>,
    /// Stamp of the live entry for each indexed key.
    owners: HashMap<String, u64>,
    next_stamp: u64,
}

impl TagIndex {
    fn generations_of(&self, tags: &[String]) -> Vec<u64> {
        tags.iter()
            .map(|t| self.generations.get(t).copied().unwrap_or(0))
            .collect()
    }

    fn track(&mut self, key: &str, tags: &[String]) -> u64 {
        self.next_stamp += 1;
        self.owners.insert(key.to_string(), self.next_stamp);
        for tag in tags {
            self.keys
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
        self.next_stamp
    }

    /// Drops `key` from the index unless a newer entry has taken its place.
    fn forget(&mut self, key: &str, entry: &Entry) {
        if self.owners.get(key) != Some(&entry.stamp) {
            return;
        }
        self.owners.remove(key);
        for tag in entry.tags.iter() {
            if let Some(keys) = self.keys.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.keys.remove(tag);
                }
            }
        }
    }
}

#[derive(Clone)]
pub struct TaggedCache {
    entries: Cache<String, Entry>,
    tags: Arc<Mutex<TagIndex>>,
}

impl TaggedCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        let tags = Arc::new(Mutex::new(TagIndex::default()));
        let index = tags.clone();

        Self {
            entries: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .eviction_listener(move |key: Arc<String>, entry: Entry, cause| {
                    if !matches!(cause, RemovalCause::Replaced) {
                        index.lock().forget(&key, &entry);
                    }
                })
                .build(),
            tags,
        }
    }

    /// Returns the cached value for `key` or runs `loader` and caches its
    /// result under `tags`. Errors are returned without being cached.
    ///
    /// If one of `tags` is invalidated while the loader runs, the loaded value
    /// is returned to this caller but not kept.
    pub async fn get_or_try_insert<T, E, F, Fut>(
        &self,
        key: &str,
        tags: &[String],
        loader: F,
    ) -> Result<T, E>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.entries.get(key).await {
            if let Some(value) = hit.value.downcast_ref::<T>() {
                tracing::debug!("Cache hit: {}", key);
                return Ok(value.clone());
            }
        }

        let before = self.tags.lock().generations_of(tags);
        let value = loader().await?;

        let stamp = {
            let mut index = self.tags.lock();
            if index.generations_of(tags) != before {
                tracing::debug!("Dropping stale load for {}", key);
                return Ok(value);
            }
            index.track(key, tags)
        };

        let entry = Entry {
            stamp,
            tags: tags.into(),
            value: Arc::new(value.clone()),
        };
        self.entries.insert(key.to_string(), entry).await;

        // An invalidation may have landed between the check and the insert.
        let raced = self.tags.lock().generations_of(tags) != before;
        if raced {
            self.entries.invalidate(key).await;
        }

        Ok(value)
    }

    /// Drops every entry labelled `tag`. Reads issued after this returns
    /// recompute.
    pub async fn invalidate_tag(&self, tag: &str) {
        let keys = {
            let mut index = self.tags.lock();
            *index.generations.entry(tag.to_string()).or_insert(0) += 1;
            index.keys.remove(tag).unwrap_or_default()
        };

        for key in &keys {
            self.entries.invalidate(key).await;
        }
        tracing::debug!("Invalidated tag {} ({} entries)", tag, keys.len());
    }
}

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::utils::format_age;

struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    cached_at: DateTime<Utc>,
    ttl: Duration,
}

impl<V> CacheEntry<V> {
    fn expires_at(&self) -> Instant {
        self.inserted_at + self.ttl
    }

    /// An entry is dead once strictly more than its TTL has elapsed.
    fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.inserted_at) > self.ttl
    }
}

/// Snapshot of one live entry, for diagnostics.
#[derive(Debug, Clone)]
pub struct EntryInfo {
    pub key: String,
    pub kind: &'static str,
    pub cached_at: DateTime<Utc>,
    pub expires_in: Duration,
}

impl EntryInfo {
    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        format_age(self.age_minutes())
    }
}

/// Capacity-bounded key/value store whose entries expire after a TTL.
///
/// All methods take `&self` and are safe to call from many tasks at once.
/// When a new key is inserted into a full store, expired entries are purged
/// first; if the store is still full, the entry closest to expiry is evicted
/// (oldest insertion wins a tie). Overwriting an existing key never evicts.
pub struct TtlCache<V> {
    entries: Mutex<HashMap<String, CacheEntry<V>>>,
    capacity: usize,
    ttl: Duration,
}

impl<V: Clone> TtlCache<V> {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(HashMap::with_capacity(capacity)),
            capacity,
            ttl,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    // Entries are only ever replaced whole, so a panic in another holder
    // cannot leave the map half-updated.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, CacheEntry<V>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return a clone of the value for `key` if present and unexpired.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        let mut entries = self.lock();
        let expired = entries.get(key)?.is_expired(now);
        if expired {
            trace!(key, "Cache entry expired");
            entries.remove(key);
            return None;
        }
        entries.get(key).map(|entry| entry.value.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.lock()
            .get(key)
            .map(|entry| !entry.is_expired(now))
            .unwrap_or(false)
    }

    /// Insert or overwrite `key` with the cache's standard TTL.
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.set_with_ttl(key, value, self.ttl);
    }

    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let now = Instant::now();
        let mut entries = self.lock();

        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            Self::make_room(&mut entries, self.capacity, now);
        }

        entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: now,
                cached_at: Utc::now(),
                ttl,
            },
        );
    }

    fn make_room(entries: &mut HashMap<String, CacheEntry<V>>, capacity: usize, now: Instant) {
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        if entries.len() < before {
            debug!(purged = before - entries.len(), "Purged expired cache entries");
        }

        while entries.len() >= capacity {
            let victim = entries
                .iter()
                .min_by_key(|(_, entry)| (entry.expires_at(), entry.inserted_at))
                .map(|(key, _)| key.clone());
            match victim {
                Some(key) => {
                    debug!(key = %key, "Evicting cache entry nearest to expiry");
                    entries.remove(&key);
                }
                None => break,
            }
        }
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        self.lock().remove(key).map(|entry| entry.value)
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Number of unexpired entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock().values().filter(|e| !e.is_expired(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Snapshot of live entries, soonest-to-expire first.
    pub fn entries(&self, kind_of: impl Fn(&V) -> &'static str) -> Vec<EntryInfo> {
        let now = Instant::now();
        let entries = self.lock();
        let mut infos: Vec<EntryInfo> = entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(key, entry)| EntryInfo {
                key: key.clone(),
                kind: kind_of(&entry.value),
                cached_at: entry.cached_at,
                expires_in: entry.expires_at().saturating_duration_since(now),
            })
            .collect();
        infos.sort_by_key(|info| info.expires_in);
        infos
    }
}

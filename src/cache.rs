//! Best-effort cache of resolved routes keyed by rounded coordinate pairs.
//!
//! Entries live in a single JSON document inside a [`KeyValueStore`]. Any
//! storage failure turns the affected operation into a no-op: a broken store
//! means every lookup misses, never that checkout fails.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;

/// Storage key holding the serialized cache document.
pub const STORAGE_KEY: &str = "checkout_geo.route_cache.v1";

/// Age after which a cached route is refetched.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Entry count above which the oldest routes are evicted.
pub const DEFAULT_CAPACITY: usize = 100;

/// Durable string key-value storage.
///
/// Implementations report failures instead of panicking; the cache decides
/// what to do with them.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Why a storage operation failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("storage quota exceeded")]
    QuotaExceeded,
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Source of "now" in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// In-process store. Also the default when no durable storage exists.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        Ok(())
    }
}

/// Routing backend response as stored in the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedRoute {
    pub distance_meters: f64,
    pub duration_seconds: f64,
    pub encoded_polyline: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheEntry {
    payload: CachedRoute,
    stored_at: u64,
}

type Document = HashMap<String, CacheEntry>;

/// Cache key: both endpoints rounded to 4 decimal places (~11 m).
pub fn route_key(origin: GeoPoint, destination: GeoPoint) -> String {
    format!(
        "{:.4},{:.4}->{:.4},{:.4}",
        key_coord(origin.lat),
        key_coord(origin.lng),
        key_coord(destination.lat),
        key_coord(destination.lng)
    )
}

/// Rounds to the key grid; adding `0.0` turns `-0.0` into `0.0`.
fn key_coord(value: f64) -> f64 {
    (value * 1e4).round() / 1e4 + 0.0
}

/// TTL-bounded, size-capped route cache.
///
/// Safe to share between workflow instances: it only holds coordinates and
/// route geometry. Each read-modify-write cycle runs under one lock.
pub struct RouteCache {
    store: Box<dyn KeyValueStore>,
    clock: Box<dyn Clock>,
    ttl: Duration,
    capacity: usize,
    lock: Mutex<()>,
}

impl std::fmt::Debug for RouteCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteCache")
            .field("ttl", &self.ttl)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl Default for RouteCache {
    fn default() -> Self {
        Self::new(Box::new(MemoryStore::new()))
    }
}

impl RouteCache {
    /// Cache over `store` using the wall clock, a 24 h TTL and room for 100
    /// routes. Anything already under [`STORAGE_KEY`] is reused.
    pub fn new(store: Box<dyn KeyValueStore>) -> Self {
        Self {
            store,
            clock: Box::new(SystemClock),
            ttl: DEFAULT_TTL,
            capacity: DEFAULT_CAPACITY,
            lock: Mutex::new(()),
        }
    }

    /// Replaces the time source used for `storedAt` and expiry.
    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Maximum number of entries kept after each `put`.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Cached route for `key` if it is younger than the TTL. Expired entries
    /// are removed.
    pub fn get(&self, key: &str) -> Option<CachedRoute> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut doc = self.load()?;
        let now = self.clock.now_millis();

        let entry = doc.get(key)?;
        if self.is_fresh(entry, now) {
            tracing::debug!(key = %key, "route cache hit");
            return Some(entry.payload.clone());
        }

        tracing::debug!(key = %key, "route cache entry expired");
        doc.remove(key);
        self.save(&doc);
        None
    }

    /// Stores `payload` under `key`, evicting the oldest entries if the cache
    /// grows past its capacity.
    pub fn put(&self, key: &str, payload: CachedRoute) {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut doc = self.load().unwrap_or_default();
        doc.insert(
            key.to_string(),
            CacheEntry {
                payload,
                stored_at: self.clock.now_millis(),
            },
        );
        self.evict_overflow(&mut doc);
        self.save(&doc);
    }

    /// Removes a single entry, e.g. one whose geometry no longer decodes.
    pub fn invalidate(&self, key: &str) {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(mut doc) = self.load() {
            if doc.remove(key).is_some() {
                self.save(&doc);
            }
        }
    }

    /// Drops every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let Some(mut doc) = self.load() else {
            return 0;
        };
        let now = self.clock.now_millis();
        let before = doc.len();
        doc.retain(|_, entry| self.is_fresh(entry, now));
        let removed = before - doc.len();
        if removed > 0 {
            self.save(&doc);
        }
        removed
    }

    /// Number of stored entries, fresh or not.
    pub fn len(&self) -> usize {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.load().map_or(0, |doc| doc.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes the whole cache document from storage.
    pub fn clear(&self) {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Err(err) = self.store.remove(STORAGE_KEY) {
            tracing::debug!(error = %err, "route cache clear failed");
        }
    }

    fn is_fresh(&self, entry: &CacheEntry, now: u64) -> bool {
        u128::from(now.saturating_sub(entry.stored_at)) < self.ttl.as_millis()
    }

    fn evict_overflow(&self, doc: &mut Document) {
        if doc.len() <= self.capacity {
            return;
        }
        let mut by_age: Vec<(String, u64)> = doc
            .iter()
            .map(|(key, entry)| (key.clone(), entry.stored_at))
            .collect();
        by_age.sort_by_key(|(_, stored_at)| *stored_at);

        let excess = doc.len() - self.capacity;
        for (key, _) in by_age.into_iter().take(excess) {
            tracing::debug!(key = %key, "route cache evicted");
            doc.remove(&key);
        }
    }

    /// `None` when storage is unreadable. A corrupt document is removed and
    /// read as empty.
    fn load(&self) -> Option<Document> {
        let raw = match self.store.get(STORAGE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Some(Document::new()),
            Err(err) => {
                tracing::debug!(error = %err, "route cache read failed");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(doc) => Some(doc),
            Err(err) => {
                tracing::debug!(error = %err, "route cache document corrupt, discarding");
                if let Err(err) = self.store.remove(STORAGE_KEY) {
                    tracing::debug!(error = %err, "route cache discard failed");
                }
                Some(Document::new())
            }
        }
    }

    fn save(&self, doc: &Document) {
        let raw = match serde_json::to_string(doc) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::debug!(error = %err, "route cache serialize failed");
                return;
            }
        };
        if let Err(err) = self.store.set(STORAGE_KEY, &raw) {
            tracing::debug!(error = %err, "route cache write failed");
        }
    }
}

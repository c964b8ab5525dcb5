//! Thread-Safe Storage Engine with Expiry Support
//!
//! The store is a map from key to value with an optional expiry instant per
//! entry. It is shared by every client session behind an `Arc` and needs no
//! external locking.
//!
//! ## Design Decisions
//!
//! 1. **Sharded Locks**: Keys are spread over independent shards, each behind its own `RwLock`.
//! 2. **Lazy Visibility**: An entry whose expiry has passed is treated as absent by every
//!    operation, whether or not it has been physically removed yet.
//! 3. **Active Cleanup**: The [`ExpirySweeper`](super::ExpirySweeper) removes expired
//!    entries that are never touched again.
//!
//! ## Concurrency Model
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     StorageEngine                           │
//! │  ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐            │
//! │  │ Shard 0 │ │ Shard 1 │ │ Shard 2 │ │ Shard N │            │
//! │  │ RwLock  │ │ RwLock  │ │ RwLock  │ │ RwLock  │            │
//! │  │ HashMap │ │ HashMap │ │ HashMap │ │ HashMap │            │
//! │  └─────────┘ └─────────┘ └─────────┘ └─────────┘            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every operation on one key takes exactly one shard lock, so it is atomic
//! with respect to that key. Multi-key operations (`delete_many`) are a
//! sequence of single-key operations.

use bytes::Bytes;
use std::collections::HashMap;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

/// Number of shards for the storage engine.
const NUM_SHARDS: usize = 64;

/// A stored value with optional expiry time.
#[derive(Debug, Clone)]
pub struct Entry {
    pub value: Bytes,
    /// When this entry expires (None = never expires)
    pub expires_at: Option<Instant>,
}

impl Entry {
    /// A TTL too large to add to the current instant never expires.
    pub fn new(value: Bytes, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.and_then(|ttl| Instant::now().checked_add(ttl)),
        }
    }

    #[inline]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    #[inline]
    fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }
}

type ShardMap = HashMap<Bytes, Entry>;

/// A single shard containing a portion of the key-value pairs.
#[derive(Debug, Default)]
struct Shard {
    data: RwLock<ShardMap>,
}

impl Shard {
    // A panic while holding a shard lock cannot leave a half-written entry
    // (every mutation is a single map call), so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, ShardMap> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ShardMap> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Which existence precondition a conditional write requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Condition {
    IfAbsent,
    IfPresent,
}

/// Operation counters, see [`StorageEngine::stats`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageStats {
    /// Physically stored keys, including expired ones not yet removed
    pub keys: u64,
    pub get_ops: u64,
    pub set_ops: u64,
    pub del_ops: u64,
    /// Keys removed because their TTL passed
    pub expired: u64,
}

/// The key-value store shared by all sessions.
///
/// # Example
///
/// ```
/// use emberkv::storage::StorageEngine;
/// use bytes::Bytes;
///
/// let engine = StorageEngine::new();
/// engine.set(Bytes::from("name"), Bytes::from("Ariz"));
/// assert_eq!(engine.get(&Bytes::from("name")), Some(Bytes::from("Ariz")));
///
/// assert!(!engine.set_if_absent(Bytes::from("name"), Bytes::from("other"), None));
/// assert_eq!(engine.delete_many(&[Bytes::from("name"), Bytes::from("missing")]), 1);
/// ```
pub struct StorageEngine {
    shards: Vec<Shard>,
    key_count: AtomicU64,
    get_count: AtomicU64,
    set_count: AtomicU64,
    del_count: AtomicU64,
    expired_count: AtomicU64,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("shards", &self.shards.len())
            .field("key_count", &self.key_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for StorageEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageEngine {
    pub fn new() -> Self {
        Self {
            shards: (0..NUM_SHARDS).map(|_| Shard::default()).collect(),
            key_count: AtomicU64::new(0),
            get_count: AtomicU64::new(0),
            set_count: AtomicU64::new(0),
            del_count: AtomicU64::new(0),
            expired_count: AtomicU64::new(0),
        }
    }

    #[inline]
    fn shard(&self, key: &[u8]) -> &Shard {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % NUM_SHARDS]
    }

    fn record_expired(&self, count: u64) {
        self.key_count.fetch_sub(count, Ordering::Relaxed);
        self.expired_count.fetch_add(count, Ordering::Relaxed);
    }

    /// Gets the value for a key.
    ///
    /// Returns `None` if the key doesn't exist or has expired. An expired
    /// entry found here is removed on the spot.
    pub fn get(&self, key: &Bytes) -> Option<Bytes> {
        self.get_count.fetch_add(1, Ordering::Relaxed);

        let shard = self.shard(key);

        // Fast path: read lock only
        {
            let data = shard.read();
            match data.get(key) {
                Some(entry) if !entry.is_expired() => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        let mut data = shard.write();
        match data.get(key) {
            Some(entry) if entry.is_expired() => {
                data.remove(key);
                self.record_expired(1);
                None
            }
            // Rewritten by another session between the two locks
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Sets a key-value pair without expiry, replacing any previous value
    /// and TTL.
    pub fn set(&self, key: Bytes, value: Bytes) {
        self.upsert(key, Entry::new(value, None));
    }

    /// Sets a key-value pair that expires after `ttl`.
    pub fn set_with_ttl(&self, key: Bytes, value: Bytes, ttl: Duration) {
        self.upsert(key, Entry::new(value, Some(ttl)));
    }

    fn upsert(&self, key: Bytes, entry: Entry) {
        self.set_count.fetch_add(1, Ordering::Relaxed);

        let mut data = self.shard(&key).write();
        if data.insert(key, entry).is_none() {
            self.key_count.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Sets the key only if it is absent (or expired).
    ///
    /// Returns `true` if the value was written.
    pub fn set_if_absent(&self, key: Bytes, value: Bytes, ttl: Option<Duration>) -> bool {
        self.set_conditional(key, Entry::new(value, ttl), Condition::IfAbsent)
    }

    /// Sets the key only if it already holds a live value.
    ///
    /// Returns `true` if the value was written.
    pub fn set_if_present(&self, key: Bytes, value: Bytes, ttl: Option<Duration>) -> bool {
        self.set_conditional(key, Entry::new(value, ttl), Condition::IfPresent)
    }

    fn set_conditional(&self, key: Bytes, entry: Entry, condition: Condition) -> bool {
        let mut data = self.shard(&key).write();

        let stale = data.get(&key).is_some_and(|e| e.is_expired());
        if stale {
            data.remove(&key);
            self.record_expired(1);
        }

        let present = data.contains_key(&key);
        let allowed = match condition {
            Condition::IfAbsent => !present,
            Condition::IfPresent => present,
        };
        if !allowed {
            return false;
        }

        self.set_count.fetch_add(1, Ordering::Relaxed);
        if data.insert(key, entry).is_none() {
            self.key_count.fetch_add(1, Ordering::Relaxed);
        }
        true
    }

    /// Deletes a key.
    ///
    /// Returns `true` if a live value was removed. An expired entry is
    /// removed too but reported as absent.
    pub fn delete(&self, key: &Bytes) -> bool {
        self.del_count.fetch_add(1, Ordering::Relaxed);

        let mut data = self.shard(key).write();
        match data.remove(key) {
            Some(entry) if entry.is_expired() => {
                self.record_expired(1);
                false
            }
            Some(_) => {
                self.key_count.fetch_sub(1, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    /// Deletes each key in turn and returns how many were actually removed.
    pub fn delete_many(&self, keys: &[Bytes]) -> u64 {
        keys.iter().filter(|key| self.delete(key)).count() as u64
    }

    /// Checks if a key exists (and is not expired).
    pub fn exists(&self, key: &Bytes) -> bool {
        self.shard(key)
            .read()
            .get(key)
            .is_some_and(|e| !e.is_expired())
    }

    /// Returns the number of physically stored keys.
    ///
    /// Expired entries count until they are read or swept.
    pub fn len(&self) -> u64 {
        self.key_count.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> StorageStats {
        StorageStats {
            keys: self.key_count.load(Ordering::Relaxed),
            get_ops: self.get_count.load(Ordering::Relaxed),
            set_ops: self.set_count.load(Ordering::Relaxed),
            del_ops: self.del_count.load(Ordering::Relaxed),
            expired: self.expired_count.load(Ordering::Relaxed),
        }
    }

    /// Removes every expired entry from all shards.
    ///
    /// Called by the background sweeper. Returns the number of keys removed.
    pub fn cleanup_expired(&self) -> u64 {
        let mut cleaned = 0u64;

        for shard in &self.shards {
            let mut data = shard.write();
            let now = Instant::now();
            let before = data.len();
            data.retain(|_, entry| !entry.is_expired_at(now));
            cleaned += (before - data.len()) as u64;
        }

        if cleaned > 0 {
            self.record_expired(cleaned);
        }

        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn key(s: &str) -> Bytes {
        Bytes::from(s.to_string())
    }

    #[test]
    fn test_set_and_get() {
        let engine = StorageEngine::new();

        engine.set(key("key"), key("value"));
        assert_eq!(engine.get(&key("key")), Some(key("value")));

        engine.set(key("key"), key("other"));
        assert_eq!(engine.get(&key("key")), Some(key("other")));
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn test_get_nonexistent() {
        let engine = StorageEngine::new();
        assert_eq!(engine.get(&key("nonexistent")), None);
    }

    #[test]
    fn test_delete() {
        let engine = StorageEngine::new();

        engine.set(key("key"), key("value"));
        assert!(engine.delete(&key("key")));
        assert_eq!(engine.get(&key("key")), None);
        assert!(!engine.delete(&key("key")));
        assert!(engine.is_empty());
    }

    #[test]
    fn test_delete_many_counts_only_removed() {
        let engine = StorageEngine::new();

        engine.set(key("a"), key("1"));
        engine.set(key("c"), key("3"));

        assert_eq!(engine.delete_many(&[key("a"), key("b"), key("c"), key("a")]), 2);
        assert!(engine.is_empty());
    }

    #[test]
    fn test_set_if_absent() {
        let engine = StorageEngine::new();

        assert!(engine.set_if_absent(key("k"), key("v1"), None));
        assert!(!engine.set_if_absent(key("k"), key("v2"), None));
        assert_eq!(engine.get(&key("k")), Some(key("v1")));
    }

    #[test]
    fn test_set_if_present() {
        let engine = StorageEngine::new();

        assert!(!engine.set_if_present(key("k"), key("v1"), None));
        assert!(!engine.exists(&key("k")));

        engine.set(key("k"), key("v1"));
        assert!(engine.set_if_present(key("k"), key("v2"), None));
        assert_eq!(engine.get(&key("k")), Some(key("v2")));
    }

    #[test]
    fn test_expiry_is_lazy_on_read() {
        let engine = StorageEngine::new();

        engine.set_with_ttl(key("key"), key("value"), Duration::from_millis(50));
        assert_eq!(engine.get(&key("key")), Some(key("value")));

        thread::sleep(Duration::from_millis(100));

        // Still stored, but invisible
        assert_eq!(engine.len(), 1);
        assert!(!engine.exists(&key("key")));
        assert_eq!(engine.get(&key("key")), None);
        assert_eq!(engine.len(), 0);
        assert_eq!(engine.stats().expired, 1);
    }

    #[test]
    fn test_expired_key_counts_as_absent_for_conditional_writes() {
        let engine = StorageEngine::new();

        engine.set_with_ttl(key("k"), key("old"), Duration::from_millis(20));
        thread::sleep(Duration::from_millis(50));

        assert!(!engine.set_if_present(key("k"), key("new"), None));
        assert!(engine.set_if_absent(key("k"), key("new"), None));
        assert_eq!(engine.get(&key("k")), Some(key("new")));
        assert_eq!(engine.len(), 1);
    }

    #[test]
    fn test_delete_expired_key_reports_absent() {
        let engine = StorageEngine::new();

        engine.set_with_ttl(key("k"), key("v"), Duration::from_millis(20));
        thread::sleep(Duration::from_millis(50));

        assert!(!engine.delete(&key("k")));
        assert!(engine.is_empty());
    }

    #[test]
    fn test_overwrite_clears_ttl() {
        let engine = StorageEngine::new();

        engine.set_with_ttl(key("k"), key("v1"), Duration::from_millis(30));
        engine.set(key("k"), key("v2"));
        thread::sleep(Duration::from_millis(60));

        assert_eq!(engine.get(&key("k")), Some(key("v2")));
        assert_eq!(engine.cleanup_expired(), 0);
    }

    #[test]
    fn test_unrepresentable_ttl_never_expires() {
        let engine = StorageEngine::new();

        engine.set_with_ttl(key("k"), key("v"), Duration::MAX);
        assert!(engine.set_if_present(key("k"), key("v2"), Some(Duration::MAX)));

        assert_eq!(engine.get(&key("k")), Some(key("v2")));
        assert_eq!(engine.cleanup_expired(), 0);
    }

    #[test]
    fn test_cleanup_expired() {
        let engine = StorageEngine::new();

        engine.set_with_ttl(key("key1"), key("v"), Duration::from_millis(10));
        engine.set_with_ttl(key("key2"), key("v"), Duration::from_millis(10));
        engine.set(key("key3"), key("v"));

        thread::sleep(Duration::from_millis(50));

        assert_eq!(engine.cleanup_expired(), 2);
        assert_eq!(engine.len(), 1);
        assert!(engine.exists(&key("key3")));
    }

    #[test]
    fn test_stats() {
        let engine = StorageEngine::new();

        engine.set(key("a"), key("1"));
        engine.get(&key("a"));
        engine.get(&key("b"));
        engine.delete(&key("a"));

        let stats = engine.stats();
        assert_eq!(stats.keys, 0);
        assert_eq!(stats.set_ops, 1);
        assert_eq!(stats.get_ops, 2);
        assert_eq!(stats.del_ops, 1);
    }

    #[test]
    fn test_concurrent_access() {
        let engine = Arc::new(StorageEngine::new());
        let mut handles = vec![];

        for i in 0..10 {
            let engine = Arc::clone(&engine);
            handles.push(thread::spawn(move || {
                for j in 0..100 {
                    let k = key(&format!("key-{}-{}", i, j));
                    engine.set(k.clone(), key(&format!("value-{}", j)));
                    assert_eq!(engine.get(&k), Some(key(&format!("value-{}", j))));
                    if j % 2 == 0 {
                        assert!(engine.delete(&k));
                        assert_eq!(engine.get(&k), None);
                    }
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(engine.len(), 500);
    }
}

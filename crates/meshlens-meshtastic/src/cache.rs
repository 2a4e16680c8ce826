//! Duplicate packet suppression
//!
//! A packet heard by several gateways reaches the pipeline once per
//! gateway. The cache remembers `(sender, packet_id)` pairs for a TTL so
//! repeats can be dropped before they are stored twice.
//!
//! Entries leave the cache either by LRU eviction when it is full or by
//! TTL expiry, checked lazily on lookup and in bulk by
//! [`DeduplicationCache::expire_old_entries`].

use lru::LruCache;
use parking_lot::Mutex;
use std::fmt;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::config::{DecoderConfig, DEFAULT_DEDUP_CACHE_SIZE, DEFAULT_DEDUP_TTL};

/// Identity of one radio packet
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct PacketKey {
    /// Sender node number
    pub from: u32,
    /// Packet identifier
    pub packet_id: u32,
}

impl PacketKey {
    pub fn new(from: u32, packet_id: u32) -> Self {
        Self { from, packet_id }
    }
}

impl fmt::Display for PacketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "!{:08x}:{:08x}", self.from, self.packet_id)
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    first_seen: Instant,
    seen_count: u32,
}

/// Cache statistics for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Total packets checked
    pub total_checks: u64,
    /// Packets that were duplicates
    pub duplicates_blocked: u64,
    /// Packets seen for the first time
    pub new_packets: u64,
    /// Entries expired by TTL
    pub ttl_expirations: u64,
    /// Entries evicted by LRU
    pub lru_evictions: u64,
}

impl CacheStats {
    /// Get the duplicate rate (0.0 to 1.0)
    pub fn duplicate_rate(&self) -> f64 {
        if self.total_checks == 0 {
            0.0
        } else {
            self.duplicates_blocked as f64 / self.total_checks as f64
        }
    }
}

struct Inner {
    entries: LruCache<PacketKey, CacheEntry>,
    stats: CacheStats,
}

/// LRU-based deduplication cache with TTL expiration
pub struct DeduplicationCache {
    inner: Mutex<Inner>,
    ttl: Duration,
}

impl fmt::Debug for DeduplicationCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeduplicationCache")
            .field("len", &self.len())
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl Default for DeduplicationCache {
    fn default() -> Self {
        Self::with_capacity_and_ttl(DEFAULT_DEDUP_CACHE_SIZE, DEFAULT_DEDUP_TTL)
    }
}

impl DeduplicationCache {
    /// Create from decoder configuration
    pub fn from_config(config: &DecoderConfig) -> Self {
        Self::with_capacity_and_ttl(config.dedup_cache_size, config.dedup_ttl)
    }

    /// Create with custom capacity and TTL
    ///
    /// A zero capacity is raised to one.
    pub fn with_capacity_and_ttl(capacity: usize, ttl: Duration) -> Self {
        let cap = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(cap),
                stats: CacheStats::default(),
            }),
            ttl,
        }
    }

    /// Check a packet and record it
    ///
    /// Returns `true` if the packet was already seen within the TTL.
    pub fn check_and_record(&self, key: PacketKey) -> bool {
        let now = Instant::now();
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.stats.total_checks += 1;

        if let Some(entry) = inner.entries.get_mut(&key) {
            if now.duration_since(entry.first_seen) > self.ttl {
                trace!(key = %key, "Cache entry expired, treating as new");
                entry.first_seen = now;
                entry.seen_count = 1;
                inner.stats.ttl_expirations += 1;
                inner.stats.new_packets += 1;
                return false;
            }

            entry.seen_count += 1;
            let seen_count = entry.seen_count;
            inner.stats.duplicates_blocked += 1;
            debug!(key = %key, seen_count = seen_count, "Duplicate packet");
            return true;
        }

        let evicted = inner.entries.push(
            key,
            CacheEntry {
                first_seen: now,
                seen_count: 1,
            },
        );
        if evicted.is_some() {
            inner.stats.lru_evictions += 1;
        }
        inner.stats.new_packets += 1;
        false
    }

    /// Check a packet by sender and id
    pub fn is_duplicate(&self, from: u32, packet_id: u32) -> bool {
        self.check_and_record(PacketKey::new(from, packet_id))
    }

    /// How many times a packet has been seen, if it is cached
    pub fn seen_count(&self, key: &PacketKey) -> Option<u32> {
        self.inner.lock().entries.peek(key).map(|e| e.seen_count)
    }

    /// Remove entries older than the TTL
    ///
    /// Returns the number of entries removed.
    pub fn expire_old_entries(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let expired: Vec<PacketKey> = inner
            .entries
            .iter()
            .filter(|(_, entry)| now.duration_since(entry.first_seen) > self.ttl)
            .map(|(key, _)| *key)
            .collect();
        for key in &expired {
            inner.entries.pop(key);
        }
        inner.stats.ttl_expirations += expired.len() as u64;
        expired.len()
    }

    /// Get the number of entries in the cache
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Check if the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats.clone()
    }

    /// Clear all cache entries
    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    /// Get the configured TTL
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Get the cache capacity
    pub fn capacity(&self) -> usize {
        self.inner.lock().entries.cap().get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_display() {
        assert_eq!(PacketKey::new(0xab, 1).to_string(), "!000000ab:00000001");
    }

    #[test]
    fn test_duplicate_detection() {
        let cache = DeduplicationCache::default();

        assert!(!cache.is_duplicate(0x1234_5678, 1));
        assert!(cache.is_duplicate(0x1234_5678, 1));
        assert!(cache.is_duplicate(0x1234_5678, 1));

        let stats = cache.stats();
        assert_eq!(stats.total_checks, 3);
        assert_eq!(stats.new_packets, 1);
        assert_eq!(stats.duplicates_blocked, 2);
        assert_eq!(cache.seen_count(&PacketKey::new(0x1234_5678, 1)), Some(3));
    }

    #[test]
    fn test_key_includes_sender() {
        let cache = DeduplicationCache::default();
        assert!(!cache.is_duplicate(1, 100));
        assert!(!cache.is_duplicate(2, 100));
        assert!(!cache.is_duplicate(1, 101));
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_lru_eviction() {
        let cache = DeduplicationCache::with_capacity_and_ttl(2, Duration::from_secs(60));
        cache.is_duplicate(1, 1);
        cache.is_duplicate(1, 2);
        cache.is_duplicate(1, 3);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().lru_evictions, 1);
        // Oldest entry was evicted, so it reads as new again
        assert!(!cache.is_duplicate(1, 1));
    }

    #[test]
    fn test_ttl_expiration() {
        let cache = DeduplicationCache::with_capacity_and_ttl(16, Duration::from_millis(10));
        assert!(!cache.is_duplicate(7, 7));
        std::thread::sleep(Duration::from_millis(25));
        assert!(!cache.is_duplicate(7, 7));
        assert_eq!(cache.stats().ttl_expirations, 1);
    }

    #[test]
    fn test_expire_old_entries() {
        let cache = DeduplicationCache::with_capacity_and_ttl(16, Duration::from_millis(10));
        cache.is_duplicate(1, 1);
        cache.is_duplicate(2, 2);
        std::thread::sleep(Duration::from_millis(25));

        assert_eq!(cache.expire_old_entries(), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_capacity_is_raised() {
        let cache = DeduplicationCache::with_capacity_and_ttl(0, Duration::from_secs(1));
        assert_eq!(cache.capacity(), 1);
    }
}

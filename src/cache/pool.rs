//! Byte-budgeted LRU pool
//!
//! `lru::LruCache` supplies the recency order; the pool adds byte
//! accounting on top. The cache is unbounded by count and bounded by
//! `budget` bytes.

use std::hash::Hash;

use lru::LruCache;

use super::stats::PoolStats;

/// Entry bookkeeping kept next to the cached value
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    pub value: V,
    pub size: usize,
    /// Access sequence of the last hit or insert
    pub last_access: u64,
}

/// Outcome of an insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Stored; `evicted` older entries were dropped to make room
    Stored { evicted: usize },
    /// Larger than the whole budget; not stored
    Rejected,
}

pub struct SizedLru<K: Hash + Eq, V> {
    entries: LruCache<K, CacheEntry<V>>,
    budget: usize,
    used: usize,
    sequence: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    rejected: u64,
}

impl<K: Hash + Eq, V: Clone> SizedLru<K, V> {
    pub fn new(budget: usize) -> Self {
        Self {
            entries: LruCache::unbounded(),
            budget,
            used: 0,
            sequence: 0,
            hits: 0,
            misses: 0,
            evictions: 0,
            rejected: 0,
        }
    }

    fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    /// Look up and bump recency
    pub fn get(&mut self, key: &K) -> Option<V> {
        let seq = self.next_sequence();
        match self.entries.get_mut(key) {
            Some(entry) => {
                entry.last_access = seq;
                self.hits += 1;
                Some(entry.value.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Look up without touching recency or counters
    pub fn peek(&self, key: &K) -> Option<&CacheEntry<V>> {
        self.entries.peek(key)
    }

    pub fn insert(&mut self, key: K, value: V, size: usize) -> Admission {
        if size > self.budget {
            self.rejected += 1;
            return Admission::Rejected;
        }

        if let Some(old) = self.entries.pop(&key) {
            self.used -= old.size;
        }

        let mut evicted = 0;
        while self.used + size > self.budget {
            match self.entries.pop_lru() {
                Some((_, old)) => {
                    self.used -= old.size;
                    evicted += 1;
                }
                None => break,
            }
        }
        self.evictions += evicted as u64;

        let seq = self.next_sequence();
        self.entries.put(
            key,
            CacheEntry {
                value,
                size,
                last_access: seq,
            },
        );
        self.used += size;

        Admission::Stored { evicted }
    }

    /// Evict LRU entries until at most `target` bytes remain
    pub fn shrink_to(&mut self, target: usize) -> usize {
        let mut evicted = 0;
        while self.used > target {
            match self.entries.pop_lru() {
                Some((_, old)) => {
                    self.used -= old.size;
                    evicted += 1;
                }
                None => break,
            }
        }
        self.evictions += evicted as u64;
        evicted
    }

    /// Key that would be evicted next
    pub fn peek_lru(&self) -> Option<&K> {
        self.entries.peek_lru().map(|(k, _)| k)
    }

    /// Drop everything and reset counters
    pub fn clear(&mut self) {
        self.entries.clear();
        self.used = 0;
        self.sequence = 0;
        self.hits = 0;
        self.misses = 0;
        self.evictions = 0;
        self.rejected = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            entries: self.entries.len(),
            bytes_used: self.used,
            budget: self.budget,
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            rejected: self.rejected,
        }
    }
}

//! Cache statistics snapshots

use serde::Serialize;

/// Counters for one pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    /// Entries currently stored
    pub entries: usize,
    /// Bytes currently accounted
    pub bytes_used: usize,
    /// Byte budget
    pub budget: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Inserts refused because the entry exceeded the whole budget
    pub rejected: u64,
}

impl PoolStats {
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }

    /// Hits / lookups (0.0 when nothing was looked up)
    pub fn hit_rate(&self) -> f64 {
        match self.lookups() {
            0 => 0.0,
            n => self.hits as f64 / n as f64,
        }
    }

    /// Misses / lookups (0.0 when nothing was looked up)
    pub fn miss_rate(&self) -> f64 {
        match self.lookups() {
            0 => 0.0,
            n => self.misses as f64 / n as f64,
        }
    }
}

/// Snapshot of both pools
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub pages: PoolStats,
    pub thumbnails: PoolStats,
}

impl CacheStats {
    pub fn pool_size(&self) -> usize {
        self.pages.entries + self.thumbnails.entries
    }

    /// Hit rate across both pools
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.pages.lookups() + self.thumbnails.lookups();
        if lookups == 0 {
            return 0.0;
        }
        (self.pages.hits + self.thumbnails.hits) as f64 / lookups as f64
    }

    /// Miss rate across both pools
    pub fn miss_rate(&self) -> f64 {
        let lookups = self.pages.lookups() + self.thumbnails.lookups();
        if lookups == 0 {
            return 0.0;
        }
        (self.pages.misses + self.thumbnails.misses) as f64 / lookups as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rates_without_lookups() {
        let stats = CacheStats::default();
        assert_eq!(stats.hit_rate(), 0.0);
        assert_eq!(stats.miss_rate(), 0.0);
    }

    #[test]
    fn test_rates() {
        let stats = CacheStats {
            pages: PoolStats {
                hits: 3,
                misses: 1,
                ..Default::default()
            },
            thumbnails: PoolStats {
                hits: 0,
                misses: 4,
                ..Default::default()
            },
        };
        assert_eq!(stats.pages.hit_rate(), 0.75);
        assert_eq!(stats.thumbnails.miss_rate(), 1.0);
        assert_eq!(stats.hit_rate(), 3.0 / 8.0);
        assert_eq!(stats.miss_rate(), 5.0 / 8.0);
    }
}

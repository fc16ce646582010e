//! Pool statistics.

/// Aggregated statistics for a `BlockPool`.
#[derive(Debug, Clone, Default)]
pub struct BlockPoolStats {
    /// Total number of rent calls.
    pub rents: u64,

    /// Rents satisfied from the free queue.
    pub reuses: u64,

    /// Rents satisfied by a fresh allocation.
    pub fresh_allocations: u64,

    /// Blocks discarded because the free queue was full.
    pub discards: u64,

    /// Blocks currently rented out.
    pub outstanding: u64,

    /// Blocks currently waiting in the free queue.
    pub free_len: usize,

    /// Capacity of the free queue.
    pub capacity: usize,
}

impl BlockPoolStats {
    /// Fraction of rents served from the free queue.
    pub fn reuse_ratio(&self) -> f64 {
        if self.rents == 0 {
            return 0.0;
        }
        self.reuses as f64 / self.rents as f64
    }
}

impl std::fmt::Display for BlockPoolStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "rents: {} (reused {}, fresh {}), discards: {}, outstanding: {}, free: {}/{}",
            self.rents,
            self.reuses,
            self.fresh_allocations,
            self.discards,
            self.outstanding,
            self.free_len,
            self.capacity
        )
    }
}

/// Aggregated statistics for a `StringPool`.
#[derive(Debug, Clone, Default)]
pub struct StringPoolStats {
    /// Total number of rent calls.
    pub rents: u64,

    /// Rents satisfied by first-fit reuse.
    pub reuses: u64,

    /// Rents satisfied by a fresh allocation.
    pub fresh_allocations: u64,

    /// Rents that failed because allocation failed.
    pub failed_allocations: u64,

    /// Strings currently rented out.
    pub outstanding: u64,

    /// Slots currently waiting in the free list.
    pub free_len: usize,
}

impl StringPoolStats {
    /// Fraction of successful rents served from the free list.
    pub fn reuse_ratio(&self) -> f64 {
        let served = self.reuses + self.fresh_allocations;
        if served == 0 {
            return 0.0;
        }
        self.reuses as f64 / served as f64
    }
}

impl std::fmt::Display for StringPoolStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "rents: {} (reused {}, fresh {}, failed {}), outstanding: {}, free slots: {}",
            self.rents,
            self.reuses,
            self.fresh_allocations,
            self.failed_allocations,
            self.outstanding,
            self.free_len
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reuse_ratio_empty() {
        assert_eq!(BlockPoolStats::default().reuse_ratio(), 0.0);
        assert_eq!(StringPoolStats::default().reuse_ratio(), 0.0);
    }

    #[test]
    fn test_reuse_ratio() {
        let stats = BlockPoolStats {
            rents: 4,
            reuses: 3,
            fresh_allocations: 1,
            ..Default::default()
        };
        assert_eq!(stats.reuse_ratio(), 0.75);
    }
}

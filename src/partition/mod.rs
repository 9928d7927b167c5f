//! Work partitioning
//!
//! Splits the matching record count into `worker_count` contiguous
//! `skip`/`limit` ranges over a stable sort order. The count is taken once per
//! export; records inserted or removed afterwards may be missed or read twice.

use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

/// Contiguous range of matching records assigned to one worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Partition {
    pub index: usize,
    pub skip: u64,
    pub limit: u64,
}

impl Partition {
    pub fn new(index: usize, skip: u64, limit: u64) -> Self {
        Self { index, skip, limit }
    }

    /// Whether this partition is known to yield no rows.
    pub fn is_empty(&self) -> bool {
        self.limit == 0
    }

    /// One past the last record position covered.
    pub fn end(&self) -> u64 {
        self.skip + self.limit
    }
}

/// Split `total` records into exactly `workers` partitions.
///
/// With at least one record per worker each partition gets `total / workers`
/// records and the final one absorbs the remainder. With fewer records than
/// workers the leading partitions get one record each and the rest are empty.
pub fn partition(total: u64, workers: NonZeroUsize) -> Vec<Partition> {
    let n = workers.get();
    let count = n as u64;

    if total < count {
        return (0..n)
            .map(|i| {
                let position = i as u64;
                if position < total {
                    Partition::new(i, position, 1)
                } else {
                    Partition::new(i, total, 0)
                }
            })
            .collect();
    }

    let size = total / count;
    (0..n)
        .map(|i| {
            let skip = i as u64 * size;
            let limit = if i == n - 1 { total - skip } else { size };
            Partition::new(i, skip, limit)
        })
        .collect()
}

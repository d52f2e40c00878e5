//! Hash segments, the queue entries built from them, and per-bucket counts

use serde::{Deserialize, Serialize};

/// Rows whose join-key hash satisfies `hash mod modulus == bucket`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HashSegment {
    pub modulus: u64,
    pub bucket: u64,
    pub depth: u32,
}

impl HashSegment {
    /// The segment holding every row
    pub fn root() -> Self {
        Self {
            modulus: 1,
            bucket: 0,
            depth: 0,
        }
    }

    /// Split into `split_factor` children that exactly partition this segment.
    ///
    /// A row with `h mod m == b` has `h mod (m*k) == b + i*m` for exactly one
    /// `i` in `0..k`, so the children cover the parent with no overlap.
    pub fn children(&self, split_factor: u64) -> Vec<HashSegment> {
        let modulus = self.modulus * split_factor;
        (0..split_factor)
            .map(|i| HashSegment {
                modulus,
                bucket: self.bucket + i * self.modulus,
                depth: self.depth + 1,
            })
            .collect()
    }
}

impl std::fmt::Display for HashSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}@{}", self.bucket, self.modulus, self.depth)
    }
}

/// Children per split for one over-threshold segment.
///
/// Segments only modestly over the threshold fan out less than the global
/// factor. A skewed hash distribution can still leave children above the
/// threshold; the depth ceiling is what guarantees termination.
pub fn local_split_factor(max_count: u64, row_threshold: u64, global_split_factor: u64) -> u64 {
    let wanted = max_count.div_ceil(row_threshold.max(1)).max(2);
    let local = global_split_factor.min(wanted);
    if local <= 1 {
        global_split_factor
    } else {
        local
    }
}

/// Segment waiting in the scheduler queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueEntry {
    /// Freshly split child whose counts have not been derived yet
    Pending {
        segment: HashSegment,
        estimated_size: u64,
    },
    /// Segment with exact row counts on both sides
    Sized {
        segment: HashSegment,
        count_a: u64,
        count_b: u64,
    },
}

impl QueueEntry {
    pub fn pending(segment: HashSegment, estimated_size: u64) -> Self {
        QueueEntry::Pending {
            segment,
            estimated_size,
        }
    }

    pub fn sized(segment: HashSegment, count_a: u64, count_b: u64) -> Self {
        QueueEntry::Sized {
            segment,
            count_a,
            count_b,
        }
    }

    pub fn segment(&self) -> HashSegment {
        match self {
            QueueEntry::Pending { segment, .. } | QueueEntry::Sized { segment, .. } => *segment,
        }
    }

    /// Exact counts once known
    pub fn counts(&self) -> Option<(u64, u64)> {
        match self {
            QueueEntry::Pending { .. } => None,
            QueueEntry::Sized {
                count_a, count_b, ..
            } => Some((*count_a, *count_b)),
        }
    }

    /// Size used for ordering: the larger side once known, else the estimate
    pub fn priority_size(&self) -> u64 {
        match self {
            QueueEntry::Pending { estimated_size, .. } => *estimated_size,
            QueueEntry::Sized {
                count_a, count_b, ..
            } => (*count_a).max(*count_b),
        }
    }

    /// Bigger first; among equals, shallower first
    pub fn is_higher_priority(a: &QueueEntry, b: &QueueEntry) -> bool {
        let (size_a, size_b) = (a.priority_size(), b.priority_size());
        if size_a != size_b {
            return size_a > size_b;
        }
        a.segment().depth < b.segment().depth
    }
}

/// Exact per-bucket row counts of one source at the finest modulus of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketCounts {
    pub modulus: u64,
    pub counts: Vec<u64>,
}

impl BucketCounts {
    pub fn new(modulus: u64, counts: Vec<u64>) -> Self {
        Self { modulus, counts }
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Row count of a coarser segment, summed from the fine buckets.
    ///
    /// Only defined when the segment's modulus divides the fine modulus;
    /// otherwise the fine buckets straddle the segment and `None` is returned.
    pub fn segment_count(&self, segment: &HashSegment) -> Option<u64> {
        let fine = self.counts.len() as u64;
        if segment.modulus == 0 || fine == 0 || fine % segment.modulus != 0 {
            return None;
        }
        if segment.bucket >= segment.modulus {
            return None;
        }
        let step = segment.modulus as usize;
        Some(
            self.counts
                .iter()
                .skip(segment.bucket as usize)
                .step_by(step)
                .sum(),
        )
    }
}

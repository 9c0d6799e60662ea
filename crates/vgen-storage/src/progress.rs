//! Monotonic transfer progress tracking.

/// Tracks bytes sent against a total and decides when a progress fraction
/// should be emitted.
///
/// Emission rules:
/// - fractions are strictly increasing and bounded in [0, 1]
/// - the same fraction is never emitted twice
/// - intermediate fractions are emitted only at chunk boundaries, so a
///   flood of small stream pieces does not spam the callback
/// - with an unknown total, nothing is emitted until [`finish`](Self::finish)
///
/// The tracker survives transfer retries: [`resume`](Self::resume) rewinds
/// the byte count to the last acknowledged offset while keeping the
/// high-water mark, so a resumed attempt can never report progress going
/// backwards.
#[derive(Debug)]
pub struct ProgressTracker {
    total: Option<u64>,
    chunk_size: u64,
    sent: u64,
    next_boundary: u64,
    last_fraction: f64,
}

impl ProgressTracker {
    /// Create a tracker for `total` bytes (if known), emitting at
    /// `chunk_size`-byte boundaries.
    pub fn new(total: Option<u64>, chunk_size: u64) -> Self {
        assert!(chunk_size > 0);
        Self {
            total,
            chunk_size,
            sent: 0,
            next_boundary: chunk_size,
            last_fraction: 0.0,
        }
    }

    /// Rewind to `offset` for a resumed attempt; `total` may be refined
    /// once the source reports its length.
    pub fn resume(&mut self, offset: u64, total: Option<u64>) {
        self.sent = offset;
        self.next_boundary = (offset / self.chunk_size + 1) * self.chunk_size;
        if total.is_some() {
            self.total = total;
        }
    }

    /// Record `n` more bytes. Returns a fraction to report, or `None`.
    pub fn advance(&mut self, n: u64) -> Option<f64> {
        self.sent += n;

        let total = self.total?;
        if total == 0 {
            return None;
        }

        let at_end = self.sent >= total;
        if self.sent < self.next_boundary && !at_end {
            return None;
        }
        while self.next_boundary <= self.sent {
            self.next_boundary += self.chunk_size;
        }

        let fraction = (self.sent as f64 / total as f64).min(1.0);
        if fraction > self.last_fraction {
            self.last_fraction = fraction;
            Some(fraction)
        } else {
            None
        }
    }

    /// Mark the transfer complete. Returns `1.0` if it was not already
    /// reported.
    pub fn finish(&mut self) -> Option<f64> {
        if self.last_fraction < 1.0 {
            self.last_fraction = 1.0;
            Some(1.0)
        } else {
            None
        }
    }

    /// Bytes recorded so far.
    pub fn sent(&self) -> u64 {
        self.sent
    }
}

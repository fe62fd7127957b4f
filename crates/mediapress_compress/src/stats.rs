//! Run statistics shared between the coordinator and the workers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters updated concurrently during a run.
#[derive(Debug, Default)]
pub struct RunStats {
    processed: AtomicU64,
    skipped_cached: AtomicU64,
    errors: AtomicU64,
    bytes_before: AtomicU64,
    bytes_after: AtomicU64,
}

impl RunStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a freshly compressed file.
    pub fn record_processed(&self, before: u64, after: u64) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.add_bytes(before, after);
    }

    /// Records a file served from the cache.
    pub fn record_cached(&self, before: u64, after: u64) {
        self.skipped_cached.fetch_add(1, Ordering::Relaxed);
        self.add_bytes(before, after);
    }

    /// Records a file that failed and was passed through.
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    fn add_bytes(&self, before: u64, after: u64) {
        self.bytes_before.fetch_add(before, Ordering::Relaxed);
        self.bytes_after.fetch_add(after, Ordering::Relaxed);
    }

    /// Reads the counters.
    ///
    /// Only meaningful once every worker has finished.
    pub fn summary(&self) -> StatsSummary {
        StatsSummary {
            processed: self.processed.load(Ordering::Relaxed),
            skipped_cached: self.skipped_cached.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            bytes_before: self.bytes_before.load(Ordering::Relaxed),
            bytes_after: self.bytes_after.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`RunStats`].
///
/// Byte totals cover processed and cache-served files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSummary {
    /// Files compressed during this run.
    pub processed: u64,
    /// Files served from the cache.
    pub skipped_cached: u64,
    /// Files that failed and were left uncompressed.
    pub errors: u64,
    /// Original bytes of processed and cached files.
    pub bytes_before: u64,
    /// Compressed bytes of processed and cached files.
    pub bytes_after: u64,
}

impl fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} processed, {} skipped (cached), {} errors",
            self.processed, self.skipped_cached, self.errors
        )
    }
}

/// Formats the per-file line logged after a successful compression.
pub fn reduction_line(name: &str, before: u64, after: u64) -> String {
    format!(
        "{name}: {} → {} bytes ({:.1}% reduction)",
        group_thousands(before),
        group_thousands(after),
        reduction_percent(before, after)
    )
}

/// Size saved as a percentage of the original; negative when the output grew.
pub fn reduction_percent(before: u64, after: u64) -> f64 {
    if before == 0 {
        return 0.0;
    }
    (1.0 - after as f64 / before as f64) * 100.0
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

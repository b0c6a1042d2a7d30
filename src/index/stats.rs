//! Fill-rate statistics
//!
//! Summaries over block fill counts, shared by `HashIndex::stats`, the
//! `IndexFull` diagnostics and snapshot inspection.

use std::fmt;

/// Labels of the fill-rate histogram buckets
pub const FILL_BUCKET_LABELS: [&str; 6] = ["empty", "1-25%", "26-50%", "51-75%", "76-99%", "full"];

/// Block and record counts plus a fill-rate histogram
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexStats {
    pub index_size: usize,
    pub block_count: usize,
    pub records_per_block: usize,
    pub record_count: usize,
    /// Blocks per fill-rate bucket, see [`FILL_BUCKET_LABELS`]
    pub fill_histogram: [usize; 6],
}

impl IndexStats {
    pub fn from_fill_counts<I>(index_size: usize, records_per_block: usize, fill_counts: I) -> Self
    where
        I: IntoIterator<Item = usize>,
    {
        let mut stats = Self {
            index_size,
            block_count: 0,
            records_per_block,
            record_count: 0,
            fill_histogram: [0; 6],
        };

        for fill in fill_counts {
            stats.block_count += 1;
            stats.record_count += fill;
            stats.fill_histogram[fill_bucket(fill, records_per_block)] += 1;
        }

        stats
    }

    /// Live records over total record capacity
    pub fn load_factor(&self) -> f64 {
        let capacity = self.block_count * self.records_per_block;
        if capacity == 0 {
            0.0
        } else {
            self.record_count as f64 / capacity as f64
        }
    }
}

fn fill_bucket(fill: usize, capacity: usize) -> usize {
    if fill == 0 {
        return 0;
    }
    if fill >= capacity {
        return 5;
    }
    let percent = fill * 100 / capacity;
    match percent {
        0..=25 => 1,
        26..=50 => 2,
        51..=75 => 3,
        _ => 4,
    }
}

impl fmt::Display for IndexStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "index size: {}, blocks: {}, records: {}, load factor: {:.2}",
            self.index_size,
            self.block_count,
            self.record_count,
            self.load_factor()
        )?;
        write!(f, "block fill:")?;
        for (label, count) in FILL_BUCKET_LABELS.iter().zip(self.fill_histogram.iter()) {
            write!(f, " [{}: {}]", label, count)?;
        }
        Ok(())
    }
}

//! Bucket means on a fixed cadence.
//!
//! Timestamps are UTC epoch seconds. A bucket starts at
//! `ts - ts.rem_euclid(period)`, so quarter-hour buckets line up with local
//! quarter-hours in every zone with whole-hour offsets.

use std::collections::{BTreeMap, BTreeSet};

/// Quarter-hour cadence in seconds.
pub const QUARTER_HOUR: i64 = 900;

#[derive(Debug, Clone, Copy, Default)]
pub struct BucketStats {
    pub count: usize,
    pub sum: f64,
}

impl BucketStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

pub fn floor_bucket(ts: i64, period: i64) -> i64 {
    ts - ts.rem_euclid(period)
}

/// Per-column bucket means of one source. Columns are canonical names.
#[derive(Debug, Clone, Default)]
pub struct BucketFrame {
    period: i64,
    cells: BTreeMap<i64, BTreeMap<&'static str, BucketStats>>,
    /// Every bucket between the first and the last observation
    span: Option<(i64, i64)>,
}

impl BucketFrame {
    pub fn new(period: i64) -> Self {
        Self {
            period,
            cells: BTreeMap::new(),
            span: None,
        }
    }

    pub fn quarter_hourly() -> Self {
        Self::new(QUARTER_HOUR)
    }

    /// Extend the span to cover `ts` without recording a value.
    pub fn touch(&mut self, ts: i64) -> i64 {
        let bucket = floor_bucket(ts, self.period);
        self.span = Some(match self.span {
            Some((lo, hi)) => (lo.min(bucket), hi.max(bucket)),
            None => (bucket, bucket),
        });
        bucket
    }

    /// Record an observation. A missing value still extends the span.
    pub fn push(&mut self, ts: i64, column: &'static str, value: Option<f64>) {
        let bucket = self.touch(ts);
        if let Some(value) = value.filter(|v| v.is_finite()) {
            self.cells
                .entry(bucket)
                .or_default()
                .entry(column)
                .or_default()
                .push(value);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.span.is_none()
    }

    pub fn span(&self) -> Option<(i64, i64)> {
        self.span
    }

    pub fn mean(&self, bucket: i64, column: &str) -> Option<f64> {
        self.cells.get(&bucket)?.get(column)?.mean()
    }

    /// Iterate `(bucket, column, mean)` over non-empty cells.
    pub fn means(&self) -> impl Iterator<Item = (i64, &'static str, f64)> + '_ {
        self.cells.iter().flat_map(|(bucket, row)| {
            row.iter()
                .filter_map(move |(col, stats)| stats.mean().map(|m| (*bucket, *col, m)))
        })
    }
}

/// Concatenate several bucket frames and average coinciding cells.
///
/// Equivalent to stacking the per-file frames and grouping by timestamp
/// with a mean that skips missing values. The span is the union of spans.
pub fn merge_mean(frames: &[BucketFrame]) -> BucketFrame {
    let period = frames.first().map(|f| f.period).unwrap_or(QUARTER_HOUR);
    let mut merged = BucketFrame::new(period);
    for frame in frames {
        for (bucket, column, mean) in frame.means() {
            merged
                .cells
                .entry(bucket)
                .or_default()
                .entry(column)
                .or_default()
                .push(mean);
        }
    }
    merged.span = frames
        .iter()
        .filter_map(|f| f.span)
        .reduce(|(a, b), (c, d)| (a.min(c), b.max(d)));
    merged
}

/// Buckets covered by at least one frame's `[first, last]` span.
pub fn covered_buckets(frames: &[&BucketFrame], period: i64) -> Vec<i64> {
    let mut set = BTreeSet::new();
    for frame in frames {
        if let Some((lo, hi)) = frame.span {
            let mut t = lo;
            while t <= hi {
                set.insert(t);
                t += period;
            }
        }
    }
    set.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn floor_bucket_handles_negative_timestamps() {
        assert_eq!(floor_bucket(901, 900), 900);
        assert_eq!(floor_bucket(-1, 900), -900);
    }

    #[test]
    fn bucket_mean_skips_missing_values() {
        let mut frame = BucketFrame::quarter_hourly();
        frame.push(0, "a", Some(1.0));
        frame.push(300, "a", Some(3.0));
        frame.push(600, "a", None);
        frame.push(2700, "a", Some(f64::NAN));
        assert_eq!(frame.mean(0, "a"), Some(2.0));
        assert_eq!(frame.mean(2700, "a"), None);
        assert_eq!(frame.span(), Some((0, 2700)));
    }

    #[test]
    fn merge_averages_coinciding_cells() {
        let mut a = BucketFrame::quarter_hourly();
        a.push(0, "x", Some(10.0));
        a.push(900, "x", Some(10.0));
        let mut b = BucketFrame::quarter_hourly();
        b.push(900, "x", Some(20.0));
        b.push(1800, "y", Some(5.0));

        let merged = merge_mean(&[a, b]);
        assert_eq!(merged.mean(0, "x"), Some(10.0));
        assert_eq!(merged.mean(900, "x"), Some(15.0));
        assert_eq!(merged.mean(1800, "y"), Some(5.0));
        assert_eq!(merged.span(), Some((0, 1800)));
    }

    #[test]
    fn covered_buckets_fill_gaps_inside_each_span() {
        let mut a = BucketFrame::quarter_hourly();
        a.push(0, "x", Some(1.0));
        a.push(2700, "x", Some(1.0));
        let mut b = BucketFrame::quarter_hourly();
        b.push(9000, "x", Some(1.0));
        let buckets = covered_buckets(&[&a, &b], 900);
        assert_eq!(buckets, vec![0, 900, 1800, 2700, 9000]);
    }
}

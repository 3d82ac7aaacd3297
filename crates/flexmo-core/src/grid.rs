//! Time and block grids.
//!
//! Every price, volume, activation and dispatch series is indexed by a
//! [`TimeGrid`]. Reserve bids are indexed by a [`BlockGrid`] that groups
//! consecutive intervals by position:
//!
//! ```text
//!   interval  0 1 2 ... 15 | 16 17 ... 31 | 32 33
//!   block     0 0 0 ...  0 |  1  1 ...  1 |  2  2   (last block may be short)
//! ```

use std::ops::Range;

use chrono::{Duration, NaiveDateTime};

use crate::{FlexError, FlexResult};

/// Default interval length: one quarter-hour.
pub const DEFAULT_DT_HOURS: f64 = 0.25;

/// Default reserve product length in intervals (4 h of quarter-hours).
pub const DEFAULT_BLOCK_SIZE: usize = 16;

/// Ordered timestamps with a constant interval length in hours.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeGrid {
    timestamps: Vec<NaiveDateTime>,
    dt_hours: f64,
}

impl TimeGrid {
    /// Validate a time index. Timestamps must be strictly increasing.
    pub fn new(timestamps: Vec<NaiveDateTime>, dt_hours: f64) -> FlexResult<Self> {
        if !(dt_hours.is_finite() && dt_hours > 0.0) {
            return Err(FlexError::BadInput(format!(
                "interval length must be positive, got {dt_hours}"
            )));
        }
        if let Some(pos) = timestamps.windows(2).position(|w| w[1] <= w[0]) {
            return Err(FlexError::BadInput(format!(
                "time index is not strictly increasing at position {}: {} then {}",
                pos + 1,
                timestamps[pos],
                timestamps[pos + 1]
            )));
        }
        Ok(Self {
            timestamps,
            dt_hours,
        })
    }

    /// A regular grid of `len` intervals starting at `start`.
    pub fn regular(start: NaiveDateTime, len: usize, dt_hours: f64) -> FlexResult<Self> {
        let step = Duration::seconds((dt_hours * 3600.0).round() as i64);
        let timestamps = (0..len as i32).map(|i| start + step * i).collect();
        Self::new(timestamps, dt_hours)
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn dt_hours(&self) -> f64 {
        self.dt_hours
    }

    pub fn timestamps(&self) -> &[NaiveDateTime] {
        &self.timestamps
    }
}

/// Partition of `0..len` into contiguous blocks of `block_size` intervals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockGrid {
    block_size: usize,
    t_to_block: Vec<usize>,
}

impl BlockGrid {
    pub fn new(len: usize, block_size: usize) -> FlexResult<Self> {
        if block_size == 0 {
            return Err(FlexError::BadInput("block size must be at least 1".into()));
        }
        Ok(Self {
            block_size,
            t_to_block: (0..len).map(|i| i / block_size).collect(),
        })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn num_blocks(&self) -> usize {
        self.t_to_block.len().div_ceil(self.block_size)
    }

    pub fn num_intervals(&self) -> usize {
        self.t_to_block.len()
    }

    #[inline]
    pub fn block_of(&self, t: usize) -> usize {
        self.t_to_block[t]
    }

    /// Interval-to-block mapping by position.
    pub fn t_to_block(&self) -> &[usize] {
        &self.t_to_block
    }

    /// Interval positions belonging to block `b`.
    pub fn intervals(&self, b: usize) -> Range<usize> {
        let start = (b * self.block_size).min(self.t_to_block.len());
        let end = ((b + 1) * self.block_size).min(self.t_to_block.len());
        start..end
    }
}

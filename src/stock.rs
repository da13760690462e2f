//! Columnar store for one symbol at one timeframe.

use std::collections::HashMap;

use crate::candle::Candle;
use crate::column::Column;
use crate::error::{EngineError, Result};
use crate::timeframe::Timeframe;

/// A struct-of-arrays candle store for a single symbol at a single timeframe.
///
/// Rows are ordered strictly ascending by timestamp. Dense numeric columns
/// keep the hot fields (`close`, `timestamp`) contiguous for the tight
/// lookback loop, and avoid a heap-allocated `Candle` per row until the
/// strategy actually reads one.
#[derive(Debug, Clone)]
pub struct Stock {
    open: Column<f64>,
    high: Column<f64>,
    low: Column<f64>,
    close: Column<f64>,
    volume: Column<u64>,
    transactions: Column<u64>,
    timestamps: Column<i64>,
    index: HashMap<i64, usize>,
    granularity_ms: i64,
    finished: bool,
}

impl Stock {
    /// Create an empty store for `timeframe`.
    pub fn new(timeframe: Timeframe) -> Self {
        Self {
            open: Column::new(),
            high: Column::new(),
            low: Column::new(),
            close: Column::new(),
            volume: Column::new(),
            transactions: Column::new(),
            timestamps: Column::new(),
            index: HashMap::new(),
            granularity_ms: timeframe.granularity_ms(),
            finished: false,
        }
    }

    /// Bar duration in milliseconds.
    pub fn granularity_ms(&self) -> i64 {
        self.granularity_ms
    }

    /// Append a candle. Fails with [`EngineError::InvalidOrder`] if `finish()`
    /// was already called, or if `candle.timestamp` is not strictly greater
    /// than the previous row's timestamp.
    pub fn push_candle(&mut self, candle: Candle) -> Result<()> {
        if self.finished {
            return Err(EngineError::InvalidOrder(
                "cannot push to a finished Stock".into(),
            ));
        }
        if let Some(&last_ts) = self.timestamps.get(self.timestamps.len().wrapping_sub(1)) {
            if candle.timestamp <= last_ts {
                return Err(EngineError::InvalidOrder(format!(
                    "candle timestamp {} is not strictly after the last pushed timestamp {}",
                    candle.timestamp, last_ts
                )));
            }
        }
        let row = self.timestamps.len();
        self.open.push(candle.open);
        self.high.push(candle.high);
        self.low.push(candle.low);
        self.close.push(candle.close);
        self.volume.push(candle.volume);
        self.transactions.push(candle.transactions);
        self.timestamps.push(candle.timestamp);
        self.index.insert(candle.timestamp, row);
        Ok(())
    }

    /// Shrink-wrap columns and forbid further pushes.
    pub fn finish(&mut self) {
        self.open.shrink_to_fit();
        self.high.shrink_to_fit();
        self.low.shrink_to_fit();
        self.close.shrink_to_fit();
        self.volume.shrink_to_fit();
        self.transactions.shrink_to_fit();
        self.timestamps.shrink_to_fit();
        self.finished = true;
    }

    /// Number of rows.
    pub fn size(&self) -> usize {
        self.timestamps.len()
    }

    /// Whether the store holds no rows.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Materialize row `i` as a [`Candle`], or `None` if out of range.
    pub fn get_candle(&self, i: usize) -> Option<Candle> {
        Some(Candle {
            open: *self.open.get(i)?,
            high: *self.high.get(i)?,
            low: *self.low.get(i)?,
            close: *self.close.get(i)?,
            volume: *self.volume.get(i)?,
            transactions: *self.transactions.get(i)?,
            timestamp: *self.timestamps.get(i)?,
        })
    }

    /// Row whose timestamp is `<= ts` and closest to it, via binary search on
    /// the timestamp column.
    ///
    /// Returns `0` if `ts` precedes all rows, `size()` if it is after all rows.
    pub fn get_index(&self, ts: i64) -> usize {
        let n = self.size();
        if n == 0 {
            return 0;
        }
        // Find the first index whose timestamp is > ts; the floor is one before it.
        let mut lo = 0usize;
        let mut hi = n;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let mid_ts = *self.timestamps.get(mid).expect("mid in range");
            if mid_ts <= ts {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        if lo == 0 {
            0
        } else if lo == n {
            let last_ts = *self.timestamps.get(n - 1).expect("n > 0");
            if ts > last_ts {
                n
            } else {
                n - 1
            }
        } else {
            lo - 1
        }
    }

    /// Row timestamp, if `i` is in range.
    pub fn timestamp_at(&self, i: usize) -> Option<i64> {
        self.timestamps.get(i).copied()
    }

    /// Rows `[getIndex(start_ts) .. getIndex(end_ts)]`, inclusive of both ends.
    pub fn get_candles_in_range(&self, start_ts: i64, end_ts: i64) -> Vec<Candle> {
        let start = self.get_index(start_ts);
        let end = self.get_index(end_ts);
        if self.size() == 0 || start >= self.size() || end < start {
            return Vec::new();
        }
        let end = end.min(self.size() - 1);
        (start..=end).filter_map(|i| self.get_candle(i)).collect()
    }

    /// Iterate rows in ascending-time order.
    pub fn iter(&self) -> StockIter<'_> {
        StockIter { stock: self, i: 0 }
    }
}

/// Ascending-time iterator over a [`Stock`]'s rows.
pub struct StockIter<'a> {
    stock: &'a Stock,
    i: usize,
}

impl<'a> Iterator for StockIter<'a> {
    type Item = Candle;

    fn next(&mut self) -> Option<Candle> {
        let c = self.stock.get_candle(self.i);
        if c.is_some() {
            self.i += 1;
        }
        c
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(ts: i64, close: f64) -> Candle {
        Candle::new(close, close, close, close, 100, 1, ts)
    }

    fn filled(n: i64) -> Stock {
        let mut s = Stock::new(Timeframe::OneDay);
        for i in 0..n {
            s.push_candle(candle(i * 1000, i as f64)).unwrap();
        }
        s.finish();
        s
    }

    #[test]
    fn push_then_iterate_round_trips() {
        let s = filled(5);
        let ts: Vec<i64> = s.iter().map(|c| c.timestamp).collect();
        assert_eq!(ts, vec![0, 1000, 2000, 3000, 4000]);
    }

    #[test]
    fn rejects_non_increasing_timestamp() {
        let mut s = Stock::new(Timeframe::OneDay);
        s.push_candle(candle(1000, 1.0)).unwrap();
        let err = s.push_candle(candle(1000, 2.0)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidOrder(_)));
        let err2 = s.push_candle(candle(500, 2.0)).unwrap_err();
        assert!(matches!(err2, EngineError::InvalidOrder(_)));
    }

    #[test]
    fn rejects_push_after_finish() {
        let mut s = Stock::new(Timeframe::OneDay);
        s.push_candle(candle(1000, 1.0)).unwrap();
        s.finish();
        assert!(s.push_candle(candle(2000, 1.0)).is_err());
    }

    #[test]
    fn get_index_boundaries() {
        let s = filled(5); // timestamps 0, 1000, 2000, 3000, 4000
        assert_eq!(s.get_index(-100), 0);
        assert_eq!(s.get_index(0), 0);
        assert_eq!(s.get_index(500), 0);
        assert_eq!(s.get_index(1000), 1);
        assert_eq!(s.get_index(1500), 1);
        assert_eq!(s.get_index(4000), 4);
        assert_eq!(s.get_index(10_000), 5);
    }

    #[test]
    fn get_index_is_closest_not_after() {
        let s = filled(5);
        for ts in [0i64, 1000, 2000, 2500, 3999, 4000] {
            let idx = s.get_index(ts);
            if idx < s.size() {
                let found_ts = s.get_candle(idx).unwrap().timestamp;
                assert!(found_ts <= ts, "found {found_ts} should be <= {ts}");
                // no candle strictly between found_ts and ts
                if idx + 1 < s.size() {
                    let next_ts = s.get_candle(idx + 1).unwrap().timestamp;
                    assert!(next_ts > ts);
                }
            }
        }
    }

    #[test]
    fn out_of_range_get_candle_is_none() {
        let s = filled(3);
        assert!(s.get_candle(3).is_none());
    }
}

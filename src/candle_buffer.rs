//! Streaming prefetch ring over a [`crate::datasource::DataSource`].
//!
//! Strategies only ever need a bounded trailing window; loading the whole
//! history up front would dominate memory on a year-long 1-minute run.
//! `CandleBuffer` amortizes datastore round-trips by fetching a chunk of
//! `lookback * PREFETCH_FACTOR` candles at a time and refilling once the
//! buffer's trailing window runs low.

use std::sync::Arc;

use crate::candle::Candle;
use crate::datasource::DataSource;
use crate::error::{EngineError, Result};
use crate::timeframe::Timeframe;

/// Chunk size multiplier: each fetch loads `lookback * PREFETCH_FACTOR` candles.
pub const PREFETCH_FACTOR: usize = 10;

/// A streaming, append-only prefetch buffer for one symbol/timeframe pair.
pub struct CandleBuffer {
    datasource: Arc<dyn DataSource>,
    symbol: String,
    timeframe: Timeframe,
    start_date: i64,
    end_date: i64,
    lookback: usize,
    prefetch_count: usize,
    buffer: Vec<Candle>,
    next_ts: i64,
    done: bool,
}

impl CandleBuffer {
    /// Create a buffer. `next_ts` starts at `start_date - lookback * granularity`
    /// so the first window has the requested pre-roll.
    pub fn new(
        datasource: Arc<dyn DataSource>,
        symbol: impl Into<String>,
        timeframe: Timeframe,
        start_date: i64,
        end_date: i64,
        lookback: usize,
    ) -> Self {
        let prefetch_count = lookback * PREFETCH_FACTOR;
        let next_ts = start_date - (lookback as i64) * timeframe.granularity_ms();
        Self {
            datasource,
            symbol: symbol.into(),
            timeframe,
            start_date,
            end_date,
            lookback,
            prefetch_count,
            buffer: Vec::new(),
            next_ts,
            done: false,
        }
    }

    /// Candles buffered so far, ascending by time.
    pub fn buffered(&self) -> &[Candle] {
        &self.buffer
    }

    /// Whether no further fetches will occur.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Extend the buffer if `current_ts` is within one lookback window of the
    /// last buffered bar. Idempotent: a call that doesn't need to fetch does
    /// nothing. Blocks on the datastore while fetching.
    pub async fn ensure(&mut self, current_ts: i64) -> Result<()> {
        loop {
            if self.done {
                return Ok(());
            }
            let last_buffered_ts = self.buffer.last().map(|c| c.timestamp);
            let needs_fetch = match last_buffered_ts {
                None => true,
                Some(last_ts) => {
                    current_ts >= last_ts - (self.lookback as i64) * self.timeframe.granularity_ms()
                }
            };
            if !needs_fetch {
                return Ok(());
            }

            let chunk = self
                .datasource
                .prefetch(&self.symbol, self.timeframe, self.next_ts, self.prefetch_count)
                .await?;

            if chunk.is_empty() {
                self.done = true;
                return Ok(());
            }

            let got = chunk.len();
            let last_loaded_ts = chunk.last().expect("non-empty").timestamp;
            self.buffer.extend(chunk);
            self.next_ts = last_loaded_ts + 1;

            if got < self.prefetch_count || self.next_ts >= self.end_date {
                self.done = true;
            }

            // One fetch may not be enough to cover `current_ts` yet (e.g. the
            // requested window is sparse); loop until satisfied or exhausted.
            if self.buffer.last().map(|c| c.timestamp) >= Some(current_ts) || self.done {
                return Ok(());
            }
        }
    }

    /// The last `count` candles with `timestamp <= current_ts`, newest first.
    /// Returns `None` when fewer than `count` such candles are available yet,
    /// rather than an error, since that's a normal early-series condition.
    pub fn get_last(&self, count: usize, current_ts: i64) -> Option<Vec<Candle>> {
        let eligible: Vec<Candle> = self
            .buffer
            .iter()
            .rev()
            .filter(|c| c.timestamp <= current_ts)
            .take(count)
            .copied()
            .collect();
        if eligible.len() < count {
            None
        } else {
            Some(eligible)
        }
    }

    /// Symbol this buffer serves.
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Timeframe this buffer serves.
    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    /// Configured lookback count.
    pub fn lookback(&self) -> usize {
        self.lookback
    }

    /// Configured end date.
    pub fn end_date(&self) -> i64 {
        self.end_date
    }

    /// Configured start date.
    pub fn start_date(&self) -> i64 {
        self.start_date
    }
}

/// Validate that a lookback request isn't asking about the future relative
/// to the current bar.
pub fn check_no_lookahead(at_ts: i64, current_ts: i64) -> Result<()> {
    if at_ts > current_ts {
        Err(EngineError::LookaheadViolation {
            requested: at_ts,
            current: current_ts,
        })
    } else {
        Ok(())
    }
}

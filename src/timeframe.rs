//! Candle timeframes.
//!
//! A closed enum of the four supported bar durations rather than string keys,
//! so the hot tick loop never does a string comparison.

use serde::{Deserialize, Serialize};

/// One of the four supported bar durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    /// One-minute bars.
    OneMinute,
    /// Five-minute bars.
    FiveMinutes,
    /// One-hour bars.
    OneHour,
    /// One-day bars.
    OneDay,
}

/// All four timeframes, for iterating a fixed-size table.
pub const ALL_TIMEFRAMES: [Timeframe; 4] = [
    Timeframe::OneMinute,
    Timeframe::FiveMinutes,
    Timeframe::OneHour,
    Timeframe::OneDay,
];

impl Timeframe {
    /// Bar duration in milliseconds.
    pub fn granularity_ms(self) -> i64 {
        match self {
            Timeframe::OneMinute => 60_000,
            Timeframe::FiveMinutes => 300_000,
            Timeframe::OneHour => 3_600_000,
            Timeframe::OneDay => 86_400_000,
        }
    }

    /// The datastore table suffix, e.g. `"1d"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::OneMinute => "1m",
            Timeframe::FiveMinutes => "5m",
            Timeframe::OneHour => "1h",
            Timeframe::OneDay => "1d",
        }
    }

    /// Parse the datastore table suffix back into a `Timeframe`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "1m" => Some(Timeframe::OneMinute),
            "5m" => Some(Timeframe::FiveMinutes),
            "1h" => Some(Timeframe::OneHour),
            "1d" => Some(Timeframe::OneDay),
            _ => None,
        }
    }

    /// Trading periods per year, for annualizing returns/Sharpe.
    pub fn periods_per_year(self) -> f64 {
        match self {
            Timeframe::OneDay => 252.0,
            Timeframe::OneHour => 252.0 * 6.5,
            Timeframe::FiveMinutes => 252.0 * 78.0,
            Timeframe::OneMinute => 252.0 * 390.0,
        }
    }

    /// Chunk size used to partition the all-symbols tick sequence.
    pub fn all_stocks_chunk_size(self) -> usize {
        match self {
            Timeframe::OneDay => 250,
            Timeframe::OneHour => 500,
            Timeframe::FiveMinutes => 1000,
            Timeframe::OneMinute => 2000,
        }
    }

    /// Width of the sliding preload window for non-main preloaded timeframes.
    pub fn preload_window_ms(self) -> i64 {
        const DAY: i64 = 86_400_000;
        match self {
            Timeframe::OneDay => 365 * DAY,
            Timeframe::OneHour => 122 * DAY,  // ~4 months
            Timeframe::FiveMinutes => 28 * DAY, // 4 weeks
            Timeframe::OneMinute => 14 * DAY,  // 2 weeks
        }
    }
}

/// Fixed-size table indexed by [`Timeframe`], replacing a `HashMap<String, _>`.
#[derive(Debug, Clone, Default)]
pub struct TimeframeTable<T> {
    slots: [Option<T>; 4],
}

fn slot_index(tf: Timeframe) -> usize {
    match tf {
        Timeframe::OneMinute => 0,
        Timeframe::FiveMinutes => 1,
        Timeframe::OneHour => 2,
        Timeframe::OneDay => 3,
    }
}

impl<T> TimeframeTable<T> {
    /// An empty table.
    pub fn new() -> Self {
        Self {
            slots: [None, None, None, None],
        }
    }

    /// Insert (or replace) the entry for `tf`.
    pub fn insert(&mut self, tf: Timeframe, value: T) {
        self.slots[slot_index(tf)] = Some(value);
    }

    /// Look up the entry for `tf`, if present.
    pub fn get(&self, tf: Timeframe) -> Option<&T> {
        self.slots[slot_index(tf)].as_ref()
    }

    /// Look up the entry for `tf` mutably, if present.
    pub fn get_mut(&mut self, tf: Timeframe) -> Option<&mut T> {
        self.slots[slot_index(tf)].as_mut()
    }

    /// Iterate over `(Timeframe, &T)` pairs for populated slots.
    pub fn iter(&self) -> impl Iterator<Item = (Timeframe, &T)> {
        ALL_TIMEFRAMES
            .iter()
            .copied()
            .filter_map(move |tf| self.get(tf).map(|v| (tf, v)))
    }

    /// Iterate over `(Timeframe, &mut T)` pairs for populated slots.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Timeframe, &mut T)> {
        self.slots
            .iter_mut()
            .zip(ALL_TIMEFRAMES)
            .filter_map(|(slot, tf)| slot.as_mut().map(|v| (tf, v)))
    }
}

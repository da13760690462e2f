//! The OHLCV candle/bar structure.

use serde::{Deserialize, Serialize};

/// A single immutable OHLCV candle.
///
/// Invariant (trusted, not enforced at construction, since historical data
/// is assumed clean): `low <= open, close <= high` and `low <= high`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Open price.
    pub open: f64,
    /// High price.
    pub high: f64,
    /// Low price.
    pub low: f64,
    /// Close price.
    pub close: f64,
    /// Volume, in shares.
    pub volume: u64,
    /// Number of transactions in the bar. `0` when the source doesn't report it.
    pub transactions: u64,
    /// Milliseconds since the Unix epoch, UTC.
    pub timestamp: i64,
}

impl Candle {
    /// Construct a candle from its fields.
    pub fn new(
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: u64,
        transactions: u64,
        timestamp: i64,
    ) -> Self {
        Self {
            open,
            high,
            low,
            close,
            volume,
            transactions,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candle_is_copy() {
        let c = Candle::new(1.0, 2.0, 0.5, 1.5, 100, 5, 1_000);
        let d = c;
        assert_eq!(c, d);
    }
}

//! Error types for the backtesting engine.

use thiserror::Error;

/// Errors raised by the simulation engine.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// Bad strategy or engine construction: wrong timeframe, multiple mains,
    /// non-positive lookback, `endDate <= startDate`, etc. Fatal at construction.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Network/DB/CSV parse failure from the external datastore. The current run aborts.
    #[error("datastore error: {0}")]
    DataSourceError(String),

    /// `getCandles` called with `atTs > currentTs`. Indicates a strategy bug.
    #[error("lookahead violation: requested candles at {requested} but current bar is at {current}")]
    LookaheadViolation {
        /// Timestamp the strategy asked for.
        requested: i64,
        /// Timestamp of the bar currently being processed.
        current: i64,
    },

    /// Order rejected: not enough cash to cover cost + fee.
    #[error("insufficient cash: need {need:.2}, have {have:.2}")]
    InsufficientCash {
        /// Cash required (cost + fee).
        need: f64,
        /// Cash actually available.
        have: f64,
    },

    /// Order rejected: not enough shares held to sell.
    #[error("insufficient shares of {ticker}: need {need}, have {have}")]
    InsufficientShares {
        /// Ticker symbol.
        ticker: String,
        /// Shares required.
        need: u64,
        /// Shares actually held.
        have: u64,
    },

    /// Non-positive `qty`/`price`, or a timestamp not strictly after the last
    /// candle pushed to a [`crate::stock::Stock`]. Fatal.
    #[error("invalid order: {0}")]
    InvalidOrder(String),
}

impl From<csv::Error> for EngineError {
    fn from(err: csv::Error) -> Self {
        EngineError::DataSourceError(err.to_string())
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        EngineError::DataSourceError(err.to_string())
    }
}

/// Result type used throughout the engine.
pub type Result<T> = std::result::Result<T, EngineError>;

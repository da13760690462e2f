//! # bar-replay
//!
//! An event-driven equity backtesting engine: a columnar candle store, a
//! lookback-windowed multi-timeframe replay buffer, broker-parameterized
//! order execution, and risk/return metrics.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use bar_replay::broker::AlpacaBroker;
//! use bar_replay::datasource::InMemoryDataSource;
//! use bar_replay::engine::{BacktestParams, Engine};
//!
//! # async fn example() -> bar_replay::error::Result<()> {
//! let datasource = Arc::new(InMemoryDataSource::new());
//! let engine = Engine::new(BacktestParams {
//!     start_date: 0,
//!     end_date: 1,
//!     start_cash_balance: 100_000.0,
//!     broker: Arc::new(AlpacaBroker::new()),
//!     datasource,
//! })?;
//! let _ = engine.cash_balance();
//! # Ok(())
//! # }
//! ```
//!
//! A [`crate::strategy::Strategy`] implements `on_tick` (single-symbol
//! replay, [`Engine::run_on_stock`]) or `on_tick_all` (all-symbols replay,
//! [`Engine::run_on_all_stocks`]) and is driven bar-by-bar against candles
//! served from a [`crate::datasource::DataSource`].

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

/// Broker fee/commission policies.
pub mod broker;
/// A single OHLCV bar.
pub mod candle;
/// Streaming prefetch buffer over a [`datasource::DataSource`].
pub mod candle_buffer;
/// Generic columnar storage primitive.
pub mod column;
/// Abstraction over the external time-series datastore.
pub mod datasource;
/// Error types and the crate's `Result` alias.
pub mod error;
/// The tick driver: balances, positions, equity curve, order execution.
pub mod engine;
/// Risk/return metrics computed from a finished run.
pub mod metrics;
/// Optional structured-log summary and self-contained HTML report.
pub mod report;
/// Strategy configuration and the per-bar callback trait.
pub mod strategy;
/// Columnar candle store for one symbol at one timeframe.
pub mod stock;
/// Closed set of supported bar durations, and a fixed-size table indexed by it.
pub mod timeframe;

pub use broker::{AlpacaBroker, Broker, IbkrBroker, IbkrTier, Side};
pub use candle::Candle;
pub use candle_buffer::CandleBuffer;
pub use datasource::{CsvCandleCursor, DataSource, HttpCsvDataSource, InMemoryDataSource};
pub use engine::{BacktestParams, Engine, EquityPoint, Swap, Trade};
pub use error::{EngineError, Result};
pub use metrics::{compute_metrics, feature_correlations, Metrics};
pub use stock::Stock;
pub use strategy::{Strategy, StrategyConfig, StrategyConfigBuilder, TimeframeSpec};
pub use timeframe::{Timeframe, TimeframeTable, ALL_TIMEFRAMES};

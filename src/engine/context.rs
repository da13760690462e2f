//! Per-tick views handed to a [`crate::strategy::Strategy`] callback.
//!
//! A context borrows the engine mutably for the duration of one callback so
//! `buy`/`sell` take effect immediately, and borrows whatever preloaded
//! buffers/stocks exist so `get_candles` can serve a preloaded timeframe
//! without a round trip, falling back to an ad-hoc datastore query for
//! timeframes the strategy didn't preload.

use std::collections::HashMap;
use std::sync::Arc;

use crate::candle::Candle;
use crate::candle_buffer::{check_no_lookahead, CandleBuffer};
use crate::datasource::DataSource;
use crate::error::Result;
use crate::stock::Stock;
use crate::strategy::StrategyConfig;
use crate::timeframe::{Timeframe, TimeframeTable};

use super::Engine;

/// The per-bar view in single-symbol mode (`Engine::run_on_stock`).
pub struct SingleTickContext<'a> {
    pub(crate) ticker: &'a str,
    pub(crate) candle: Candle,
    pub(crate) current_ts: i64,
    pub(crate) engine: &'a mut Engine,
    pub(crate) buffers: &'a mut TimeframeTable<CandleBuffer>,
    pub(crate) config: &'a StrategyConfig,
    pub(crate) datasource: &'a Arc<dyn DataSource>,
}

impl<'a> SingleTickContext<'a> {
    /// The symbol being replayed.
    pub fn ticker(&self) -> &str {
        self.ticker
    }

    /// The current bar.
    pub fn candle(&self) -> Candle {
        self.candle
    }

    /// The current bar's timestamp.
    pub fn current_ts(&self) -> i64 {
        self.current_ts
    }

    /// Current cash balance.
    pub fn cash_balance(&self) -> f64 {
        self.engine.cash_balance()
    }

    /// Current share balance.
    pub fn stock_balance(&self) -> u64 {
        self.engine.stock_balance(self.ticker)
    }

    /// The last `count` bars at `tf` as of `at_ts` (defaults to the current
    /// bar's timestamp when `None`), newest first.
    ///
    /// Served from the preload buffer if `tf` was configured with
    /// `preload = true`; otherwise falls back to an ad-hoc datastore lookback.
    /// Fails with [`crate::error::EngineError::LookaheadViolation`] if `at_ts`
    /// is after the current bar; returns `Ok(None)` rather than an error when
    /// fewer than `count` bars exist yet, since "not enough history" is a
    /// normal early-series condition the strategy must handle itself.
    pub async fn get_candles(
        &mut self,
        tf: Timeframe,
        count: usize,
        at_ts: Option<i64>,
    ) -> Result<Option<Vec<Candle>>> {
        let at_ts = at_ts.unwrap_or(self.current_ts);
        check_no_lookahead(at_ts, self.current_ts)?;

        if let Some(buffer) = self.buffers.get_mut(tf) {
            buffer.ensure(at_ts).await?;
            return Ok(buffer.get_last(count, at_ts));
        }

        // Ad-hoc fallback: the 2*count candles strictly before at_ts.
        let before_ts = at_ts - 1;
        let floor_ts = before_ts - tf.granularity_ms() * count as i64 * 2;
        let rows = self
            .datasource
            .lookback(self.ticker, tf, before_ts, floor_ts, count)
            .await?;
        if rows.len() < count {
            return Ok(None);
        }
        Ok(Some(rows))
    }

    /// Buy `qty` shares of the current ticker at `price`. Picks up whatever
    /// feature vector was last staged via [`Self::set_features`].
    pub fn buy(&mut self, qty: u64, price: f64) -> Result<()> {
        self.engine.buy(self.ticker, qty, price, self.current_ts)
    }

    /// Sell `qty` shares of the current ticker at `price`.
    pub fn sell(&mut self, qty: u64, price: f64) -> Result<()> {
        self.engine.sell(self.ticker, qty, price, self.current_ts)
    }

    /// Stage a feature vector against the current ticker's pending action;
    /// attached on the next opening buy and retained until the full close.
    pub fn set_features(&mut self, features: Vec<f64>) {
        self.engine.set_features(self.ticker, features)
    }

    /// The strategy's own configuration, for introspection.
    pub fn config(&self) -> &StrategyConfig {
        self.config
    }
}

/// The per-tick view in all-symbols mode (`Engine::run_on_all_stocks`).
///
/// One tick advances every symbol's main-timeframe bar simultaneously
/// (daily bars normalized to 16:00 America/New_York); `entries` holds
/// whichever symbols have a bar at this tick.
pub struct AllTickContext<'a> {
    pub(crate) current_date: i64,
    pub(crate) entries: &'a HashMap<String, Candle>,
    pub(crate) engine: &'a mut Engine,
    pub(crate) main_stocks: &'a HashMap<String, Stock>,
    pub(crate) preloaded: &'a TimeframeTable<HashMap<String, Stock>>,
    pub(crate) datasource: &'a Arc<dyn DataSource>,
    pub(crate) config: &'a StrategyConfig,
}

impl<'a> AllTickContext<'a> {
    /// Tick timestamp (epoch ms, normalized daily close).
    pub fn current_date(&self) -> i64 {
        self.current_date
    }

    /// Symbols with a bar at this tick.
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|s| s.as_str())
    }

    /// The current bar for `ticker`, if it has one this tick.
    pub fn candle(&self, ticker: &str) -> Option<Candle> {
        self.entries.get(ticker).copied()
    }

    /// Current cash balance.
    pub fn cash_balance(&self) -> f64 {
        self.engine.cash_balance()
    }

    /// Current share balance for `ticker`.
    pub fn stock_balance(&self, ticker: &str) -> u64 {
        self.engine.stock_balance(ticker)
    }

    /// The last `count` bars of `ticker` at `tf` as of `at_ts` (defaults to
    /// the current tick when `None`), newest first. Served from a preloaded
    /// [`Stock`] chunk when available, otherwise an ad-hoc datastore lookback.
    /// `Ok(None)` when fewer than `count` bars exist yet, same convention as
    /// [`SingleTickContext::get_candles`].
    pub async fn get_candles(
        &self,
        ticker: &str,
        tf: Timeframe,
        count: usize,
        at_ts: Option<i64>,
    ) -> Result<Option<Vec<Candle>>> {
        let at_ts = at_ts.unwrap_or(self.current_date);
        check_no_lookahead(at_ts, self.current_date)?;

        let stock = if tf == self.config.main() {
            self.main_stocks.get(ticker)
        } else {
            self.preloaded.get(tf).and_then(|m| m.get(ticker))
        };

        if let Some(stock) = stock {
            let idx = stock.get_index(at_ts);
            if idx >= stock.size() || count == 0 {
                return Ok(None);
            }
            let start = idx + 1;
            if start < count {
                return Ok(None);
            }
            let mut rows: Vec<Candle> = ((start - count)..start)
                .filter_map(|i| stock.get_candle(i))
                .collect();
            rows.reverse();
            return Ok(Some(rows));
        }

        let floor_ts = at_ts - tf.granularity_ms() * count as i64 * 4;
        let rows = self
            .datasource
            .lookback(ticker, tf, at_ts, floor_ts, count)
            .await?;
        if rows.len() < count {
            return Ok(None);
        }
        Ok(Some(rows))
    }

    /// Buy `qty` shares of `ticker` at `price`. Picks up whatever feature
    /// vector was last staged for `ticker` via [`Self::set_features`].
    pub fn buy(&mut self, ticker: &str, qty: u64, price: f64) -> Result<()> {
        self.engine.buy(ticker, qty, price, self.current_date)
    }

    /// Sell `qty` shares of `ticker` at `price`.
    pub fn sell(&mut self, ticker: &str, qty: u64, price: f64) -> Result<()> {
        self.engine.sell(ticker, qty, price, self.current_date)
    }

    /// Stage a feature vector against `ticker`'s pending action; attached on
    /// its next opening buy and retained until the full close.
    pub fn set_features(&mut self, ticker: &str, features: Vec<f64>) {
        self.engine.set_features(ticker, features)
    }

    /// The strategy's own configuration, for introspection.
    pub fn config(&self) -> &StrategyConfig {
        self.config
    }
}

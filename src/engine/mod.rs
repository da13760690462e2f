//! The tick driver: owns balances, positions, equity curve, and trades, and
//! orchestrates either a single-symbol or an all-symbols run.

mod accounting;
pub mod context;
mod multi;
mod single;

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::broker::Broker;
use crate::datasource::DataSource;
use crate::error::{EngineError, Result};

/// Every executed buy or sell, logged individually.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Swap {
    /// `true` for a buy, `false` for a sell.
    pub is_buy: bool,
    /// Ticker symbol.
    pub ticker: String,
    /// Shares executed.
    pub qty: u64,
    /// Execution price.
    pub price: f64,
    /// Fee charged by the broker.
    pub fee: f64,
    /// Bar timestamp (epoch ms).
    pub timestamp: i64,
}

/// A completed round trip: one or more buys followed by a closing sell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    /// Ticker symbol.
    pub ticker: String,
    /// Shares sold in the closing trade.
    pub qty: u64,
    /// Closing sell price.
    pub price: f64,
    /// Closing sell timestamp.
    pub timestamp: i64,
    /// Closing sell fee.
    pub fee: f64,
    /// `proceeds - matched buy cost - matched buy fees - sell fee`.
    pub profit: f64,
    /// `profit / matched buy cost`, or `0` if that cost is zero.
    pub profit_percent: f64,
    /// Feature vector attached at buy time, if any, for correlation analysis.
    pub features: Option<Vec<f64>>,
}

/// One sample of the equity curve.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EquityPoint {
    /// Bar timestamp (epoch ms).
    pub timestamp: i64,
    /// `cash + sum(balance * last price)` at this bar.
    pub total_value: f64,
    /// Cash balance at this bar.
    pub cash_balance: f64,
}

/// Construction parameters for a [`Engine`].
pub struct BacktestParams {
    /// First bar timestamp (inclusive), epoch ms.
    pub start_date: i64,
    /// Last bar timestamp (exclusive), epoch ms.
    pub end_date: i64,
    /// Starting cash balance.
    pub start_cash_balance: f64,
    /// Commission/fee policy for this run.
    pub broker: Arc<dyn Broker>,
    /// External time-series datastore.
    pub datasource: Arc<dyn DataSource>,
}

/// The backtest engine: the tick driver.
pub struct Engine {
    pub(crate) cash_balance: f64,
    pub(crate) start_cash_balance: f64,
    pub(crate) stock_balances: HashMap<String, u64>,
    pub(crate) stock_prices: HashMap<String, f64>,
    pub(crate) hold_since: HashMap<String, i64>,
    pub(crate) stock_features: HashMap<String, Vec<f64>>,
    pub(crate) pending_features: HashMap<String, Vec<f64>>,
    pub(crate) swaps: Vec<Swap>,
    pub(crate) trades: Vec<Trade>,
    pub(crate) equity_curve: Vec<EquityPoint>,
    pub(crate) delist_counter: HashMap<String, u32>,
    pub(crate) total_fees: f64,
    pub(crate) broker: Arc<dyn Broker>,
    pub(crate) datasource: Arc<dyn DataSource>,
    pub(crate) start_date: i64,
    pub(crate) end_date: i64,
}

/// Consecutive missing-bar count after which a ticker is dropped from the
/// portfolio in all-symbols mode.
pub const DELISTING_THRESHOLD: u32 = 10;

impl Engine {
    /// Construct a new engine, validating `params` eagerly.
    pub fn new(params: BacktestParams) -> Result<Self> {
        if params.end_date <= params.start_date {
            return Err(EngineError::InvalidConfig(
                "end_date must be strictly after start_date".into(),
            ));
        }
        if params.start_cash_balance <= 0.0 {
            return Err(EngineError::InvalidConfig(
                "start_cash_balance must be positive".into(),
            ));
        }
        Ok(Self {
            cash_balance: params.start_cash_balance,
            start_cash_balance: params.start_cash_balance,
            stock_balances: HashMap::new(),
            stock_prices: HashMap::new(),
            hold_since: HashMap::new(),
            stock_features: HashMap::new(),
            pending_features: HashMap::new(),
            swaps: Vec::new(),
            trades: Vec::new(),
            equity_curve: Vec::new(),
            delist_counter: HashMap::new(),
            total_fees: 0.0,
            broker: params.broker,
            datasource: params.datasource,
            start_date: params.start_date,
            end_date: params.end_date,
        })
    }

    /// Current cash balance.
    pub fn cash_balance(&self) -> f64 {
        self.cash_balance
    }

    /// Current share balance for `ticker`, or `0` if none is held.
    pub fn stock_balance(&self, ticker: &str) -> u64 {
        self.stock_balances.get(ticker).copied().unwrap_or(0)
    }

    /// `cash + sum(balance * last seen close)` across all held tickers.
    pub fn total_value(&self) -> f64 {
        let positions: f64 = self
            .stock_balances
            .iter()
            .map(|(ticker, &qty)| {
                let price = self.stock_prices.get(ticker).copied().unwrap_or(0.0);
                qty as f64 * price
            })
            .sum();
        self.cash_balance + positions
    }

    /// Total fees paid across all swaps so far.
    pub fn total_fees(&self) -> f64 {
        self.total_fees
    }

    /// The completed equity curve.
    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.equity_curve
    }

    /// The closed-trade log.
    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    /// The individual buy/sell log.
    pub fn swaps(&self) -> &[Swap] {
        &self.swaps
    }

    /// Stash a feature vector for `ticker`, to be attached to its next
    /// opening buy and retained until the position fully closes.
    pub fn set_features(&mut self, ticker: &str, features: Vec<f64>) {
        if features.is_empty() {
            self.pending_features.remove(ticker);
        } else {
            self.pending_features.insert(ticker.to_string(), features);
        }
    }
}

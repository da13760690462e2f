//! Order execution and accounting.

use tracing::debug;

use crate::broker::Side;
use crate::error::{EngineError, Result};

use super::{Engine, Swap, Trade};

impl Engine {
    /// Open or add to a position. Consumes any feature vector previously
    /// staged for `ticker` via [`Engine::set_features`].
    pub fn buy(&mut self, ticker: &str, qty: u64, price: f64, ts: i64) -> Result<()> {
        if qty == 0 || price <= 0.0 {
            return Err(EngineError::InvalidOrder(format!(
                "buy requires qty > 0 and price > 0, got qty={qty}, price={price}"
            )));
        }

        let cost = qty as f64 * price;
        let fee = self.broker.calculate_fees(qty, price, Side::Buy);

        if cost + fee > self.cash_balance {
            return Err(EngineError::InsufficientCash {
                need: cost + fee,
                have: self.cash_balance,
            });
        }

        self.cash_balance -= cost + fee;
        *self.stock_balances.entry(ticker.to_string()).or_insert(0) += qty;
        self.total_fees += fee;

        self.swaps.push(Swap {
            is_buy: true,
            ticker: ticker.to_string(),
            qty,
            price,
            fee,
            timestamp: ts,
        });

        self.stock_prices.insert(ticker.to_string(), price);
        self.hold_since.insert(ticker.to_string(), ts);

        if let Some(f) = self.pending_features.remove(ticker) {
            self.stock_features.insert(ticker.to_string(), f);
        }

        debug!(ticker, qty, price, fee, "buy executed");
        Ok(())
    }

    /// Close or reduce a position.
    pub fn sell(&mut self, ticker: &str, qty: u64, price: f64, ts: i64) -> Result<()> {
        if qty == 0 || price <= 0.0 {
            return Err(EngineError::InvalidOrder(format!(
                "sell requires qty > 0 and price > 0, got qty={qty}, price={price}"
            )));
        }

        let held = self.stock_balances.get(ticker).copied().unwrap_or(0);
        if held < qty {
            return Err(EngineError::InsufficientShares {
                ticker: ticker.to_string(),
                need: qty,
                have: held,
            });
        }

        let proceeds = qty as f64 * price;
        let fee = self.broker.calculate_fees(qty, price, Side::Sell);

        self.cash_balance += proceeds - fee;
        *self.stock_balances.get_mut(ticker).expect("checked above") -= qty;
        self.total_fees += fee;

        // Round-trip P&L attribution: walk swaps for this ticker in reverse;
        // the first SELL encountered (or start of log) bounds the BUYs this
        // sell closes. A position closed across multiple sells attributes
        // all intervening buy cost/fees to the first of those sells, leaving
        // later ones with zero matched cost.
        let mut matched_cost = 0.0_f64;
        let mut matched_fees = 0.0_f64;
        for swap in self.swaps.iter().rev() {
            if swap.ticker != ticker {
                continue;
            }
            if !swap.is_buy {
                break;
            }
            matched_cost += swap.qty as f64 * swap.price;
            matched_fees += swap.fee;
        }

        let profit = proceeds - matched_cost - matched_fees - fee;
        let profit_percent = if matched_cost > 0.0 {
            profit / matched_cost
        } else {
            0.0
        };

        self.trades.push(Trade {
            ticker: ticker.to_string(),
            qty,
            price,
            timestamp: ts,
            fee,
            profit,
            profit_percent,
            features: self.stock_features.get(ticker).cloned(),
        });

        self.swaps.push(Swap {
            is_buy: false,
            ticker: ticker.to_string(),
            qty,
            price,
            fee,
            timestamp: ts,
        });

        self.stock_prices.insert(ticker.to_string(), price);

        if self.stock_balances.get(ticker).copied() == Some(0) {
            self.stock_balances.remove(ticker);
            self.hold_since.remove(ticker);
            self.stock_features.remove(ticker);
        }

        debug!(ticker, qty, price, fee, profit, "sell executed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::broker::AlpacaBroker;
    use crate::datasource::InMemoryDataSource;
    use crate::engine::BacktestParams;

    fn engine(start_cash: f64) -> Engine {
        Engine::new(BacktestParams {
            start_date: 0,
            end_date: 1_000_000,
            start_cash_balance: start_cash,
            broker: Arc::new(AlpacaBroker::new()),
            datasource: Arc::new(InMemoryDataSource::new()),
        })
        .unwrap()
    }

    #[test]
    fn insufficient_cash_leaves_state_unchanged() {
        let mut e = engine(1_000.0);
        let err = e.buy("AAPL", 100, 50.0, 0).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientCash { .. }));
        assert_eq!(e.cash_balance(), 1_000.0);
        assert_eq!(e.stock_balance("AAPL"), 0);
    }

    #[test]
    fn insufficient_shares_rejected() {
        let mut e = engine(10_000.0);
        let err = e.sell("AAPL", 10, 50.0, 0).unwrap_err();
        assert!(matches!(err, EngineError::InsufficientShares { .. }));
    }

    #[test]
    fn single_round_trip_pnl_balances() {
        let mut e = engine(10_000.0);
        e.buy("AAPL", 10, 100.0, 0).unwrap();
        let buy_fee = e.swaps()[0].fee;
        e.sell("AAPL", 10, 110.0, 1000).unwrap();
        assert_eq!(e.trades().len(), 1);
        let trade = &e.trades()[0];
        let proceeds = 10.0 * 110.0;
        // profit + matchedCost + matchedFees + sellFee == proceeds
        let matched_cost = 10.0 * 100.0;
        assert!(
            (trade.profit + matched_cost + buy_fee + trade.fee - proceeds).abs() < 1e-9,
            "got profit={}, fee={}",
            trade.profit,
            trade.fee
        );
        assert_eq!(e.stock_balance("AAPL"), 0);
    }

    #[test]
    fn full_liquidation_clears_hold_since_and_features() {
        let mut e = engine(10_000.0);
        e.set_features("AAPL", vec![1.0, 2.0]);
        e.buy("AAPL", 10, 100.0, 0).unwrap();
        assert!(e.hold_since.contains_key("AAPL"));
        assert!(e.stock_features.contains_key("AAPL"));
        e.sell("AAPL", 10, 110.0, 1000).unwrap();
        assert!(!e.hold_since.contains_key("AAPL"));
        assert!(!e.stock_features.contains_key("AAPL"));
        assert!(!e.stock_balances.contains_key("AAPL"));
    }

    #[test]
    fn partial_sell_keeps_position_open() {
        let mut e = engine(10_000.0);
        e.buy("AAPL", 10, 100.0, 0).unwrap();
        e.sell("AAPL", 4, 110.0, 1000).unwrap();
        assert_eq!(e.stock_balance("AAPL"), 6);
        assert!(e.hold_since.contains_key("AAPL"));
    }

    #[test]
    fn empty_features_vector_is_not_stored() {
        let mut e = engine(10_000.0);
        e.set_features("AAPL", vec![]);
        e.buy("AAPL", 10, 100.0, 0).unwrap();
        assert!(!e.stock_features.contains_key("AAPL"));
    }

    #[test]
    fn total_value_marks_to_market() {
        let mut e = engine(10_000.0);
        e.buy("AAPL", 10, 100.0, 0).unwrap();
        let after_buy_cash = e.cash_balance();
        e.stock_prices.insert("AAPL".to_string(), 120.0);
        assert!((e.total_value() - (after_buy_cash + 10.0 * 120.0)).abs() < 1e-9);
    }
}

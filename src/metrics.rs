//! Risk/return metrics computed from a finished backtest.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::engine::{EquityPoint, Trade};
use crate::timeframe::Timeframe;

const MS_PER_YEAR: f64 = 365.0 * 86_400_000.0;

/// Summary statistics over a completed run's equity curve and trade log.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Metrics {
    /// `e_n / startCashBalance - 1`.
    pub total_return: f64,
    /// Compound annual growth rate.
    pub cagr: f64,
    /// Annualized Sharpe ratio (population stddev of per-bar returns).
    pub sharpe: f64,
    /// `exp(mean(log(1 + r))) - 1`, the per-bar geometric mean return.
    pub geo_period_return: f64,
    /// `(1 + geoPeriodReturn)^periodsPerYear - 1`.
    pub geo_annual_return: f64,
    /// Maximum drawdown, a non-positive fraction.
    pub max_drawdown: f64,
    /// Mean per-bar return, named `avgDaily` for historical reasons.
    pub avg_daily: f64,
    /// Fraction of closed trades with positive profit.
    pub win_rate: f64,
}

/// Compute [`Metrics`] from an equity curve and trade log.
///
/// Requires `equity_curve.len() >= 2` (otherwise there are no returns to
/// compute); returns `None` in that case, same as an "absent" feature
/// correlation.
pub fn compute_metrics(
    equity_curve: &[EquityPoint],
    trades: &[Trade],
    start_cash_balance: f64,
    start_date: i64,
    end_date: i64,
    main_timeframe: Timeframe,
) -> Option<Metrics> {
    if equity_curve.len() < 2 {
        return None;
    }

    let mut sorted: Vec<EquityPoint> = equity_curve.to_vec();
    sorted.sort_by_key(|p| p.timestamp);

    let e_n = sorted.last().expect("len >= 2").total_value;
    let total_return = e_n / start_cash_balance - 1.0;

    let years = (end_date - start_date) as f64 / MS_PER_YEAR;
    let cagr = if years > 0.0 {
        (1.0 + total_return).powf(1.0 / years) - 1.0
    } else {
        0.0
    };

    let returns: Vec<f64> = sorted
        .windows(2)
        .map(|w| w[1].total_value / w[0].total_value - 1.0)
        .collect();

    let periods_per_year = main_timeframe.periods_per_year();
    let mean_ret = mean(&returns);
    let std_ret = population_stddev(&returns, mean_ret);
    let sharpe = if std_ret > 0.0 {
        (mean_ret / std_ret) * periods_per_year.sqrt()
    } else {
        0.0
    };

    let log_returns: Vec<f64> = returns.iter().map(|r| (1.0 + r).ln()).collect();
    let geo_period_return = mean(&log_returns).exp() - 1.0;
    let geo_annual_return = (1.0 + geo_period_return).powf(periods_per_year) - 1.0;

    let mut peak = sorted[0].total_value;
    let mut max_drawdown = 0.0_f64;
    for point in &sorted {
        if point.total_value > peak {
            peak = point.total_value;
        }
        if peak > 0.0 {
            let drawdown = (point.total_value - peak) / peak;
            if drawdown < max_drawdown {
                max_drawdown = drawdown;
            }
        }
    }

    let win_rate = if trades.is_empty() {
        0.0
    } else {
        trades.iter().filter(|t| t.profit > 0.0).count() as f64 / trades.len() as f64
    };

    Some(Metrics {
        total_return,
        cagr,
        sharpe,
        geo_period_return,
        geo_annual_return,
        max_drawdown,
        avg_daily: mean_ret,
        win_rate,
    })
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        0.0
    } else {
        xs.iter().sum::<f64>() / xs.len() as f64
    }
}

fn population_stddev(xs: &[f64], mean_val: f64) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let variance = xs.iter().map(|x| (x - mean_val).powi(2)).sum::<f64>() / xs.len() as f64;
    variance.sqrt()
}

/// Pearson correlation coefficient, computed inline over paired samples.
/// `None` if fewer than two pairs or either series has zero variance.
fn pearson_correlation(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let mean_x = mean(xs);
    let mean_y = mean(ys);
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for i in 0..xs.len() {
        let dx = xs[i] - mean_x;
        let dy = ys[i] - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    let denom = (var_x * var_y).sqrt();
    if denom == 0.0 {
        None
    } else {
        Some(cov / denom)
    }
}

/// For each feature index present on at least one trade, the Pearson
/// correlation between that feature's value and `profit_percent` across all
/// trades that carry a value at that index. Missing/short feature
/// vectors simply don't contribute a sample for the indices they lack.
pub fn feature_correlations(trades: &[Trade]) -> HashMap<usize, f64> {
    let max_len = trades
        .iter()
        .filter_map(|t| t.features.as_ref().map(|f| f.len()))
        .max()
        .unwrap_or(0);

    let mut out = HashMap::new();
    for k in 0..max_len {
        let mut feature_vals = Vec::new();
        let mut profit_vals = Vec::new();
        for trade in trades {
            if let Some(features) = &trade.features {
                if let Some(&v) = features.get(k) {
                    feature_vals.push(v);
                    profit_vals.push(trade.profit_percent);
                }
            }
        }
        if let Some(r) = pearson_correlation(&feature_vals, &profit_vals) {
            out.insert(k, r);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(ts: i64, value: f64) -> EquityPoint {
        EquityPoint {
            timestamp: ts,
            total_value: value,
            cash_balance: value,
        }
    }

    #[test]
    fn too_short_equity_curve_returns_none() {
        let curve = vec![point(0, 1000.0)];
        assert!(compute_metrics(&curve, &[], 1000.0, 0, 1, Timeframe::OneDay).is_none());
    }

    #[test]
    fn flat_equity_curve_has_zero_sharpe_and_drawdown() {
        let curve: Vec<EquityPoint> = (0..10).map(|i| point(i * 86_400_000, 1000.0)).collect();
        let m = compute_metrics(&curve, &[], 1000.0, 0, 9 * 86_400_000, Timeframe::OneDay).unwrap();
        assert!((m.sharpe).abs() < 1e-9);
        assert!((m.max_drawdown).abs() < 1e-9);
        assert!((m.total_return).abs() < 1e-9);
    }

    #[test]
    fn monotonic_growth_has_positive_cagr_and_zero_drawdown() {
        let curve: Vec<EquityPoint> = (0..10)
            .map(|i| point(i * 86_400_000, 1000.0 * 1.01f64.powi(i as i32)))
            .collect();
        let m = compute_metrics(&curve, &[], 1000.0, 0, 9 * 86_400_000, Timeframe::OneDay).unwrap();
        assert!(m.cagr > 0.0);
        assert!((m.max_drawdown).abs() < 1e-9);
    }

    #[test]
    fn drawdown_detects_a_dip_below_peak() {
        let values = [1000.0, 1100.0, 900.0, 950.0, 1200.0];
        let curve: Vec<EquityPoint> = values
            .iter()
            .enumerate()
            .map(|(i, &v)| point(i as i64 * 86_400_000, v))
            .collect();
        let m = compute_metrics(&curve, &[], 1000.0, 0, 4 * 86_400_000, Timeframe::OneDay).unwrap();
        let expected = (900.0 - 1100.0) / 1100.0;
        assert!((m.max_drawdown - expected).abs() < 1e-9);
    }

    fn trade(profit: f64, profit_pct: f64, features: Option<Vec<f64>>) -> Trade {
        Trade {
            ticker: "AAPL".into(),
            qty: 1,
            price: 100.0,
            timestamp: 0,
            fee: 0.0,
            profit,
            profit_percent: profit_pct,
            features,
        }
    }

    #[test]
    fn win_rate_counts_positive_profit_trades() {
        let curve: Vec<EquityPoint> = (0..3).map(|i| point(i * 86_400_000, 1000.0 + i as f64)).collect();
        let trades = vec![trade(10.0, 0.1, None), trade(-5.0, -0.05, None), trade(3.0, 0.03, None)];
        let m = compute_metrics(&curve, &trades, 1000.0, 0, 2 * 86_400_000, Timeframe::OneDay).unwrap();
        assert!((m.win_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn feature_correlation_perfect_positive() {
        let trades = vec![
            trade(1.0, 0.10, Some(vec![1.0])),
            trade(2.0, 0.20, Some(vec![2.0])),
            trade(3.0, 0.30, Some(vec![3.0])),
        ];
        let corr = feature_correlations(&trades);
        assert!((corr[&0] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn feature_correlation_absent_with_fewer_than_two_samples() {
        let trades = vec![trade(1.0, 0.1, Some(vec![5.0]))];
        let corr = feature_correlations(&trades);
        assert!(corr.get(&0).is_none());
    }

    #[test]
    fn feature_correlation_skips_trades_missing_that_index() {
        let trades = vec![
            trade(1.0, 0.10, Some(vec![1.0])),
            trade(2.0, 0.20, Some(vec![2.0, 99.0])),
            trade(3.0, 0.30, None),
        ];
        let corr = feature_correlations(&trades);
        assert!(corr.contains_key(&0));
        // Index 1 only has a single qualifying sample, so it's absent.
        assert!(!corr.contains_key(&1));
    }
}

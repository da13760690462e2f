//! Optional reporting surface: structured log summary and a self-contained
//! HTML report. Neither is required to run a backtest; both are thin views
//! over [`crate::metrics::Metrics`] and the engine's equity curve.

use std::fmt::Write as _;

use tracing::info;

use crate::engine::EquityPoint;
use crate::metrics::Metrics;

/// Emit a structured summary of `metrics` via `tracing::info!`.
pub fn log_metrics(metrics: &Metrics) {
    info!(
        total_return = metrics.total_return,
        cagr = metrics.cagr,
        sharpe = metrics.sharpe,
        geo_annual_return = metrics.geo_annual_return,
        max_drawdown = metrics.max_drawdown,
        win_rate = metrics.win_rate,
        "backtest metrics"
    );
}

/// Render a small self-contained HTML report: a metrics table plus an
/// inline SVG sparkline of the equity curve. No external templating crate
/// or network fetch.
pub fn build_report(metrics: &Metrics, equity_curve: &[EquityPoint]) -> String {
    let sparkline = render_sparkline(equity_curve);

    let mut html = String::new();
    let _ = write!(
        html,
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Backtest report</title></head><body>"
    );
    let _ = write!(html, "<h1>Backtest report</h1>");
    let _ = write!(html, "<table border=\"1\" cellpadding=\"4\">");
    let _ = write!(
        html,
        "<tr><th>Total return</th><td>{:.2}%</td></tr>",
        metrics.total_return * 100.0
    );
    let _ = write!(html, "<tr><th>CAGR</th><td>{:.2}%</td></tr>", metrics.cagr * 100.0);
    let _ = write!(html, "<tr><th>Sharpe</th><td>{:.2}</td></tr>", metrics.sharpe);
    let _ = write!(
        html,
        "<tr><th>Geometric annual return</th><td>{:.2}%</td></tr>",
        metrics.geo_annual_return * 100.0
    );
    let _ = write!(
        html,
        "<tr><th>Max drawdown</th><td>{:.2}%</td></tr>",
        metrics.max_drawdown * 100.0
    );
    let _ = write!(html, "<tr><th>Win rate</th><td>{:.1}%</td></tr>", metrics.win_rate * 100.0);
    let _ = write!(html, "</table>");
    let _ = write!(html, "{sparkline}");
    let _ = write!(html, "</body></html>");
    html
}

fn render_sparkline(equity_curve: &[EquityPoint]) -> String {
    if equity_curve.len() < 2 {
        return String::from("<p>not enough data for a sparkline</p>");
    }

    const WIDTH: f64 = 600.0;
    const HEIGHT: f64 = 120.0;

    let min_value = equity_curve
        .iter()
        .map(|p| p.total_value)
        .fold(f64::INFINITY, f64::min);
    let max_value = equity_curve
        .iter()
        .map(|p| p.total_value)
        .fold(f64::NEG_INFINITY, f64::max);
    let range = (max_value - min_value).max(1e-9);

    let n = equity_curve.len();
    let points: String = equity_curve
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let x = i as f64 / (n - 1) as f64 * WIDTH;
            let y = HEIGHT - (p.total_value - min_value) / range * HEIGHT;
            format!("{x:.1},{y:.1}")
        })
        .collect::<Vec<_>>()
        .join(" ");

    format!(
        "<svg width=\"{WIDTH}\" height=\"{HEIGHT}\" xmlns=\"http://www.w3.org/2000/svg\">\
         <polyline fill=\"none\" stroke=\"#1f77b4\" stroke-width=\"1.5\" points=\"{points}\"/>\
         </svg>"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics() -> Metrics {
        Metrics {
            total_return: 0.25,
            cagr: 0.12,
            sharpe: 1.5,
            geo_period_return: 0.001,
            geo_annual_return: 0.11,
            max_drawdown: -0.08,
            avg_daily: 0.0004,
            win_rate: 0.6,
        }
    }

    fn curve() -> Vec<EquityPoint> {
        (0..5)
            .map(|i| EquityPoint {
                timestamp: i * 86_400_000,
                total_value: 1000.0 + i as f64 * 10.0,
                cash_balance: 1000.0,
            })
            .collect()
    }

    #[test]
    fn report_contains_metrics_table_and_svg() {
        let html = build_report(&metrics(), &curve());
        assert!(html.contains("Sharpe"));
        assert!(html.contains("<svg"));
        assert!(html.contains("polyline"));
    }

    #[test]
    fn sparkline_falls_back_with_too_little_data() {
        let html = render_sparkline(&curve()[..1]);
        assert!(html.contains("not enough data"));
    }

    #[test]
    fn log_metrics_does_not_panic() {
        log_metrics(&metrics());
    }
}

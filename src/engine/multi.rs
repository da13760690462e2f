//! All-symbols tick loop.

use std::collections::HashMap;

use chrono::{Datelike, TimeZone, Weekday};
use chrono_tz::America::New_York;
use chrono_tz::UTC;
use tracing::{instrument, warn};

use crate::candle::Candle;
use crate::error::Result;
use crate::metrics::{compute_metrics, Metrics};
use crate::stock::Stock;
use crate::strategy::Strategy;
use crate::timeframe::{Timeframe, TimeframeTable};

use super::context::AllTickContext;
use super::{Engine, EquityPoint};

const DAY_MS: i64 = 86_400_000;

/// Normalize a raw daily-step timestamp to 16:00 America/New_York on the same
/// calendar date, expressed as UTC epoch ms. DST-aware: the UTC offset of
/// 16:00 ET shifts by an hour across the spring/fall transitions.
fn normalize_daily_close(raw_ts: i64) -> i64 {
    let naive = chrono::DateTime::from_timestamp_millis(raw_ts)
        .expect("timestamp in range")
        .naive_utc();
    let date = naive.date();
    let local_close = date.and_hms_opt(16, 0, 0).expect("16:00 is valid");
    let zoned = match New_York.from_local_datetime(&local_close) {
        chrono::LocalResult::Single(dt) => dt,
        chrono::LocalResult::Ambiguous(dt, _) => dt,
        chrono::LocalResult::None => New_York.from_utc_datetime(&local_close),
    };
    zoned.with_timezone(&UTC).timestamp_millis()
}

fn is_weekend_utc(ts: i64) -> bool {
    let naive = chrono::DateTime::from_timestamp_millis(ts)
        .expect("timestamp in range")
        .naive_utc();
    matches!(naive.weekday(), Weekday::Sat | Weekday::Sun)
}

fn generate_ticks(main_tf: Timeframe, start_date: i64, end_date: i64) -> Vec<i64> {
    let step = main_tf.granularity_ms();
    let mut ticks = Vec::new();
    let mut t = start_date;
    while t < end_date {
        let tick = if main_tf == Timeframe::OneDay {
            normalize_daily_close(t)
        } else {
            t
        };
        ticks.push(tick);
        t += step;
    }
    ticks
}

fn stocks_from_candles(tf: Timeframe, raw: HashMap<String, Vec<Candle>>) -> HashMap<String, Stock> {
    raw.into_iter()
        .map(|(ticker, mut candles)| {
            candles.sort_by_key(|c| c.timestamp);
            let mut stock = Stock::new(tf);
            for c in candles {
                let _ = stock.push_candle(c);
            }
            stock.finish();
            (ticker, stock)
        })
        .collect()
}

impl Engine {
    /// Replay every symbol's bars together at the strategy's main timeframe,
    /// calling `strategy.on_tick_all` once per tick that has at least one
    /// symbol's bar. Returns the run's summary [`Metrics`], or `None` if
    /// fewer than two ticks were dispatched.
    #[instrument(skip(self, strategy))]
    pub async fn run_on_all_stocks(&mut self, strategy: &mut dyn Strategy) -> Result<Option<Metrics>> {
        let config = strategy.config().clone();
        let main_tf = config.main();
        let main_lookback = config.main_lookback() as i64;
        let datasource = self.datasource.clone();

        let ticks = generate_ticks(main_tf, self.start_date, self.end_date);
        let chunk_size = main_tf.all_stocks_chunk_size();

        // Non-main preloaded timeframes: sliding window refreshed on demand.
        let mut secondary_windows: TimeframeTable<i64> = TimeframeTable::new();
        let mut preloaded: TimeframeTable<HashMap<String, Stock>> = TimeframeTable::new();
        let secondary_specs: Vec<(Timeframe, usize)> = config
            .preloaded()
            .filter(|(tf, _)| *tf != main_tf)
            .map(|(tf, spec)| (tf, spec.count))
            .collect();

        for chunk in ticks.chunks(chunk_size) {
            let Some(&chunk_start) = chunk.first() else {
                continue;
            };
            let chunk_end = *chunk.last().expect("non-empty chunk");

            let range_start = chunk_start - 2 * main_lookback * main_tf.granularity_ms();
            let range_end = chunk_end + 4 * DAY_MS;
            let raw_main = datasource
                .range_all_symbols(main_tf, range_start, range_end)
                .await?;
            let main_stocks = stocks_from_candles(main_tf, raw_main);

            for &tick in chunk {
                for &(tf, count) in &secondary_specs {
                    let needs_refresh = match secondary_windows.get(tf) {
                        None => true,
                        Some(&window_end) => tick >= window_end,
                    };
                    if needs_refresh {
                        let window_start = tick - 3 * count as i64 * tf.granularity_ms();
                        let window_end = tick + tf.preload_window_ms();
                        let raw = datasource
                            .range_all_symbols(tf, window_start, window_end)
                            .await?;
                        preloaded.insert(tf, stocks_from_candles(tf, raw));
                        secondary_windows.insert(tf, window_end);
                    }
                }

                if tick < chunk_start || is_weekend_utc(tick) {
                    continue;
                }

                let mut entries: HashMap<String, Candle> = HashMap::new();
                for (ticker, stock) in &main_stocks {
                    let idx = stock.get_index(tick);
                    if let Some(candle) = stock.get_candle(idx) {
                        if candle.timestamp == tick {
                            entries.insert(ticker.clone(), candle);
                        }
                    }
                }

                for (ticker, &candle) in &entries {
                    self.stock_prices.insert(ticker.clone(), candle.close);
                }

                let held_tickers: Vec<String> = self.stock_balances.keys().cloned().collect();
                for ticker in held_tickers {
                    if entries.contains_key(&ticker) {
                        self.delist_counter.remove(&ticker);
                        continue;
                    }
                    let counter = self.delist_counter.entry(ticker.clone()).or_insert(0);
                    *counter += 1;
                    if *counter > super::DELISTING_THRESHOLD {
                        warn!(ticker = %ticker, "dropping delisted position");
                        self.stock_balances.remove(&ticker);
                        self.hold_since.remove(&ticker);
                        self.stock_features.remove(&ticker);
                        self.delist_counter.remove(&ticker);
                    }
                }

                if entries.is_empty() {
                    continue;
                }

                {
                    let mut ctx = AllTickContext {
                        current_date: tick,
                        entries: &entries,
                        engine: self,
                        main_stocks: &main_stocks,
                        preloaded: &preloaded,
                        datasource: &datasource,
                        config: &config,
                    };
                    strategy.on_tick_all(&mut ctx).await?;
                }

                self.equity_curve.push(EquityPoint {
                    timestamp: tick,
                    total_value: self.total_value(),
                    cash_balance: self.cash_balance,
                });
            }
        }

        Ok(compute_metrics(
            &self.equity_curve,
            &self.trades,
            self.start_cash_balance,
            self.start_date,
            self.end_date,
            main_tf,
        ))
    }
}

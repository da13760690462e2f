//! Single-symbol tick loop.

use tracing::instrument;

use crate::candle_buffer::CandleBuffer;
use crate::error::Result;
use crate::metrics::{compute_metrics, Metrics};
use crate::strategy::Strategy;
use crate::timeframe::TimeframeTable;

use super::context::SingleTickContext;
use super::{Engine, EquityPoint};

impl Engine {
    /// Replay `ticker` bar-by-bar at the strategy's main timeframe, calling
    /// `strategy.on_tick` once per bar in `[start_date, end_date)`. Returns
    /// the run's summary [`Metrics`], or `None` if fewer than two bars were
    /// dispatched (metrics need at least two equity-curve points).
    #[instrument(skip(self, strategy), fields(ticker = %ticker))]
    pub async fn run_on_stock(
        &mut self,
        ticker: &str,
        strategy: &mut dyn Strategy,
    ) -> Result<Option<Metrics>> {
        let config = strategy.config().clone();
        let main_tf = config.main();
        let datasource = self.datasource.clone();

        let mut buffers: TimeframeTable<CandleBuffer> = TimeframeTable::new();
        for (tf, spec) in config.preloaded() {
            let buffer = CandleBuffer::new(
                datasource.clone(),
                ticker,
                tf,
                self.start_date,
                self.end_date,
                spec.count,
            );
            buffers.insert(tf, buffer);
        }
        for (_, buffer) in buffers.iter_mut() {
            buffer.ensure(self.start_date).await?;
        }

        let main_lookback = config.main_lookback();
        let mut idx = main_lookback.saturating_sub(1);

        loop {
            let step = {
                let main_buffer = buffers.get(main_tf).expect("main timeframe always configured");
                match main_buffer.buffered().get(idx).copied() {
                    Some(c) if c.timestamp < self.end_date => Some(c),
                    _ => None,
                }
            };

            let Some(candle) = step else {
                let main_buffer = buffers.get(main_tf).expect("main timeframe always configured");
                if main_buffer.is_done() {
                    break;
                }
                // Not enough buffered yet at this index; pull more and retry.
                let probe_ts = self.end_date - 1;
                for (_, buffer) in buffers.iter_mut() {
                    buffer.ensure(probe_ts).await?;
                }
                let main_buffer = buffers.get(main_tf).expect("main timeframe always configured");
                if idx >= main_buffer.buffered().len() && main_buffer.is_done() {
                    break;
                }
                continue;
            };

            for (_, buffer) in buffers.iter_mut() {
                buffer.ensure(candle.timestamp).await?;
            }

            self.stock_prices.insert(ticker.to_string(), candle.close);

            {
                let mut ctx = SingleTickContext {
                    ticker,
                    candle,
                    current_ts: candle.timestamp,
                    engine: self,
                    buffers: &mut buffers,
                    config: &config,
                    datasource: &datasource,
                };
                strategy.on_tick(&mut ctx).await?;
            }

            self.equity_curve.push(EquityPoint {
                timestamp: candle.timestamp,
                total_value: self.total_value(),
                cash_balance: self.cash_balance,
            });

            idx += 1;
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

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;
    use crate::broker::AlpacaBroker;
    use crate::candle::Candle;
    use crate::datasource::InMemoryDataSource;
    use crate::engine::BacktestParams;
    use crate::strategy::StrategyConfig;
    use crate::timeframe::Timeframe;

    fn series(n: i64, step: i64, start_price: f64) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let price = start_price + i as f64;
                Candle::new(price, price, price, price, 1000, 10, i * step)
            })
            .collect()
    }

    struct BuyOnceStrategy {
        config: StrategyConfig,
        bought: bool,
    }

    #[async_trait]
    impl Strategy for BuyOnceStrategy {
        fn config(&self) -> &StrategyConfig {
            &self.config
        }

        async fn on_tick(&mut self, ctx: &mut SingleTickContext<'_>) -> Result<()> {
            if !self.bought {
                ctx.buy(1, ctx.candle().close)?;
                self.bought = true;
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn run_on_stock_appends_equity_curve_and_executes_buy() {
        let day = Timeframe::OneDay.granularity_ms();
        let candles = series(20, day, 100.0);
        let ds = Arc::new(InMemoryDataSource::new().with_candles("AAPL", Timeframe::OneDay, candles));
        let mut engine = Engine::new(BacktestParams {
            start_date: 5 * day,
            end_date: 15 * day,
            start_cash_balance: 10_000.0,
            broker: Arc::new(AlpacaBroker::new()),
            datasource: ds,
        })
        .unwrap();

        let config = StrategyConfig::builder().main(Timeframe::OneDay, 3).build().unwrap();
        let mut strategy = BuyOnceStrategy { config, bought: false };

        engine.run_on_stock("AAPL", &mut strategy).await.unwrap();

        assert!(!engine.equity_curve().is_empty());
        assert_eq!(engine.stock_balance("AAPL"), 1);
    }

    struct NoopStrategy {
        config: StrategyConfig,
    }

    #[async_trait]
    impl Strategy for NoopStrategy {
        fn config(&self) -> &StrategyConfig {
            &self.config
        }
    }

    #[tokio::test]
    async fn run_on_stock_rejects_unimplemented_callback() {
        let day = Timeframe::OneDay.granularity_ms();
        let candles = series(20, day, 100.0);
        let ds = Arc::new(InMemoryDataSource::new().with_candles("AAPL", Timeframe::OneDay, candles));
        let mut engine = Engine::new(BacktestParams {
            start_date: 5 * day,
            end_date: 15 * day,
            start_cash_balance: 10_000.0,
            broker: Arc::new(AlpacaBroker::new()),
            datasource: ds,
        })
        .unwrap();

        let config = StrategyConfig::builder().main(Timeframe::OneDay, 3).build().unwrap();
        let mut strategy = NoopStrategy { config };
        let err = engine.run_on_stock("AAPL", &mut strategy).await.unwrap_err();
        assert!(matches!(err, crate::error::EngineError::InvalidConfig(_)));
    }
}

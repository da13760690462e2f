//! Strategy configuration and the per-bar callback trait.

use async_trait::async_trait;

use crate::engine::context::{AllTickContext, SingleTickContext};
use crate::error::{EngineError, Result};
use crate::timeframe::{Timeframe, TimeframeTable};

/// Per-timeframe lookback configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeframeSpec {
    /// Number of past bars the strategy requires at this timeframe.
    pub count: usize,
    /// Whether bars should be streamed in advance via a [`crate::candle_buffer::CandleBuffer`]
    /// rather than fetched per request. The main timeframe is always `preload = true`.
    pub preload: bool,
}

/// Immutable strategy configuration: per-timeframe lookback counts and
/// exactly one "main" timeframe that drives the tick loop.
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    timeframes: TimeframeTable<TimeframeSpec>,
    main: Timeframe,
}

impl StrategyConfig {
    /// Start building a configuration.
    pub fn builder() -> StrategyConfigBuilder {
        StrategyConfigBuilder::default()
    }

    /// The main timeframe driving the tick loop.
    pub fn main(&self) -> Timeframe {
        self.main
    }

    /// The spec for `tf`, if configured.
    pub fn spec(&self, tf: Timeframe) -> Option<&TimeframeSpec> {
        self.timeframes.get(tf)
    }

    /// All preload-marked timeframes (always includes the main timeframe).
    pub fn preloaded(&self) -> impl Iterator<Item = (Timeframe, &TimeframeSpec)> {
        self.timeframes.iter().filter(|(_, spec)| spec.preload)
    }

    /// Main timeframe's required lookback count.
    pub fn main_lookback(&self) -> usize {
        self.spec(self.main).map(|s| s.count).unwrap_or(1)
    }
}

/// Builder for [`StrategyConfig`].
#[derive(Debug, Default)]
pub struct StrategyConfigBuilder {
    timeframes: TimeframeTable<TimeframeSpec>,
    main: Option<Timeframe>,
}

impl StrategyConfigBuilder {
    /// Designate `tf` as the main timeframe with lookback `count`. Implicitly `preload = true`.
    /// Calling this more than once is an error at `build()` time.
    pub fn main(mut self, tf: Timeframe, count: usize) -> Self {
        self.timeframes.insert(tf, TimeframeSpec { count, preload: true });
        self.main = Some(tf);
        self
    }

    /// Add a secondary (non-main) timeframe requirement.
    pub fn timeframe(mut self, tf: Timeframe, count: usize, preload: bool) -> Self {
        self.timeframes.insert(tf, TimeframeSpec { count, preload });
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> Result<StrategyConfig> {
        let main = self
            .main
            .ok_or_else(|| EngineError::InvalidConfig("exactly one main timeframe is required".into()))?;

        for (tf, spec) in self.timeframes.iter() {
            if spec.count == 0 {
                return Err(EngineError::InvalidConfig(format!(
                    "timeframe {:?} has non-positive lookback count",
                    tf
                )));
            }
        }

        Ok(StrategyConfig {
            timeframes: self.timeframes,
            main,
        })
    }
}

/// A user-defined decision procedure replayed bar-by-bar.
///
/// Implementors provide whichever of `on_tick` (single-symbol mode) or
/// `on_tick_all` (all-symbols mode) they support; the engine only ever
/// calls the one matching the run mode it was invoked with. The default
/// implementations reject the mode as unsupported, since a strategy written
/// for single-symbol replay generally isn't meaningful driven tick-by-tick
/// across many tickers at once (and vice versa).
#[async_trait]
pub trait Strategy: Send {
    /// The immutable per-timeframe configuration for this strategy.
    fn config(&self) -> &StrategyConfig;

    /// Called once per bar in single-symbol mode (`Engine::run_on_stock`).
    async fn on_tick(&mut self, _ctx: &mut SingleTickContext<'_>) -> Result<()> {
        Err(EngineError::InvalidConfig(
            "strategy does not implement single-symbol on_tick".into(),
        ))
    }

    /// Called once per tick in all-symbols mode (`Engine::run_on_all_stocks`).
    async fn on_tick_all(&mut self, _ctx: &mut AllTickContext<'_>) -> Result<()> {
        Err(EngineError::InvalidConfig(
            "strategy does not implement all-symbols on_tick_all".into(),
        ))
    }
}

// Trading strategy module
pub mod ema_cross;
pub mod macd_trend;
pub mod rsi_reversal;

use crate::models::{Candle, Signal};
use clap::ValueEnum;
use serde::Deserialize;

pub use ema_cross::EmaCross;
pub use macd_trend::MacdTrend;
pub use rsi_reversal::RsiReversal;

/// Base trait for all trading strategies.
///
/// Implementations are pure: same candles, same signal, no I/O. A strategy
/// must never fail — when the series is shorter than its own lookback it
/// returns [`Signal::None`].
pub trait Strategy: Send + Sync {
    /// Directional signal for one instrument's candle series.
    fn signal(&self, candles: &[Candle]) -> Signal;

    /// Get strategy name
    fn name(&self) -> &'static str;

    /// Minimum candles this strategy needs before it can say anything.
    fn min_candles(&self) -> usize;
}

/// The closed set of registered strategies, selectable from the CLI
/// (`--strategy`) or the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyId {
    /// RSI(14) reversal out of oversold/overbought
    Rsi,
    /// MACD histogram cross filtered by EMA(200) trend
    Macd,
    /// EMA(50)/EMA(200) crossover
    Ema,
}

/// Resolve a strategy id into an instance. Called once at startup; the
/// engine never special-cases a concrete strategy after this point.
pub fn create_strategy(id: StrategyId) -> Box<dyn Strategy> {
    match id {
        StrategyId::Rsi => Box::new(RsiReversal::default()),
        StrategyId::Macd => Box::new(MacdTrend::default()),
        StrategyId::Ema => Box::new(EmaCross::default()),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_resolves_every_id() {
        assert_eq!(create_strategy(StrategyId::Rsi).name(), "rsi-reversal");
        assert_eq!(create_strategy(StrategyId::Macd).name(), "macd-trend");
        assert_eq!(create_strategy(StrategyId::Ema).name(), "ema-cross");
    }

    #[test]
    fn test_every_strategy_returns_none_on_empty_series() {
        for id in [StrategyId::Rsi, StrategyId::Macd, StrategyId::Ema] {
            let strategy = create_strategy(id);
            assert_eq!(strategy.signal(&[]), Signal::None, "{}", strategy.name());
        }
    }
}

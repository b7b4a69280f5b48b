use super::Strategy;
use crate::indicators::calculate_rsi;
use crate::models::{Candle, Signal};

/// RSI reversal strategy.
///
/// Goes long when RSI climbs back out of the oversold zone (previous bar
/// below the threshold, last bar above it) and short on the mirrored exit
/// from the overbought zone.
#[derive(Debug, Clone)]
pub struct RsiReversal {
    period: usize,
    oversold: f64,
    overbought: f64,
}

impl RsiReversal {
    pub fn new(period: usize, oversold: f64, overbought: f64) -> Self {
        Self {
            period,
            oversold,
            overbought,
        }
    }
}

impl Default for RsiReversal {
    fn default() -> Self {
        Self::new(14, 30.0, 70.0)
    }
}

impl Strategy for RsiReversal {
    fn signal(&self, candles: &[Candle]) -> Signal {
        if candles.len() < self.min_candles() {
            return Signal::None;
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

        // RSI at the last bar and at the bar before it
        let last = calculate_rsi(&closes, self.period);
        let prev = calculate_rsi(&closes[..closes.len() - 1], self.period);

        match (prev, last) {
            (Some(prev), Some(last)) => {
                if prev < self.oversold && last > self.oversold {
                    Signal::Up
                } else if prev > self.overbought && last < self.overbought {
                    Signal::Down
                } else {
                    Signal::None
                }
            }
            _ => Signal::None,
        }
    }

    fn name(&self) -> &'static str {
        "rsi-reversal"
    }

    fn min_candles(&self) -> usize {
        // Two consecutive RSI values, each needing period + 1 closes
        self.period + 2
    }
}

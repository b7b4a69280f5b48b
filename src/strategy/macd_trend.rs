use super::Strategy;
use crate::indicators::{ema_series, macd_histogram};
use crate::models::{Candle, Signal};

/// MACD histogram cross filtered by a long EMA trend.
///
/// Long when the histogram was negative three bars ago, is positive now,
/// and price trades above the trend EMA; short on the mirrored setup below
/// the trend EMA. The trend filter keeps counter-trend crosses out.
#[derive(Debug, Clone)]
pub struct MacdTrend {
    fast: usize,
    slow: usize,
    signal_period: usize,
    trend_period: usize,
}

impl MacdTrend {
    pub fn new(fast: usize, slow: usize, signal_period: usize, trend_period: usize) -> Self {
        Self {
            fast,
            slow,
            signal_period,
            trend_period,
        }
    }
}

impl Default for MacdTrend {
    fn default() -> Self {
        Self::new(12, 26, 9, 200)
    }
}

impl Strategy for MacdTrend {
    fn signal(&self, candles: &[Candle]) -> Signal {
        if candles.len() < self.min_candles() {
            return Signal::None;
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

        let (hist, trend) = match (
            macd_histogram(&closes, self.fast, self.slow, self.signal_period),
            ema_series(&closes, self.trend_period),
        ) {
            (Some(hist), Some(trend)) => (hist, trend),
            _ => return Signal::None,
        };

        let n = closes.len();
        let last_close = closes[n - 1];
        let last_trend = trend[n - 1];

        if hist[n - 3] < 0.0 && hist[n - 1] > 0.0 && last_trend < last_close {
            Signal::Up
        } else if hist[n - 3] > 0.0 && hist[n - 1] < 0.0 && last_trend > last_close {
            Signal::Down
        } else {
            Signal::None
        }
    }

    fn name(&self) -> &'static str {
        "macd-trend"
    }

    fn min_candles(&self) -> usize {
        // The trend EMA dominates; +3 for the histogram lookback
        self.trend_period + 3
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::test_support::candles_from_closes;

    /// Uptrend with a short dip and recovery: the histogram dips negative
    /// and crosses back up while price stays above the trend EMA.
    fn dip_and_recover_closes() -> Vec<f64> {
        let mut closes: Vec<f64> = (0..250).map(|i| 100.0 + i as f64 * 0.5).collect();
        let top = *closes.last().unwrap();
        closes.extend((0..10).map(|i| top - (i + 1) as f64 * 2.0));
        let bottom = *closes.last().unwrap();
        closes.extend((0..15).map(|i| bottom + (i + 1) as f64 * 3.0));
        closes
    }

    #[test]
    fn test_insufficient_data_is_none() {
        let strategy = MacdTrend::default();
        let closes: Vec<f64> = (0..100).map(|i| 100.0 + i as f64).collect();
        assert_eq!(strategy.signal(&candles_from_closes(&closes)), Signal::None);
    }

    #[test]
    fn test_flat_market_is_none() {
        let strategy = MacdTrend::default();
        let closes = vec![100.0; 250];
        assert_eq!(strategy.signal(&candles_from_closes(&closes)), Signal::None);
    }

    #[test]
    fn test_bullish_cross_above_trend_is_up() {
        let strategy = MacdTrend::default();
        let closes = dip_and_recover_closes();

        // Find the bar where the histogram crossing condition holds and cut
        // the series there, so the cross lands on the last bar.
        let hist = macd_histogram(&closes, 12, 26, 9).unwrap();
        let trend = ema_series(&closes, 200).unwrap();
        let cross = (202..closes.len())
            .find(|&i| hist[i - 2] < 0.0 && hist[i] > 0.0 && trend[i] < closes[i])
            .expect("test series must contain a bullish cross");

        let candles = candles_from_closes(&closes[..=cross]);
        assert_eq!(strategy.signal(&candles), Signal::Up);
    }

    #[test]
    fn test_bearish_cross_below_trend_is_down() {
        let strategy = MacdTrend::default();
        // Mirror image of the bullish fixture
        let closes: Vec<f64> = dip_and_recover_closes().iter().map(|c| 500.0 - c).collect();

        let hist = macd_histogram(&closes, 12, 26, 9).unwrap();
        let trend = ema_series(&closes, 200).unwrap();
        let cross = (202..closes.len())
            .find(|&i| hist[i - 2] > 0.0 && hist[i] < 0.0 && trend[i] > closes[i])
            .expect("test series must contain a bearish cross");

        let candles = candles_from_closes(&closes[..=cross]);
        assert_eq!(strategy.signal(&candles), Signal::Down);
    }
}

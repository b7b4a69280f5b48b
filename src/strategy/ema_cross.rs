use super::Strategy;
use crate::indicators::ema_series;
use crate::models::{Candle, Signal};

/// Golden/death cross of a fast EMA over a slow EMA.
///
/// Long when the fast EMA was below the slow EMA three bars ago and is above
/// it now; short on the opposite cross.
#[derive(Debug, Clone)]
pub struct EmaCross {
    fast: usize,
    slow: usize,
}

impl EmaCross {
    pub fn new(fast: usize, slow: usize) -> Self {
        Self { fast, slow }
    }
}

impl Default for EmaCross {
    fn default() -> Self {
        Self::new(50, 200)
    }
}

impl Strategy for EmaCross {
    fn signal(&self, candles: &[Candle]) -> Signal {
        if candles.len() < self.min_candles() {
            return Signal::None;
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

        let (fast, slow) = match (
            ema_series(&closes, self.fast),
            ema_series(&closes, self.slow),
        ) {
            (Some(fast), Some(slow)) => (fast, slow),
            _ => return Signal::None,
        };

        let n = closes.len();
        if fast[n - 3] < slow[n - 3] && fast[n - 1] > slow[n - 1] {
            Signal::Up
        } else if fast[n - 3] > slow[n - 3] && fast[n - 1] < slow[n - 1] {
            Signal::Down
        } else {
            Signal::None
        }
    }

    fn name(&self) -> &'static str {
        "ema-cross"
    }

    fn min_candles(&self) -> usize {
        self.slow + 3
    }
}

/// Exponential moving average over the whole series.
///
/// Seeded with the first price and smoothed with alpha = 2 / (period + 1),
/// so the output is aligned index-for-index with the input. Returns `None`
/// when the series is shorter than `period`.
pub fn ema_series(prices: &[f64], period: usize) -> Option<Vec<f64>> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let mut ema = Vec::with_capacity(prices.len());
    ema.push(prices[0]);

    for price in &prices[1..] {
        let prev = *ema.last().unwrap();
        ema.push(alpha * price + (1.0 - alpha) * prev);
    }

    Some(ema)
}

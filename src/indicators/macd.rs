use super::ema::ema_series;

/// MACD histogram: (EMA(fast) − EMA(slow)) − EMA(signal) of that difference.
///
/// Output is aligned with the input series. Returns `None` when the series
/// is too short for the slow or signal EMA.
pub fn macd_histogram(
    prices: &[f64],
    fast: usize,
    slow: usize,
    signal: usize,
) -> Option<Vec<f64>> {
    let fast_ema = ema_series(prices, fast)?;
    let slow_ema = ema_series(prices, slow)?;

    let macd_line: Vec<f64> = fast_ema
        .iter()
        .zip(slow_ema.iter())
        .map(|(f, s)| f - s)
        .collect();

    let signal_line = ema_series(&macd_line, signal)?;

    Some(
        macd_line
            .iter()
            .zip(signal_line.iter())
            .map(|(m, s)| m - s)
            .collect(),
    )
}

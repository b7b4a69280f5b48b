// Pure indicator math over close-price series
pub mod ema;
pub mod macd;
pub mod rsi;

pub use ema::ema_series;
pub use macd::macd_histogram;
pub use rsi::calculate_rsi;

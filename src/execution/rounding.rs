/// Round a price or quantity to a fixed number of decimal places.
///
/// Exchanges reject submissions with more decimals than the instrument
/// allows, so every outgoing price and quantity passes through here exactly
/// once. Anything still off after rounding is the exchange's call to refuse.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rounds_to_requested_places() {
        assert_eq!(round_to(0.123456, 3), 0.123);
        assert_eq!(round_to(99.09999999, 1), 99.1);
        assert_eq!(round_to(5.0, 0), 5.0);
    }

    #[test]
    fn test_bracket_price_values() {
        // notional 10 at price 100 with 1 decimal of quantity precision
        assert_eq!(round_to(10.0 / 100.0, 1), 0.1);
        // stop and take-profit for the buy side at price 100
        assert_eq!(round_to(100.0 * (1.0 - 0.009), 1), 99.1);
        assert_eq!(round_to(100.0 * (1.0 + 0.012), 1), 101.2);
        // and the sell side
        assert_eq!(round_to(100.0 * (1.0 + 0.009), 1), 100.9);
        assert_eq!(round_to(100.0 * (1.0 - 0.012), 1), 98.8);
    }

    #[test]
    fn test_rounding_is_idempotent() {
        for (value, decimals) in [
            (101.19999999999999, 1),
            (0.1003, 2),
            (123.456789, 4),
            (-7.25, 1),
        ] {
            let once = round_to(value, decimals);
            assert_eq!(round_to(once, decimals), once);
        }
    }
}

//! Small helpers shared across the crate
pub mod formula;

/// Round a value to `precision` decimal places, returning it unchanged when `precision` is `None`
pub(crate) fn round_to_precision(value: f64, precision: Option<i32>) -> f64 {
    match precision {
        Some(digits) if value.is_finite() => {
            let scale = 10f64.powi(digits);
            (value * scale).round() / scale
        }
        _ => value,
    }
}

#[cfg(test)]
mod utils_tests {
    use super::round_to_precision;

    #[test]
    fn rounding() {
        assert_eq!(round_to_precision(1.23456, Some(2)), 1.23);
        assert_eq!(round_to_precision(1.23456, None), 1.23456);
        assert!(round_to_precision(f64::INFINITY, Some(3)).is_infinite());
    }
}

//! Fixed-format coordinate numbers shared by the Gerber and Excellon readers.

/// Which zeros a coordinate without a decimal point omits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZeroSuppression {
    /// Leading zeros omitted: digits are aligned to the right.
    Leading,
    /// Trailing zeros omitted: digits are aligned to the left.
    Trailing,
}

/// Decode one coordinate.
///
/// A literal decimal point always wins over the digit format. Returns `None`
/// for malformed input.
pub fn parse_coordinate(
    raw: &str,
    int_digits: u32,
    frac_digits: u32,
    zeros: ZeroSuppression,
) -> Option<f64> {
    let raw = raw.trim();
    if raw.contains('.') {
        return raw.parse().ok().filter(|v: &f64| v.is_finite());
    }
    let (sign, digits) = match raw.as_bytes().first() {
        Some(b'-') => (-1.0, &raw[1..]),
        Some(b'+') => (1.0, &raw[1..]),
        _ => (1.0, raw),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let value: f64 = digits.parse().ok()?;
    let scaled = match zeros {
        ZeroSuppression::Leading => value / 10f64.powi(frac_digits as i32),
        ZeroSuppression::Trailing => {
            let missing = (int_digits + frac_digits) as i32 - digits.len() as i32;
            value * 10f64.powi(missing) / 10f64.powi(frac_digits as i32)
        }
    };
    Some(sign * scaled)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Option<f64>, b: f64) -> bool {
        a.is_some_and(|a| (a - b).abs() < 1e-12)
    }

    #[test]
    fn test_leading_zero_suppression() {
        assert!(close(parse_coordinate("10000", 2, 4, ZeroSuppression::Leading), 1.0));
        assert!(close(parse_coordinate("-2500", 2, 4, ZeroSuppression::Leading), -0.25));
        assert!(close(parse_coordinate("0", 2, 4, ZeroSuppression::Leading), 0.0));
    }

    #[test]
    fn test_trailing_zero_suppression() {
        assert!(close(parse_coordinate("01", 2, 4, ZeroSuppression::Trailing), 1.0));
        assert!(close(parse_coordinate("0125", 2, 4, ZeroSuppression::Trailing), 1.25));
        assert!(close(parse_coordinate("-015", 2, 4, ZeroSuppression::Trailing), -1.5));
    }

    #[test]
    fn test_decimal_point_and_garbage() {
        assert!(close(parse_coordinate("1.5", 2, 4, ZeroSuppression::Trailing), 1.5));
        assert!(parse_coordinate("", 2, 4, ZeroSuppression::Leading).is_none());
        assert!(parse_coordinate("12a4", 2, 4, ZeroSuppression::Leading).is_none());
        assert!(parse_coordinate("-", 2, 4, ZeroSuppression::Leading).is_none());
    }
}

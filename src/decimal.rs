//! Fixed-point exact numeric values.
//!
//! Currency and decimal/numeric provider values must keep their precision,
//! so they are carried as an integer mantissa plus a decimal scale rather
//! than as floats. This is the same shape the TDS wire format uses.

use std::fmt;
use std::str::FromStr;

use crate::error::AdoDbError;

#[derive(Debug, Clone, Copy)]
pub struct Decimal {
    mantissa: i128,
    scale: u32,
}

impl Decimal {
    pub const ZERO: Decimal = Decimal {
        mantissa: 0,
        scale: 0,
    };

    /// Build from an already-scaled mantissa: `from_scaled(12345, 2)` is
    /// `123.45`.
    #[must_use]
    pub fn from_scaled(mantissa: i128, scale: u32) -> Self {
        Self { mantissa, scale }
    }

    #[must_use]
    pub fn from_int(value: i64) -> Self {
        Self {
            mantissa: i128::from(value),
            scale: 0,
        }
    }

    #[must_use]
    pub fn mantissa(&self) -> i128 {
        self.mantissa
    }

    #[must_use]
    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// Parse a plain decimal literal: optional sign, digits, optional
    /// fractional part. No exponent form, no locale handling (the
    /// culture-tolerant retry lives in the conversion layer).
    pub fn parse(text: &str) -> Result<Self, AdoDbError> {
        let trimmed = text.trim();
        let bad = || AdoDbError::Data(format!("invalid decimal literal {text:?}"));

        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };
        if digits.is_empty() {
            return Err(bad());
        }

        let mut mantissa: i128 = 0;
        let mut scale: u32 = 0;
        let mut seen_point = false;
        let mut seen_digit = false;
        for ch in digits.chars() {
            match ch {
                '.' if !seen_point => seen_point = true,
                '0'..='9' => {
                    let digit = i128::from(ch as u8 - b'0');
                    mantissa = mantissa
                        .checked_mul(10)
                        .and_then(|m| m.checked_add(digit))
                        .ok_or_else(bad)?;
                    if seen_point {
                        scale += 1;
                    }
                    seen_digit = true;
                }
                _ => return Err(bad()),
            }
        }
        if !seen_digit {
            return Err(bad());
        }
        if negative {
            mantissa = -mantissa;
        }
        Ok(Self { mantissa, scale })
    }

    /// Strip trailing fractional zeros: `123.400` becomes `123.4`.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        while self.scale > 0 && self.mantissa % 10 == 0 {
            self.mantissa /= 10;
            self.scale -= 1;
        }
        self
    }

    /// Number of digits in the normalized rendering, sign and decimal
    /// point excluded.
    #[must_use]
    pub fn digit_count(&self) -> u32 {
        let rendered = self.normalized().to_string();
        rendered.chars().filter(char::is_ascii_digit).count() as u32
    }

    #[must_use]
    pub fn to_f64(&self) -> f64 {
        self.mantissa as f64 / 10f64.powi(self.scale as i32)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.scale == 0 {
            return write!(f, "{}", self.mantissa);
        }
        let magnitude = self.mantissa.unsigned_abs();
        let divisor = 10u128.pow(self.scale);
        let whole = magnitude / divisor;
        let fraction = magnitude % divisor;
        let sign = if self.mantissa < 0 { "-" } else { "" };
        write!(
            f,
            "{sign}{whole}.{fraction:0width$}",
            width = self.scale as usize
        )
    }
}

impl FromStr for Decimal {
    type Err = AdoDbError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Decimal::parse(text)
    }
}

impl From<i64> for Decimal {
    fn from(value: i64) -> Self {
        Decimal::from_int(value)
    }
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool {
        let a = self.normalized();
        let b = other.normalized();
        if a.scale == b.scale {
            return a.mantissa == b.mantissa;
        }
        // Align the smaller scale up; normalized values overflow here only
        // far beyond any representable provider numeric.
        let (low, high) = if a.scale < b.scale { (a, b) } else { (b, a) };
        match 10i128
            .checked_pow(high.scale - low.scale)
            .and_then(|factor| low.mantissa.checked_mul(factor))
        {
            Some(aligned) => aligned == high.mantissa,
            None => false,
        }
    }
}

impl Eq for Decimal {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_renders() {
        let d = Decimal::parse("1234.56").unwrap();
        assert_eq!(d.mantissa(), 123_456);
        assert_eq!(d.scale(), 2);
        assert_eq!(d.to_string(), "1234.56");

        assert_eq!(Decimal::parse("-0.075").unwrap().to_string(), "-0.075");
        assert_eq!(Decimal::parse("42").unwrap().to_string(), "42");
        assert_eq!(Decimal::parse("+7.5").unwrap().to_string(), "7.5");
    }

    #[test]
    fn rejects_junk() {
        assert!(Decimal::parse("").is_err());
        assert!(Decimal::parse("abc").is_err());
        assert!(Decimal::parse("1.2.3").is_err());
        assert!(Decimal::parse("3,14").is_err());
        assert!(Decimal::parse("-").is_err());
    }

    #[test]
    fn normalization_strips_trailing_zeros() {
        let d = Decimal::from_scaled(123_400, 3).normalized();
        assert_eq!(d.mantissa(), 1234);
        assert_eq!(d.scale(), 1);
        assert_eq!(d.to_string(), "123.4");
    }

    #[test]
    fn equality_is_scale_insensitive() {
        assert_eq!(
            Decimal::from_scaled(123_400, 3),
            Decimal::parse("123.4").unwrap()
        );
        assert_eq!(Decimal::from_scaled(500, 2), Decimal::from_scaled(5, 0));
        assert_ne!(Decimal::from_scaled(51, 1), Decimal::from_scaled(5, 0));
    }

    #[test]
    fn digit_counts() {
        assert_eq!(Decimal::parse("1234.56").unwrap().digit_count(), 6);
        assert_eq!(Decimal::parse("0.5").unwrap().digit_count(), 2);
        assert_eq!(Decimal::parse("-12").unwrap().digit_count(), 2);
    }

    #[test]
    fn to_f64_scales() {
        assert!((Decimal::from_scaled(123_400, 3).to_f64() - 123.4).abs() < 1e-9);
    }
}

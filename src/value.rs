//! Host-side values.
//!
//! `Value` is the unified representation exchanged with callers: query
//! parameters go in as `Value`s and fetched cells come back as `Value`s.

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};

use crate::decimal::Decimal;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    /// Fixed-width integer (maps to the provider's integer type).
    Int(i32),
    /// Wide integer (maps to the provider's big integer type).
    BigInt(i64),
    Float(f64),
    Text(String),
    Blob(Vec<u8>),
    Decimal(Decimal),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
}

impl Value {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer view, widening `Int` to 64 bits.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(i64::from(*value)),
            Value::BigInt(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        if let Value::Float(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let Value::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let Value::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }

    /// Boolean view; integer zero/one also read as booleans.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            Value::Int(0) | Value::BigInt(0) => Some(false),
            Value::Int(1) | Value::BigInt(1) => Some(true),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_decimal(&self) -> Option<Decimal> {
        if let Value::Decimal(value) = self {
            Some(*value)
        } else {
            None
        }
    }

    /// Timestamp view; a bare date reads as midnight.
    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Timestamp(value) => Some(*value),
            Value::Date(date) => Some(date.and_time(NaiveTime::MIN)),
            _ => None,
        }
    }
}

/// DB-API `DateFromTicks`: a date from seconds since the Unix epoch,
/// interpreted in local time.
#[must_use]
pub fn date_from_ticks(ticks: i64) -> Option<Value> {
    let local = Local.timestamp_opt(ticks, 0).single()?;
    Some(Value::Date(local.date_naive()))
}

/// DB-API `TimeFromTicks`.
#[must_use]
pub fn time_from_ticks(ticks: i64) -> Option<Value> {
    let local = Local.timestamp_opt(ticks, 0).single()?;
    Some(Value::Time(local.time()))
}

/// DB-API `TimestampFromTicks`.
#[must_use]
pub fn timestamp_from_ticks(ticks: i64) -> Option<Value> {
    let local = Local.timestamp_opt(ticks, 0).single()?;
    Some(Value::Timestamp(local.naive_local()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors() {
        assert_eq!(Value::Int(7).as_int(), Some(7));
        assert_eq!(Value::BigInt(1 << 40).as_int(), Some(1 << 40));
        assert_eq!(Value::Text("x".into()).as_text(), Some("x"));
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Int(1).as_bool(), Some(true));
        assert_eq!(Value::Int(2).as_bool(), None);
        assert!(Value::Null.is_null());
        assert_eq!(Value::Null.as_int(), None);
    }

    #[test]
    fn date_reads_as_midnight_timestamp() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(
            Value::Date(date).as_timestamp(),
            Some(date.and_time(NaiveTime::MIN))
        );
    }

    #[test]
    fn tick_constructors_produce_the_matching_variant() {
        assert!(matches!(date_from_ticks(0), Some(Value::Date(_))));
        assert!(matches!(time_from_ticks(0), Some(Value::Time(_))));
        assert!(matches!(timestamp_from_ticks(0), Some(Value::Timestamp(_))));
    }
}

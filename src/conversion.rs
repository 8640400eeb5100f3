//! Provider variant → host value conversion tables.
//!
//! Conversion is keyed by the column's (or parameter's) provider type code:
//! grouped entries are checked in order, first match wins, and codes with no
//! entry fall back to the identity mapping. A null variant is always the
//! host null, before any table lookup.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use lazy_static::lazy_static;
use regex::Regex;

use crate::decimal::Decimal;
use crate::error::AdoDbError;
use crate::provider::Variant;
use crate::types::{self, TypeCode};
use crate::value::Value;

/// Milliseconds in a day, for decoding the fractional part of a serial date.
const MILLISECONDS_PER_DAY: f64 = 86_400_000.0;

lazy_static! {
    /// Day zero of the COM serial date encoding.
    pub(crate) static ref COM_EPOCH: NaiveDate =
        NaiveDate::from_ymd_opt(1899, 12, 30).expect("fixed epoch date");

    // Providers sometimes hand back datetime text with microsecond
    // precision; anything past milliseconds is dropped before parsing.
    static ref EXCESS_FRACTION: Regex =
        Regex::new(r"^(\d{4}-\d\d?-\d\d? \d\d?:\d\d?:\d\d?\.\d{3})\d{3}$")
            .expect("fixed pattern");
}

/// A single conversion function from the table.
pub type Converter = fn(&Variant) -> Result<Value, AdoDbError>;

// First match wins; the currency entry intentionally shadows adCurrency
// inside the exact-numeric group further down.
const CONVERSIONS: &[(&[TypeCode], Converter)] = &[
    (types::DATETIME_TYPES, decode_serial_date),
    (types::APPROXIMATE_NUMERIC_TYPES, to_float),
    (&[types::AD_CURRENCY], decode_currency),
    (types::BOOLEAN_TYPES, to_bool),
    (types::LONG_TYPES, to_big_int),
    (types::ROW_ID_TYPES, to_big_int),
    (types::INTEGER_TYPES, to_int),
    (types::BINARY_TYPES, to_blob),
    (types::EXACT_NUMERIC_TYPES, to_decimal),
];

/// The converter responsible for a type code.
#[must_use]
pub fn converter_for(type_code: TypeCode) -> Converter {
    for (codes, converter) in CONVERSIONS {
        if codes.contains(&type_code) {
            return *converter;
        }
    }
    identity
}

/// Convert one provider cell to a host value.
pub fn convert_variant(variant: &Variant, type_code: TypeCode) -> Result<Value, AdoDbError> {
    if matches!(variant, Variant::Null) {
        return Ok(Value::Null);
    }
    converter_for(type_code)(variant)
}

fn identity(variant: &Variant) -> Result<Value, AdoDbError> {
    Ok(Value::from(variant))
}

/// The no-conversion mapping used for unmatched type codes.
impl From<&Variant> for Value {
    fn from(variant: &Variant) -> Self {
        match variant {
            Variant::Null => Value::Null,
            Variant::Bool(value) => Value::Bool(*value),
            Variant::SmallInt(value) => Value::Int(i32::from(*value)),
            Variant::Int(value) => Value::Int(*value),
            Variant::BigInt(value) => Value::BigInt(*value),
            Variant::Single(value) => Value::Float(f64::from(*value)),
            Variant::Double(value) => Value::Float(*value),
            Variant::Text(value) => Value::Text(value.clone()),
            Variant::Bytes(value) => Value::Blob(value.clone()),
            Variant::Currency { hi, lo } => Value::Decimal(currency_decimal(*hi, *lo)),
            Variant::DateSerial(value) => Value::Float(*value),
            Variant::Timestamp(value) => Value::Timestamp(*value),
            Variant::Numeric(value) => Value::Decimal(*value),
        }
    }
}

fn conversion_error(target: &str, variant: &Variant) -> AdoDbError {
    AdoDbError::Data(format!("cannot convert {variant:?} to {target}"))
}

/// Reassemble the 64-bit scaled currency integer from its 32-bit words,
/// correcting a low word that was sign-misread as negative.
pub(crate) fn combine_currency(hi: i32, lo: i32) -> i64 {
    let mut low = i64::from(lo);
    if low < 0 {
        low += 1i64 << 32;
    }
    (i64::from(hi) << 32) + low
}

fn currency_decimal(hi: i32, lo: i32) -> Decimal {
    Decimal::from_scaled(i128::from(combine_currency(hi, lo)), 3)
}

fn decode_currency(variant: &Variant) -> Result<Value, AdoDbError> {
    match variant {
        Variant::Currency { hi, lo } => Ok(Value::Decimal(currency_decimal(*hi, *lo))),
        // Some providers hand the scaled integer back pre-combined.
        Variant::BigInt(raw) => Ok(Value::Decimal(Decimal::from_scaled(i128::from(*raw), 3))),
        Variant::Numeric(value) => Ok(Value::Decimal(*value)),
        // Or already descaled to a plain number (TDS money arrives so).
        Variant::Double(value) => Decimal::parse(&value.to_string()).map(Value::Decimal),
        Variant::Single(value) => Decimal::parse(&value.to_string()).map(Value::Decimal),
        other => Err(conversion_error("currency", other)),
    }
}

fn decode_serial_date(variant: &Variant) -> Result<Value, AdoDbError> {
    match variant {
        Variant::DateSerial(serial) => serial_to_timestamp(*serial),
        Variant::Double(serial) => serial_to_timestamp(*serial),
        Variant::Single(serial) => serial_to_timestamp(f64::from(*serial)),
        Variant::Timestamp(value) => Ok(Value::Timestamp(*value)),
        Variant::Text(text) => parse_datetime_text(text),
        other => Err(conversion_error("timestamp", other)),
    }
}

fn serial_to_timestamp(serial: f64) -> Result<Value, AdoDbError> {
    let out_of_range = || AdoDbError::Data(format!("serial date {serial} is out of range"));
    if !serial.is_finite() {
        return Err(out_of_range());
    }
    let day_count = serial.trunc() as i64;
    let fraction = (serial - serial.trunc()).abs();
    let millis = (fraction * MILLISECONDS_PER_DAY).round() as i64;

    let date = COM_EPOCH
        .checked_add_signed(Duration::days(day_count))
        .ok_or_else(out_of_range)?;
    let timestamp = date
        .and_time(NaiveTime::MIN)
        .checked_add_signed(Duration::milliseconds(millis))
        .ok_or_else(out_of_range)?;
    Ok(Value::Timestamp(timestamp))
}

fn parse_datetime_text(text: &str) -> Result<Value, AdoDbError> {
    let munged = EXCESS_FRACTION
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map_or(text, |m| m.as_str());

    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(timestamp) = NaiveDateTime::parse_from_str(munged, format) {
            return Ok(Value::Timestamp(timestamp));
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(munged, "%Y-%m-%d") {
        return Ok(Value::Timestamp(date.and_time(NaiveTime::MIN)));
    }
    Err(AdoDbError::Data(format!(
        "cannot parse {text:?} as a timestamp"
    )))
}

/// Parse numeric text, retrying with `,` read as the decimal point for
/// locale-formatted input.
fn culture_parse_f64(text: &str) -> Result<f64, AdoDbError> {
    let trimmed = text.trim();
    if let Ok(value) = trimmed.parse::<f64>() {
        return Ok(value);
    }
    trimmed
        .replace(',', ".")
        .parse::<f64>()
        .map_err(|_| AdoDbError::Data(format!("cannot parse numeric text {text:?}")))
}

fn culture_parse_decimal(text: &str) -> Result<Decimal, AdoDbError> {
    let trimmed = text.trim();
    if let Ok(value) = Decimal::parse(trimmed) {
        return Ok(value);
    }
    Decimal::parse(&trimmed.replace(',', "."))
        .map_err(|_| AdoDbError::Data(format!("cannot parse numeric text {text:?}")))
}

fn to_float(variant: &Variant) -> Result<Value, AdoDbError> {
    match variant {
        Variant::Double(value) => Ok(Value::Float(*value)),
        Variant::Single(value) => Ok(Value::Float(f64::from(*value))),
        Variant::SmallInt(value) => Ok(Value::Float(f64::from(*value))),
        Variant::Int(value) => Ok(Value::Float(f64::from(*value))),
        Variant::BigInt(value) => Ok(Value::Float(*value as f64)),
        Variant::Numeric(value) => Ok(Value::Float(value.to_f64())),
        Variant::Text(text) => culture_parse_f64(text).map(Value::Float),
        other => Err(conversion_error("float", other)),
    }
}

fn to_decimal(variant: &Variant) -> Result<Value, AdoDbError> {
    match variant {
        Variant::Numeric(value) => Ok(Value::Decimal(*value)),
        Variant::SmallInt(value) => Ok(Value::Decimal(Decimal::from_int(i64::from(*value)))),
        Variant::Int(value) => Ok(Value::Decimal(Decimal::from_int(i64::from(*value)))),
        Variant::BigInt(value) => Ok(Value::Decimal(Decimal::from_int(*value))),
        Variant::Currency { hi, lo } => Ok(Value::Decimal(currency_decimal(*hi, *lo))),
        Variant::Double(value) => Decimal::parse(&value.to_string()).map(Value::Decimal),
        Variant::Single(value) => Decimal::parse(&value.to_string()).map(Value::Decimal),
        Variant::Text(text) => culture_parse_decimal(text).map(Value::Decimal),
        other => Err(conversion_error("decimal", other)),
    }
}

fn to_bool(variant: &Variant) -> Result<Value, AdoDbError> {
    match variant {
        Variant::Bool(value) => Ok(Value::Bool(*value)),
        Variant::SmallInt(value) => Ok(Value::Bool(*value != 0)),
        Variant::Int(value) => Ok(Value::Bool(*value != 0)),
        Variant::BigInt(value) => Ok(Value::Bool(*value != 0)),
        other => Err(conversion_error("boolean", other)),
    }
}

fn to_int(variant: &Variant) -> Result<Value, AdoDbError> {
    let overflow = |variant: &Variant| conversion_error("32-bit integer", variant);
    match variant {
        Variant::Int(value) => Ok(Value::Int(*value)),
        Variant::SmallInt(value) => Ok(Value::Int(i32::from(*value))),
        Variant::BigInt(value) => i32::try_from(*value)
            .map(Value::Int)
            .map_err(|_| overflow(variant)),
        Variant::Bool(value) => Ok(Value::Int(i32::from(*value))),
        Variant::Double(value) if value.trunc() >= f64::from(i32::MIN)
            && value.trunc() <= f64::from(i32::MAX) =>
        {
            Ok(Value::Int(value.trunc() as i32))
        }
        Variant::Single(value)
            if f64::from(value.trunc()) >= f64::from(i32::MIN)
                && f64::from(value.trunc()) <= f64::from(i32::MAX) =>
        {
            Ok(Value::Int(value.trunc() as i32))
        }
        Variant::Text(text) => text
            .trim()
            .parse::<i32>()
            .map(Value::Int)
            .map_err(|_| conversion_error("32-bit integer", variant)),
        other => Err(conversion_error("32-bit integer", other)),
    }
}

fn to_big_int(variant: &Variant) -> Result<Value, AdoDbError> {
    match variant {
        Variant::BigInt(value) => Ok(Value::BigInt(*value)),
        Variant::Int(value) => Ok(Value::BigInt(i64::from(*value))),
        Variant::SmallInt(value) => Ok(Value::BigInt(i64::from(*value))),
        Variant::Bool(value) => Ok(Value::BigInt(i64::from(*value))),
        Variant::Double(value)
            if value.trunc() >= i64::MIN as f64 && value.trunc() <= i64::MAX as f64 =>
        {
            Ok(Value::BigInt(value.trunc() as i64))
        }
        Variant::Text(text) => text
            .trim()
            .parse::<i64>()
            .map(Value::BigInt)
            .map_err(|_| conversion_error("64-bit integer", variant)),
        other => Err(conversion_error("64-bit integer", other)),
    }
}

fn to_blob(variant: &Variant) -> Result<Value, AdoDbError> {
    match variant {
        Variant::Bytes(bytes) => Ok(Value::Blob(bytes.clone())),
        Variant::Text(text) => Ok(Value::Blob(text.as_bytes().to_vec())),
        other => Err(conversion_error("binary", other)),
    }
}

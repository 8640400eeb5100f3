//! Parameter binding: host value → provider parameter.
//!
//! The binder infers a provider type code from the host value's variant,
//! then configures the parameter's value, size, and (for exact numerics)
//! precision and scale the way the provider expects them.

use chrono::NaiveTime;

use crate::conversion::COM_EPOCH;
use crate::error::AdoDbError;
use crate::provider::Variant;
use crate::types::{self, TypeCode};
use crate::value::Value;

/// Direction of a command parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamDirection {
    Unknown,
    Input,
    Output,
    InputOutput,
    ReturnValue,
}

impl ParamDirection {
    /// The ADO `adParam*` constant for this direction.
    #[must_use]
    pub fn ado_value(self) -> u8 {
        match self {
            ParamDirection::Unknown => 0,
            ParamDirection::Input => 1,
            ParamDirection::Output => 2,
            ParamDirection::InputOutput => 3,
            ParamDirection::ReturnValue => 4,
        }
    }

    /// Whether a host value is bound for this direction. Output-only and
    /// return-value parameters are filled by the provider, not by us.
    #[must_use]
    pub fn accepts_value(self) -> bool {
        matches!(
            self,
            ParamDirection::Unknown | ParamDirection::Input | ParamDirection::InputOutput
        )
    }
}

/// One command parameter, as handed to the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub type_code: TypeCode,
    pub direction: ParamDirection,
    /// Provider size convention: character/byte count, −1 for
    /// "unspecified".
    pub size: i64,
    pub precision: u8,
    pub numeric_scale: u8,
    pub value: Variant,
}

impl Parameter {
    #[must_use]
    pub fn new(name: impl Into<String>, type_code: TypeCode) -> Self {
        Self {
            name: name.into(),
            type_code,
            direction: ParamDirection::Input,
            size: 0,
            precision: 0,
            numeric_scale: 0,
            value: Variant::Null,
        }
    }

    #[must_use]
    pub fn with_direction(mut self, direction: ParamDirection) -> Self {
        self.direction = direction;
        self
    }

    /// Append a chunk of a streamed binary payload.
    pub fn append_chunk(&mut self, chunk: &[u8]) {
        match &mut self.value {
            Variant::Bytes(buffer) => buffer.extend_from_slice(chunk),
            _ => self.value = Variant::Bytes(chunk.to_vec()),
        }
    }
}

/// Provider type code for a host value, keyed on its runtime variant.
#[must_use]
pub fn infer_type_code(value: &Value) -> TypeCode {
    match value {
        Value::Text(_) => types::AD_BSTR,
        Value::Blob(_) => types::AD_BINARY,
        Value::Float(_) => types::AD_DOUBLE,
        Value::Int(_) => types::AD_INTEGER,
        Value::BigInt(_) => types::AD_BIG_INT,
        Value::Bool(_) => types::AD_BOOLEAN,
        Value::Decimal(_) => types::AD_NUMERIC,
        Value::Date(_) | Value::Time(_) | Value::Timestamp(_) => types::AD_DATE,
        // A null argument to a stored procedure binds as a NULL of the
        // provider's most tolerant type.
        Value::Null => types::AD_BSTR,
    }
}

/// The provider-native form of a host value.
#[must_use]
pub fn value_to_variant(value: &Value) -> Variant {
    match value {
        Value::Null => Variant::Null,
        Value::Bool(v) => Variant::Bool(*v),
        Value::Int(v) => Variant::Int(*v),
        Value::BigInt(v) => Variant::BigInt(*v),
        Value::Float(v) => Variant::Double(*v),
        Value::Text(v) => Variant::Text(v.clone()),
        Value::Blob(v) => Variant::Bytes(v.clone()),
        Value::Decimal(v) => Variant::Numeric(*v),
        Value::Date(v) => Variant::Timestamp(v.and_time(NaiveTime::MIN)),
        // A bare time is a fractional day on the serial-date day zero.
        Value::Time(v) => Variant::Timestamp(COM_EPOCH.and_time(*v)),
        Value::Timestamp(v) => Variant::Timestamp(*v),
    }
}

/// Configure `parameter` from a host value: value, size, and for exact
/// numerics the precision/scale pair.
pub fn configure(parameter: &mut Parameter, value: &Value) -> Result<(), AdoDbError> {
    if !parameter.direction.accepts_value() {
        // An output/return parameter carries no inbound value; its size is
        // unspecified, which the provider convention renders as -1.
        parameter.size = -1;
        return Ok(());
    }

    match value {
        Value::Text(text) => {
            parameter.value = Variant::Text(text.clone());
            parameter.size = text.chars().count() as i64;
        }
        Value::Blob(bytes) => {
            parameter.size = bytes.len() as i64;
            parameter.append_chunk(bytes);
        }
        Value::Decimal(decimal) => {
            let normalized = decimal.normalized();
            let rendered = normalized.to_string();
            parameter.value = Variant::Numeric(normalized);

            let digits = rendered.chars().filter(char::is_ascii_digit).count();
            parameter.precision = u8::try_from(digits).map_err(|_| {
                AdoDbError::Data(format!(
                    "decimal {rendered} exceeds the provider's precision range"
                ))
            })?;
            // Scale follows the provider's length-from-point convention:
            // everything from the decimal point to the end of the string.
            parameter.numeric_scale = rendered
                .find('.')
                .map_or(0, |point| (rendered.len() - point) as u8);
        }
        other => {
            // Everything else is assigned as-is; the provider marshals it.
            parameter.value = value_to_variant(other);
        }
    }

    // The provider convention for empty strings and buffers is -1, not a
    // zero-length payload.
    if parameter.size == 0 {
        parameter.size = -1;
    }
    Ok(())
}

/// Render a parameter list for failure reports.
#[must_use]
pub fn format_parameters(parameters: &[Parameter]) -> String {
    let entries: Vec<String> = parameters
        .iter()
        .map(|parameter| {
            format!(
                "Name: {}, Type: {}, Size: {}",
                parameter.name,
                types::describe_type(parameter.type_code),
                parameter.size
            )
        })
        .collect();
    format!("[{}]", entries.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversion::convert_variant;
    use crate::decimal::Decimal;

    fn configured(value: &Value) -> Parameter {
        let mut parameter = Parameter::new("p0", infer_type_code(value));
        configure(&mut parameter, value).unwrap();
        parameter
    }

    #[test]
    fn text_sets_value_and_character_size() {
        let parameter = configured(&Value::Text("héllo".into()));
        assert_eq!(parameter.type_code, types::AD_BSTR);
        assert_eq!(parameter.size, 5);
        assert_eq!(parameter.value, Variant::Text("héllo".into()));
    }

    #[test]
    fn empty_text_and_blob_report_unspecified_size() {
        assert_eq!(configured(&Value::Text(String::new())).size, -1);
        assert_eq!(configured(&Value::Blob(Vec::new())).size, -1);
    }

    #[test]
    fn blob_is_appended_as_a_chunk() {
        let parameter = configured(&Value::Blob(vec![1, 2, 3]));
        assert_eq!(parameter.type_code, types::AD_BINARY);
        assert_eq!(parameter.size, 3);
        assert_eq!(parameter.value, Variant::Bytes(vec![1, 2, 3]));
    }

    #[test]
    fn decimal_precision_and_scale_follow_the_length_rules() {
        let parameter = configured(&Value::Decimal(Decimal::parse("1234.56").unwrap()));
        assert_eq!(parameter.type_code, types::AD_NUMERIC);
        assert_eq!(parameter.precision, 6);
        assert_eq!(parameter.numeric_scale, 3);

        let whole = configured(&Value::Decimal(Decimal::parse("1200").unwrap()));
        assert_eq!(whole.precision, 4);
        assert_eq!(whole.numeric_scale, 0);
    }

    #[test]
    fn output_parameters_are_left_unconfigured() {
        let mut parameter =
            Parameter::new("ret", types::AD_INTEGER).with_direction(ParamDirection::Output);
        configure(&mut parameter, &Value::Int(42)).unwrap();
        assert_eq!(parameter.value, Variant::Null);
        assert_eq!(parameter.size, -1);
    }

    #[test]
    fn inferred_codes_cover_every_variant() {
        assert_eq!(infer_type_code(&Value::Float(1.0)), types::AD_DOUBLE);
        assert_eq!(infer_type_code(&Value::Int(1)), types::AD_INTEGER);
        assert_eq!(infer_type_code(&Value::BigInt(1)), types::AD_BIG_INT);
        assert_eq!(infer_type_code(&Value::Bool(true)), types::AD_BOOLEAN);
        assert_eq!(infer_type_code(&Value::Null), types::AD_BSTR);
        assert_eq!(
            infer_type_code(&Value::Timestamp(
                COM_EPOCH.and_time(chrono::NaiveTime::MIN)
            )),
            types::AD_DATE
        );
    }

    #[test]
    fn bound_values_round_trip_through_the_conversion_tables() {
        let values = [
            Value::Text("round trip".into()),
            Value::Blob(vec![0xDE, 0xAD]),
            Value::Float(2.25),
            Value::Int(-7),
            Value::BigInt(1 << 40),
            Value::Bool(true),
            Value::Decimal(Decimal::parse("12.75").unwrap()),
        ];
        for value in values {
            let parameter = configured(&value);
            let back = convert_variant(&parameter.value, parameter.type_code).unwrap();
            assert_eq!(back, value, "round trip failed for {value:?}");
        }
    }

    #[test]
    fn timestamps_round_trip_through_the_date_code() {
        let ts = chrono::NaiveDate::from_ymd_opt(2023, 6, 1)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        let parameter = configured(&Value::Timestamp(ts));
        assert_eq!(
            convert_variant(&parameter.value, parameter.type_code).unwrap(),
            Value::Timestamp(ts)
        );
    }

    #[test]
    fn format_parameters_renders_the_dump() {
        let mut ok = Parameter::new("p0", types::AD_INTEGER);
        configure(&mut ok, &Value::Int(5)).unwrap();
        let odd = Parameter::new("p1", 999);
        let dump = format_parameters(&[ok, odd]);
        assert_eq!(
            dump,
            "[Name: p0, Type: adInteger, Size: -1, Name: p1, Type: 999 (unknown type), Size: 0]"
        );
    }
}

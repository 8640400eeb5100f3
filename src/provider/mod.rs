// Provider module - the capability seam between the driver core and a
// concrete data-access backend
//
// This module is split into:
// - mod: the capability traits, the provider variant type, and a shared
//   forward-only recordset over materialized result data
// - mssql: a Tiberius-backed TDS provider (feature "mssql")

use std::collections::VecDeque;

use chrono::NaiveDateTime;

use crate::config::{CursorLocation, IsolationLevel};
use crate::decimal::Decimal;
use crate::error::AdoDbError;
use crate::params::Parameter;
use crate::types::TypeCode;

#[cfg(feature = "mssql")]
pub mod mssql;

/// Name of the provider capability property whose positive value signals
/// transaction support.
pub const TRANSACTION_DDL_PROPERTY: &str = "Transaction DDL";

/// A provider-native tagged value, as found in result cells and command
/// parameters. The COM VARIANT of the original object model, rendered as a
/// closed enum.
#[derive(Debug, Clone, PartialEq)]
pub enum Variant {
    Null,
    Bool(bool),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Single(f32),
    Double(f64),
    Text(String),
    Bytes(Vec<u8>),
    /// Raw currency payload: two 32-bit words of a scaled 64-bit integer.
    Currency { hi: i32, lo: i32 },
    /// COM serial date: days since 1899-12-30 plus a fractional day.
    DateSerial(f64),
    Timestamp(NaiveDateTime),
    Numeric(Decimal),
}

impl Variant {
    /// Size of the value as a field payload, in characters or bytes.
    #[must_use]
    pub fn payload_size(&self) -> i64 {
        match self {
            Variant::Null => 0,
            Variant::Bool(_) | Variant::SmallInt(_) => 2,
            Variant::Int(_) | Variant::Single(_) => 4,
            Variant::BigInt(_)
            | Variant::Double(_)
            | Variant::Currency { .. }
            | Variant::DateSerial(_)
            | Variant::Timestamp(_) => 8,
            Variant::Text(text) => text.chars().count() as i64,
            Variant::Bytes(bytes) => bytes.len() as i64,
            Variant::Numeric(_) => 19,
        }
    }
}

/// Kind of command handed to the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Text,
    StoredProcedure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordsetState {
    Open,
    Closed,
}

/// Transaction-ending behavior reported by the provider. A retaining
/// commit/abort automatically opens the next transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransactionAttributes {
    pub commit_retaining: bool,
    pub abort_retaining: bool,
}

/// Static column definition as declared by the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub type_code: TypeCode,
    pub defined_size: i64,
    pub precision: u8,
    pub numeric_scale: u8,
    pub attributes: u32,
}

impl FieldDef {
    #[must_use]
    pub fn new(name: impl Into<String>, type_code: TypeCode) -> Self {
        Self {
            name: name.into(),
            type_code,
            defined_size: 0,
            precision: 0,
            numeric_scale: 0,
            attributes: 0,
        }
    }

    #[must_use]
    pub fn with_defined_size(mut self, size: i64) -> Self {
        self.defined_size = size;
        self
    }

    #[must_use]
    pub fn with_precision(mut self, precision: u8) -> Self {
        self.precision = precision;
        self
    }

    #[must_use]
    pub fn with_numeric_scale(mut self, scale: u8) -> Self {
        self.numeric_scale = scale;
        self
    }

    #[must_use]
    pub fn with_nullable(mut self, nullable: bool) -> Self {
        if nullable {
            self.attributes |= crate::types::FIELD_MAY_BE_NULL;
        } else {
            self.attributes &= !crate::types::FIELD_MAY_BE_NULL;
        }
        self
    }
}

/// A column definition plus the size of the value at the recordset's
/// current position (absent when there is no current record).
#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub name: String,
    pub type_code: TypeCode,
    pub actual_size: Option<i64>,
    pub defined_size: i64,
    pub precision: u8,
    pub numeric_scale: u8,
    pub attributes: u32,
}

/// Result of executing a provider command: an optional row-returning
/// recordset and the affected-row count (−1 when not determinable).
pub struct ExecuteOutcome {
    pub recordset: Option<Box<dyn ProviderRecordset>>,
    pub rows_affected: i64,
}

/// An open connection into the backing data-access layer.
pub trait ProviderConnection: Send {
    /// Look up a capability property by name.
    fn property(&self, name: &str) -> Option<i64>;

    fn attributes(&self) -> TransactionAttributes;

    fn set_isolation_level(&mut self, level: IsolationLevel) -> Result<(), AdoDbError>;

    fn set_cursor_location(&mut self, location: CursorLocation) -> Result<(), AdoDbError>;

    fn begin_transaction(&mut self) -> Result<(), AdoDbError>;

    fn commit_transaction(&mut self) -> Result<(), AdoDbError>;

    fn rollback_transaction(&mut self) -> Result<(), AdoDbError>;

    /// Build a command bound to this connection, inheriting its timeout.
    fn create_command(
        &mut self,
        kind: CommandKind,
    ) -> Result<Box<dyn ProviderCommand + '_>, AdoDbError>;

    /// Close the underlying handle.
    fn close(&mut self) -> Result<(), AdoDbError>;

    /// Tear down host-side coordination resources (runtime, thread
    /// affinity). Always called exactly once, after `close`, even when
    /// `close` failed.
    fn release(&mut self);
}

/// A single executable command.
pub trait ProviderCommand {
    fn set_text(&mut self, sql: &str);

    /// The provider-native placeholder token for the parameter at
    /// `index` (zero-based, counting bound parameters only).
    fn parameter_token(&self, index: usize) -> String {
        let _ = index;
        "?".to_string()
    }

    fn append_parameter(&mut self, parameter: Parameter);

    /// The command's parameter list; after a successful `execute` the
    /// values reflect provider-updated output parameters.
    fn parameters(&self) -> &[Parameter];

    fn execute(&mut self) -> Result<ExecuteOutcome, AdoDbError>;
}

/// A forward-only result set.
pub trait ProviderRecordset: Send {
    fn state(&self) -> RecordsetState;

    fn is_bof(&self) -> bool;

    fn is_eof(&self) -> bool;

    fn fields(&self) -> Vec<FieldInfo>;

    /// Pull up to `limit` rows (all remaining when `None`) in
    /// column-major order, advancing the cursor position.
    fn get_rows(&mut self, limit: Option<usize>) -> Result<Vec<Vec<Variant>>, AdoDbError>;

    /// Advance to the next result set, if the provider produced one.
    fn next_recordset(&mut self) -> Result<Option<Box<dyn ProviderRecordset>>, AdoDbError>;

    fn close(&mut self);
}

/// One fully materialized result set: column definitions plus
/// column-major cell data.
#[derive(Debug, Clone)]
pub struct RecordsetData {
    pub fields: Vec<FieldDef>,
    pub columns: Vec<Vec<Variant>>,
}

impl RecordsetData {
    #[must_use]
    pub fn new(fields: Vec<FieldDef>, columns: Vec<Vec<Variant>>) -> Self {
        debug_assert!(
            columns.windows(2).all(|pair| pair[0].len() == pair[1].len()),
            "ragged column data"
        );
        Self { fields, columns }
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }
}

/// Shared forward-only recordset over materialized data, used by the TDS
/// provider and the test mock alike.
pub struct MaterializedRecordset {
    data: RecordsetData,
    followers: VecDeque<RecordsetData>,
    position: usize,
    closed: bool,
    next_supported: bool,
}

impl MaterializedRecordset {
    #[must_use]
    pub fn new(data: RecordsetData) -> Self {
        Self {
            data,
            followers: VecDeque::new(),
            position: 0,
            closed: false,
            next_supported: true,
        }
    }

    /// Build from an ordered list of result sets; `None` when the list is
    /// empty.
    #[must_use]
    pub fn from_sets(mut sets: Vec<RecordsetData>) -> Option<Self> {
        if sets.is_empty() {
            return None;
        }
        let first = sets.remove(0);
        let mut recordset = Self::new(first);
        recordset.followers = sets.into();
        Some(recordset)
    }

    /// Make `next_recordset` fail, for providers that reject the call.
    pub fn deny_next_recordset(&mut self) {
        self.next_supported = false;
    }
}

impl ProviderRecordset for MaterializedRecordset {
    fn state(&self) -> RecordsetState {
        if self.closed {
            RecordsetState::Closed
        } else {
            RecordsetState::Open
        }
    }

    fn is_bof(&self) -> bool {
        // An empty recordset opens positioned at both BOF and EOF.
        self.data.row_count() == 0
    }

    fn is_eof(&self) -> bool {
        self.position >= self.data.row_count()
    }

    fn fields(&self) -> Vec<FieldInfo> {
        let has_current = !self.closed && !self.is_bof() && !self.is_eof();
        self.data
            .fields
            .iter()
            .enumerate()
            .map(|(index, def)| FieldInfo {
                name: def.name.clone(),
                type_code: def.type_code,
                actual_size: if has_current {
                    self.data
                        .columns
                        .get(index)
                        .and_then(|column| column.get(self.position))
                        .map(Variant::payload_size)
                } else {
                    None
                },
                defined_size: def.defined_size,
                precision: def.precision,
                numeric_scale: def.numeric_scale,
                attributes: def.attributes,
            })
            .collect()
    }

    fn get_rows(&mut self, limit: Option<usize>) -> Result<Vec<Vec<Variant>>, AdoDbError> {
        if self.closed {
            return Err(AdoDbError::General("recordset is closed".into()));
        }
        let total = self.data.row_count();
        let end = limit.map_or(total, |n| total.min(self.position.saturating_add(n)));
        let start = self.position.min(end);
        let slices = self
            .data
            .columns
            .iter()
            .map(|column| column[start..end].to_vec())
            .collect();
        self.position = end;
        Ok(slices)
    }

    fn next_recordset(&mut self) -> Result<Option<Box<dyn ProviderRecordset>>, AdoDbError> {
        if !self.next_supported {
            return Err(AdoDbError::NotSupported(
                "the provider does not support multiple result sets here".into(),
            ));
        }
        match self.followers.pop_front() {
            None => Ok(None),
            Some(next) => {
                let followers = std::mem::take(&mut self.followers);
                self.closed = true;
                Ok(Some(Box::new(MaterializedRecordset {
                    data: next,
                    followers,
                    position: 0,
                    closed: false,
                    next_supported: self.next_supported,
                })))
            }
        }
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AD_INTEGER, AD_VAR_WCHAR};

    fn sample() -> MaterializedRecordset {
        MaterializedRecordset::new(RecordsetData::new(
            vec![
                FieldDef::new("id", AD_INTEGER).with_nullable(false),
                FieldDef::new("name", AD_VAR_WCHAR)
                    .with_defined_size(50)
                    .with_nullable(true),
            ],
            vec![
                vec![Variant::Int(1), Variant::Int(2), Variant::Int(3)],
                vec![
                    Variant::Text("ada".into()),
                    Variant::Text("grace".into()),
                    Variant::Text("edsger".into()),
                ],
            ],
        ))
    }

    #[test]
    fn pulls_rows_in_column_major_batches() {
        let mut rs = sample();
        assert!(!rs.is_bof());
        assert!(!rs.is_eof());

        let first = rs.get_rows(Some(2)).unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0], vec![Variant::Int(1), Variant::Int(2)]);
        assert!(!rs.is_eof());

        let rest = rs.get_rows(None).unwrap();
        assert_eq!(rest[0], vec![Variant::Int(3)]);
        assert!(rs.is_eof());

        let empty = rs.get_rows(Some(5)).unwrap();
        assert!(empty[0].is_empty());
    }

    #[test]
    fn fields_report_actual_size_only_with_a_current_record() {
        let rs = sample();
        let fields = rs.fields();
        assert_eq!(fields[0].actual_size, Some(4));
        assert_eq!(fields[1].actual_size, Some(3));
        assert_eq!(fields[1].defined_size, 50);
        assert!(fields[1].attributes & crate::types::FIELD_MAY_BE_NULL != 0);
        assert!(fields[0].attributes & crate::types::FIELD_MAY_BE_NULL == 0);

        let empty = MaterializedRecordset::new(RecordsetData::new(
            vec![FieldDef::new("id", AD_INTEGER)],
            vec![vec![]],
        ));
        assert!(empty.is_bof());
        assert!(empty.is_eof());
        assert_eq!(empty.fields()[0].actual_size, None);
    }

    #[test]
    fn advances_through_follower_sets() {
        let follower = RecordsetData::new(
            vec![FieldDef::new("total", AD_INTEGER)],
            vec![vec![Variant::Int(99)]],
        );
        let mut rs = MaterializedRecordset::from_sets(vec![sample().data, follower]).unwrap();

        let mut next = rs.next_recordset().unwrap().unwrap();
        assert_eq!(rs.state(), RecordsetState::Closed);
        let rows = next.get_rows(None).unwrap();
        assert_eq!(rows[0], vec![Variant::Int(99)]);
        assert!(next.next_recordset().unwrap().is_none());
    }

    #[test]
    fn next_recordset_can_be_denied() {
        let mut rs = sample();
        rs.deny_next_recordset();
        assert!(matches!(
            rs.next_recordset(),
            Err(AdoDbError::NotSupported(_))
        ));
    }
}

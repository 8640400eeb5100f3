//! Command execution and result materialization for the TDS provider.

use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use tiberius::{ColumnData, ColumnType, FromSql, Query};
use tokio::runtime::Runtime;
use tracing::debug;

use super::TdsClient;
use crate::conversion::COM_EPOCH;
use crate::decimal::Decimal;
use crate::error::AdoDbError;
use crate::params::{ParamDirection, Parameter};
use crate::provider::{
    CommandKind, ExecuteOutcome, FieldDef, MaterializedRecordset, ProviderCommand,
    ProviderRecordset, RecordsetData, Variant,
};
use crate::types::{self, TypeCode};

pub(crate) struct TdsCommand<'a> {
    runtime: &'a Runtime,
    client: &'a mut TdsClient,
    timeout: Duration,
    kind: CommandKind,
    text: String,
    parameters: Vec<Parameter>,
}

impl<'a> TdsCommand<'a> {
    pub(crate) fn new(
        runtime: &'a Runtime,
        client: &'a mut TdsClient,
        timeout: Duration,
        kind: CommandKind,
    ) -> Self {
        Self {
            runtime,
            client,
            timeout,
            kind,
            text: String::new(),
            parameters: Vec::new(),
        }
    }

    /// Run the row-returning path, materializing every result set.
    fn run_query(&mut self, query: Query<'static>) -> Result<ExecuteOutcome, AdoDbError> {
        let timeout = self.timeout;
        let client = &mut *self.client;
        let (first_fields, row_sets) = self.runtime.block_on(async {
            let work = async {
                let mut stream = query.query(client).await?;
                let first_fields: Option<Vec<FieldDef>> =
                    stream.columns().await?.map(fields_from_columns);
                let sets = stream.into_results().await?;
                Ok::<_, tiberius::error::Error>((first_fields, sets))
            };
            match tokio::time::timeout(timeout, work).await {
                Ok(result) => result.map_err(AdoDbError::from),
                Err(_) => Err(AdoDbError::Operational(format!(
                    "command timed out after {timeout:?}"
                ))),
            }
        })?;

        let mut sets_data: Vec<RecordsetData> = Vec::with_capacity(row_sets.len());
        for (set_index, rows) in row_sets.into_iter().enumerate() {
            // Stream metadata covers an empty first set; later sets only
            // carry metadata on their rows.
            let fields = if set_index == 0 {
                first_fields
                    .clone()
                    .or_else(|| rows.first().map(|row| fields_from_columns(row.columns())))
            } else {
                rows.first().map(|row| fields_from_columns(row.columns()))
            };
            let Some(fields) = fields else {
                continue;
            };

            let mut columns: Vec<Vec<Variant>> = vec![Vec::with_capacity(rows.len()); fields.len()];
            for row in rows {
                for (index, cell) in row.into_iter().enumerate() {
                    if let Some(column) = columns.get_mut(index) {
                        column.push(column_data_to_variant(cell)?);
                    }
                }
            }
            sets_data.push(RecordsetData::new(fields, columns));
        }

        let recordset = MaterializedRecordset::from_sets(sets_data)
            .map(|rs| Box::new(rs) as Box<dyn ProviderRecordset>);
        // Row-returning executions never know their total on a
        // forward-only cursor.
        Ok(ExecuteOutcome {
            recordset,
            rows_affected: -1,
        })
    }

    /// Run the count-returning path.
    fn run_execute(&mut self, query: Query<'static>) -> Result<ExecuteOutcome, AdoDbError> {
        let timeout = self.timeout;
        let client = &mut *self.client;
        let affected: u64 = self.runtime.block_on(async {
            let work = async {
                let result = query.execute(client).await?;
                Ok::<u64, tiberius::error::Error>(result.rows_affected().iter().sum())
            };
            match tokio::time::timeout(timeout, work).await {
                Ok(result) => result.map_err(AdoDbError::from),
                Err(_) => Err(AdoDbError::Operational(format!(
                    "command timed out after {timeout:?}"
                ))),
            }
        })?;
        debug!(rows = affected, "statement executed");
        Ok(ExecuteOutcome {
            recordset: None,
            rows_affected: i64::try_from(affected).unwrap_or(i64::MAX),
        })
    }
}

impl ProviderCommand for TdsCommand<'_> {
    fn set_text(&mut self, sql: &str) {
        self.text = sql.to_string();
    }

    fn parameter_token(&self, index: usize) -> String {
        format!("@P{}", index + 1)
    }

    fn append_parameter(&mut self, parameter: Parameter) {
        self.parameters.push(parameter);
    }

    fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    fn execute(&mut self) -> Result<ExecuteOutcome, AdoDbError> {
        for parameter in &self.parameters {
            if parameter.direction != ParamDirection::Input {
                return Err(AdoDbError::NotSupported(
                    "the TDS provider supports input parameters only".into(),
                ));
            }
        }

        let sql = match self.kind {
            CommandKind::Text => self.text.clone(),
            CommandKind::StoredProcedure => exec_call(&self.text, self.parameters.len()),
        };
        let mut query = Query::new(sql);
        for parameter in &self.parameters {
            bind_variant(&mut query, &parameter.value);
        }

        if returns_rows(&self.text, self.kind) {
            self.run_query(query)
        } else {
            self.run_execute(query)
        }
    }
}

/// Statement routing: row-returning statements go through the query path,
/// everything else through the count path.
fn returns_rows(sql: &str, kind: CommandKind) -> bool {
    if kind == CommandKind::StoredProcedure {
        return true;
    }
    let first = sql.trim_start().split_whitespace().next().unwrap_or("");
    if first.eq_ignore_ascii_case("SELECT") || first.eq_ignore_ascii_case("WITH") {
        return true;
    }
    // DML with an OUTPUT clause returns rows too.
    sql.split_whitespace()
        .any(|word| word.eq_ignore_ascii_case("OUTPUT"))
}

fn exec_call(procname: &str, parameter_count: usize) -> String {
    if parameter_count == 0 {
        return format!("EXEC {procname}");
    }
    let tokens: Vec<String> = (1..=parameter_count).map(|i| format!("@P{i}")).collect();
    format!("EXEC {procname} {}", tokens.join(", "))
}

fn fields_from_columns(columns: &[tiberius::Column]) -> Vec<FieldDef> {
    columns
        .iter()
        .map(|column| {
            // TDS column metadata does not expose nullability; report
            // every column as possibly null.
            FieldDef::new(column.name(), ado_type_code(column.column_type())).with_nullable(true)
        })
        .collect()
}

fn bind_variant(query: &mut Query<'_>, variant: &Variant) {
    match variant {
        Variant::Null => query.bind(Option::<String>::None),
        Variant::Bool(v) => query.bind(*v),
        Variant::SmallInt(v) => query.bind(*v),
        Variant::Int(v) => query.bind(*v),
        Variant::BigInt(v) => query.bind(*v),
        Variant::Single(v) => query.bind(*v),
        Variant::Double(v) => query.bind(*v),
        Variant::Text(v) => query.bind(v.clone()),
        Variant::Bytes(v) => query.bind(v.clone()),
        Variant::Currency { hi, lo } => {
            let combined = crate::conversion::combine_currency(*hi, *lo);
            query.bind(tiberius::numeric::Numeric::new_with_scale(
                i128::from(combined),
                3,
            ));
        }
        Variant::DateSerial(v) => query.bind(*v),
        Variant::Timestamp(v) => query.bind(*v),
        Variant::Numeric(v) => {
            let scale = u8::try_from(v.scale()).unwrap_or(u8::MAX);
            query.bind(tiberius::numeric::Numeric::new_with_scale(
                v.mantissa(),
                scale,
            ));
        }
    }
}

fn column_data_to_variant(data: ColumnData<'static>) -> Result<Variant, AdoDbError> {
    let decode_failure =
        |e: tiberius::error::Error| AdoDbError::Data(format!("temporal decode failed: {e}"));
    match data {
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            let value = NaiveDateTime::from_sql(&data).map_err(decode_failure)?;
            Ok(value.map_or(Variant::Null, Variant::Timestamp))
        }
        ColumnData::DateTimeOffset(_) => {
            let value = chrono::DateTime::<Utc>::from_sql(&data).map_err(decode_failure)?;
            Ok(value.map_or(Variant::Null, |v| Variant::Timestamp(v.naive_utc())))
        }
        ColumnData::Date(_) => {
            let value = NaiveDate::from_sql(&data).map_err(decode_failure)?;
            Ok(value.map_or(Variant::Null, |d| {
                Variant::Timestamp(d.and_time(NaiveTime::MIN))
            }))
        }
        ColumnData::Time(_) => {
            let value = NaiveTime::from_sql(&data).map_err(decode_failure)?;
            Ok(value.map_or(Variant::Null, |t| Variant::Timestamp(COM_EPOCH.and_time(t))))
        }
        ColumnData::U8(value) => Ok(value.map_or(Variant::Null, |v| Variant::SmallInt(i16::from(v)))),
        ColumnData::I16(value) => Ok(value.map_or(Variant::Null, Variant::SmallInt)),
        ColumnData::I32(value) => Ok(value.map_or(Variant::Null, Variant::Int)),
        ColumnData::I64(value) => Ok(value.map_or(Variant::Null, Variant::BigInt)),
        ColumnData::F32(value) => Ok(value.map_or(Variant::Null, Variant::Single)),
        ColumnData::F64(value) => Ok(value.map_or(Variant::Null, Variant::Double)),
        ColumnData::Bit(value) => Ok(value.map_or(Variant::Null, Variant::Bool)),
        ColumnData::String(value) => {
            Ok(value.map_or(Variant::Null, |v| Variant::Text(v.into_owned())))
        }
        ColumnData::Guid(value) => Ok(value.map_or(Variant::Null, |g| Variant::Text(g.to_string()))),
        ColumnData::Binary(value) => {
            Ok(value.map_or(Variant::Null, |b| Variant::Bytes(b.into_owned())))
        }
        ColumnData::Numeric(value) => Ok(value.map_or(Variant::Null, |n| {
            Variant::Numeric(Decimal::from_scaled(n.value(), u32::from(n.scale())))
        })),
        ColumnData::Xml(value) => Ok(value.map_or(Variant::Null, |x| Variant::Text(x.to_string()))),
    }
}

/// Map TDS column types onto the ADO type codes the driver reports.
#[allow(unreachable_patterns)]
fn ado_type_code(column_type: ColumnType) -> TypeCode {
    match column_type {
        ColumnType::Null => types::AD_EMPTY,
        ColumnType::Bit | ColumnType::Bitn => types::AD_BOOLEAN,
        ColumnType::Int1 => types::AD_TINY_INT,
        ColumnType::Int2 => types::AD_SMALL_INT,
        ColumnType::Int4 | ColumnType::Intn => types::AD_INTEGER,
        ColumnType::Int8 => types::AD_BIG_INT,
        ColumnType::Float4 => types::AD_SINGLE,
        ColumnType::Float8 | ColumnType::Floatn => types::AD_DOUBLE,
        ColumnType::Money | ColumnType::Money4 => types::AD_CURRENCY,
        ColumnType::Decimaln => types::AD_DECIMAL,
        ColumnType::Numericn => types::AD_NUMERIC,
        ColumnType::Datetime
        | ColumnType::Datetime4
        | ColumnType::Datetimen
        | ColumnType::Datetime2
        | ColumnType::DatetimeOffsetn => types::AD_DB_TIMESTAMP,
        ColumnType::Daten => types::AD_DB_DATE,
        ColumnType::Timen => types::AD_DB_TIME,
        ColumnType::Guid => types::AD_GUID,
        ColumnType::BigChar => types::AD_CHAR,
        ColumnType::BigVarChar => types::AD_VAR_CHAR,
        ColumnType::Text => types::AD_LONG_VAR_CHAR,
        ColumnType::NChar => types::AD_WCHAR,
        ColumnType::NVarchar => types::AD_VAR_WCHAR,
        ColumnType::NText | ColumnType::Xml => types::AD_LONG_VAR_WCHAR,
        ColumnType::BigBinary => types::AD_BINARY,
        ColumnType::BigVarBin => types::AD_VAR_BINARY,
        ColumnType::Image => types::AD_LONG_VAR_BINARY,
        ColumnType::Udt | ColumnType::SSVariant => types::AD_VARIANT,
        _ => types::AD_VARIANT,
    }
}

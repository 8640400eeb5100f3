//! Cursor execution and fetch state machine.
//!
//! A cursor is reusable: each execute discards the prior result set and
//! takes a fresh description snapshot. Fetches pull column-major batches
//! from the provider, run every cell through the conversion tables, and
//! transpose to rows.

use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::connection::ConnectionCore;
use crate::conversion;
use crate::error::{AdoDbError, Message};
use crate::params::{self, ParamDirection, Parameter};
use crate::placeholders;
use crate::provider::{
    CommandKind, ExecuteOutcome, ProviderConnection, ProviderRecordset,
    RecordsetState,
};
use crate::types::{self, TypeCode};
use crate::value::Value;

/// Immutable snapshot of one result column, taken at execute time.
#[derive(Debug, Clone)]
pub struct ColumnDescriptor {
    pub name: String,
    pub type_code: TypeCode,
    /// Size of the value in the current record; absent when the result
    /// set is empty.
    pub display_size: Option<i64>,
    pub internal_size: i64,
    pub precision: u8,
    pub numeric_scale: u8,
    pub nullable: bool,
}

/// A DB-API style cursor bound to a shared connection.
pub struct Cursor {
    connection: Option<Arc<Mutex<ConnectionCore>>>,
    recordset: Option<Box<dyn ProviderRecordset>>,
    /// Column descriptors of the last row-returning execute, or `None`.
    pub description: Option<Vec<ColumnDescriptor>>,
    /// Affected/returned row count of the last execute; −1 when unknown
    /// (always −1 for row-returning statements on forward-only cursors).
    pub rowcount: i64,
    /// Default row count for `fetchmany`.
    pub arraysize: usize,
    pub messages: Vec<Message>,
    return_value: Option<Value>,
}

struct CommandResult {
    recordset: Option<Box<dyn ProviderRecordset>>,
    rows_affected: i64,
    parameters: Vec<Parameter>,
}

/// Build, bind, and execute one provider command. Returns the failure
/// together with the parameter dump and any binding annotation so the
/// caller can assemble the aggregate error report.
#[allow(clippy::type_complexity)]
fn build_and_execute(
    provider: &mut dyn ProviderConnection,
    operation: &str,
    kind: CommandKind,
    parameters: Option<&[Value]>,
) -> (
    Result<(ExecuteOutcome, Vec<Parameter>), AdoDbError>,
    String,
    String,
) {
    let mut annotation = String::new();
    let mut command = match provider.create_command(kind) {
        Ok(command) => command,
        Err(error) => return (Err(error), "[]".to_string(), annotation),
    };

    let mut tokens: Vec<String> = Vec::new();
    let mut bound = 0usize;
    if let Some(values) = parameters {
        for (index, value) in values.iter().enumerate() {
            // Literal NULLs go into plain text statements; stored
            // procedures get a true NULL parameter instead.
            if value.is_null() && kind == CommandKind::Text {
                tokens.push("NULL".to_string());
                continue;
            }

            let type_code = params::infer_type_code(value);
            let mut parameter = Parameter::new(format!("p{index}"), type_code);
            if let Err(error) = params::configure(&mut parameter, value) {
                annotation = format!(
                    "converting parameter {}: {}, {value:?}",
                    parameter.name,
                    types::describe_type(type_code)
                );
                let dump = params::format_parameters(command.parameters());
                return (Err(error), dump, annotation);
            }
            if kind == CommandKind::Text {
                tokens.push(command.parameter_token(bound));
            }
            bound += 1;
            command.append_parameter(parameter);
        }
    }

    let text = if kind == CommandKind::Text && parameters.is_some() {
        match placeholders::render(operation, &tokens) {
            Ok(text) => text,
            Err(error) => {
                let dump = params::format_parameters(command.parameters());
                return (Err(error), dump, annotation);
            }
        }
    } else {
        operation.to_string()
    };
    command.set_text(&text);

    match command.execute() {
        Ok(outcome) => {
            let snapshot = command.parameters().to_vec();
            (Ok((outcome, snapshot)), String::new(), annotation)
        }
        Err(error) => {
            let dump = params::format_parameters(command.parameters());
            (Err(error), dump, annotation)
        }
    }
}

impl Cursor {
    pub(crate) fn new(connection: Arc<Mutex<ConnectionCore>>) -> Self {
        Self {
            connection: Some(connection),
            recordset: None,
            description: None,
            rowcount: -1,
            arraysize: 1,
            messages: Vec::new(),
            return_value: None,
        }
    }

    /// Record the failure on the connection (invoking the error hook) and
    /// on this cursor, then hand it back for propagation.
    fn raise(&mut self, error: AdoDbError) -> AdoDbError {
        let error = match self.connection.as_ref().and_then(|c| c.lock().ok()) {
            Some(mut core) => core.record_failure(error),
            None => error,
        };
        self.messages.push(Message::from(&error));
        error
    }

    /// Return value captured by the last `callproc`, when the procedure
    /// declared an explicit return-value parameter.
    #[must_use]
    pub fn return_value(&self) -> Option<&Value> {
        self.return_value.as_ref()
    }

    /// Prepare and execute a database operation (query or command).
    ///
    /// # Errors
    ///
    /// Returns `AdoDbError::Database` carrying the full failure report
    /// when the command cannot be built or executed.
    pub fn execute(
        &mut self,
        operation: &str,
        parameters: Option<&[Value]>,
    ) -> Result<(), AdoDbError> {
        self.messages.clear();
        self.execute_helper(operation, CommandKind::Text, parameters)
            .map(|_| ())
    }

    /// Execute `operation` once per parameter set. The aggregate rowcount
    /// is the sum of the per-call counts, or −1 as soon as any call
    /// reports an unknown count.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first failing execution.
    pub fn executemany(
        &mut self,
        operation: &str,
        parameter_sets: &[Vec<Value>],
    ) -> Result<(), AdoDbError> {
        self.messages.clear();
        let mut total: i64 = 0;
        for parameters in parameter_sets {
            self.execute(operation, Some(parameters.as_slice()))?;
            if self.rowcount == -1 {
                total = -1;
            }
            if total != -1 {
                total += self.rowcount;
            }
        }
        self.rowcount = total;
        Ok(())
    }

    /// Call a stored procedure. With parameters supplied, returns the
    /// converted parameter values in declaration order; an explicit
    /// return-value parameter is captured separately (see
    /// [`Cursor::return_value`]).
    ///
    /// # Errors
    ///
    /// Returns `AdoDbError::Database` carrying the full failure report
    /// when the call fails.
    pub fn callproc(
        &mut self,
        procname: &str,
        parameters: Option<&[Value]>,
    ) -> Result<Option<Vec<Value>>, AdoDbError> {
        self.messages.clear();
        self.execute_helper(procname, CommandKind::StoredProcedure, parameters)
    }

    fn execute_helper(
        &mut self,
        operation: &str,
        kind: CommandKind,
        parameters: Option<&[Value]>,
    ) -> Result<Option<Vec<Value>>, AdoDbError> {
        let Some(connection) = self.connection.clone() else {
            return Err(self.raise(AdoDbError::General("cursor is not connected".into())));
        };

        // A new execute discards the prior result.
        if let Some(mut old) = self.recordset.take() {
            old.close();
        }
        self.description = None;
        self.return_value = None;

        let outcome = {
            let mut core = match connection.lock() {
                Ok(core) => core,
                Err(_) => {
                    return Err(self.raise(AdoDbError::Internal(
                        "connection state poisoned by a panic".into(),
                    )));
                }
            };
            run_command(&mut core, operation, kind, parameters)
        };

        let result = match outcome {
            Err(error) => {
                self.rowcount = -1;
                warn!(sql = operation, "command execution failed");
                return Err(self.raise(error));
            }
            Ok(result) => result,
        };

        self.rowcount = result.rows_affected;
        self.apply_recordset(result.recordset);
        debug!(sql = operation, rowcount = self.rowcount, "command executed");

        if kind == CommandKind::StoredProcedure && parameters.is_some() {
            let mut outputs = Vec::with_capacity(result.parameters.len());
            for parameter in &result.parameters {
                let value = match conversion::convert_variant(&parameter.value, parameter.type_code)
                {
                    Ok(value) => value,
                    Err(error) => return Err(self.raise(error)),
                };
                if parameter.direction == ParamDirection::ReturnValue {
                    self.return_value = Some(value);
                } else {
                    outputs.push(value);
                }
            }
            return Ok(Some(outputs));
        }
        Ok(None)
    }

    /// Take the description snapshot from a fresh recordset. Absent or
    /// already-closed recordsets clear the result state.
    fn apply_recordset(&mut self, recordset: Option<Box<dyn ProviderRecordset>>) {
        let Some(recordset) = recordset else {
            self.recordset = None;
            self.description = None;
            return;
        };
        if recordset.state() == RecordsetState::Closed {
            self.recordset = None;
            self.description = None;
            return;
        }

        // Forward-only result sets never report a total row count.
        self.rowcount = -1;
        let descriptors = recordset
            .fields()
            .into_iter()
            .map(|field| ColumnDescriptor {
                name: field.name,
                type_code: field.type_code,
                display_size: field.actual_size,
                internal_size: field.defined_size,
                precision: field.precision,
                numeric_scale: field.numeric_scale,
                nullable: field.attributes & types::FIELD_MAY_BE_NULL != 0,
            })
            .collect();
        self.description = Some(descriptors);
        self.recordset = Some(recordset);
    }

    /// Shared fetch path; returns row-major converted rows, empty when
    /// the result set is closed, before-first, or after-last.
    fn fetch_internal(&mut self, limit: Option<usize>) -> Result<Vec<Vec<Value>>, AdoDbError> {
        if self.connection.is_none() {
            return Err(self.raise(AdoDbError::General("cursor is not connected".into())));
        }
        let type_codes: Vec<TypeCode> = self
            .description
            .as_ref()
            .map(|descriptors| descriptors.iter().map(|d| d.type_code).collect())
            .unwrap_or_default();

        let fetched = match self.recordset.as_mut() {
            None => {
                return Err(self.raise(AdoDbError::General(
                    "no result set available on this cursor".into(),
                )));
            }
            Some(recordset) => {
                if recordset.state() == RecordsetState::Closed
                    || recordset.is_bof()
                    || recordset.is_eof()
                {
                    return Ok(Vec::new());
                }
                recordset.get_rows(limit)
            }
        };
        let columns = match fetched {
            Ok(columns) => columns,
            Err(error) => return Err(self.raise(error)),
        };

        let row_count = columns.first().map_or(0, Vec::len);
        let mut rows = vec![Vec::with_capacity(columns.len()); row_count];
        for (column_index, column) in columns.iter().enumerate() {
            let type_code = type_codes
                .get(column_index)
                .copied()
                .unwrap_or(types::AD_EMPTY);
            for (row_index, cell) in column.iter().enumerate() {
                match conversion::convert_variant(cell, type_code) {
                    Ok(value) => rows[row_index].push(value),
                    Err(error) => return Err(self.raise(error)),
                }
            }
        }
        Ok(rows)
    }

    /// Fetch the next row, or `None` when the result set is exhausted or
    /// empty.
    ///
    /// # Errors
    ///
    /// Returns the base error kind when no execute produced a result set,
    /// `AdoDbError::Data` when a cell refuses conversion.
    pub fn fetchone(&mut self) -> Result<Option<Vec<Value>>, AdoDbError> {
        self.messages.clear();
        let mut rows = self.fetch_internal(Some(1))?;
        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(rows.remove(0)))
    }

    /// Fetch up to `size` rows (default `arraysize`); empty when none
    /// remain.
    ///
    /// # Errors
    ///
    /// As [`Cursor::fetchone`].
    pub fn fetchmany(&mut self, size: Option<usize>) -> Result<Vec<Vec<Value>>, AdoDbError> {
        self.messages.clear();
        let limit = size.unwrap_or(self.arraysize);
        self.fetch_internal(Some(limit))
    }

    /// Fetch all remaining rows.
    ///
    /// # Errors
    ///
    /// As [`Cursor::fetchone`].
    pub fn fetchall(&mut self) -> Result<Vec<Vec<Value>>, AdoDbError> {
        self.messages.clear();
        self.fetch_internal(None)
    }

    /// Advance to the next result set, refreshing the description.
    /// `false` when no further result sets exist.
    ///
    /// # Errors
    ///
    /// Returns `AdoDbError::NotSupported` when the provider rejects the
    /// operation.
    pub fn nextset(&mut self) -> Result<bool, AdoDbError> {
        self.messages.clear();
        if self.connection.is_none() {
            return Err(self.raise(AdoDbError::General("cursor is not connected".into())));
        }
        let advanced = match self.recordset.as_mut() {
            None => {
                return Err(self.raise(AdoDbError::General(
                    "no result set available on this cursor".into(),
                )));
            }
            Some(recordset) => recordset.next_recordset(),
        };
        match advanced {
            Ok(Some(next)) => {
                self.apply_recordset(Some(next));
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(error) => Err(self.raise(AdoDbError::NotSupported(format!(
                "cannot advance to the next result set: {error}"
            )))),
        }
    }

    /// Close the cursor (but not the underlying connection). Idempotent.
    pub fn close(&mut self) {
        self.messages.clear();
        self.connection = None;
        if let Some(mut recordset) = self.recordset.take() {
            if recordset.state() == RecordsetState::Open {
                recordset.close();
            }
        }
        self.description = None;
        self.rowcount = -1;
    }

    /// Lazy single-pass row iteration, equivalent to repeated
    /// [`Cursor::fetchone`] until exhaustion.
    pub fn rows(&mut self) -> Rows<'_> {
        Rows {
            cursor: self,
            done: false,
        }
    }

    /// DB-API compatibility no-op.
    pub fn setinputsizes(&mut self, _sizes: &[i64]) {}

    /// DB-API compatibility no-op.
    pub fn setoutputsize(&mut self, _size: i64, _column: Option<usize>) {}
}

fn run_command(
    core: &mut ConnectionCore,
    operation: &str,
    kind: CommandKind,
    parameters: Option<&[Value]>,
) -> Result<CommandResult, AdoDbError> {
    let provider = core
        .provider
        .as_deref_mut()
        .ok_or_else(|| AdoDbError::General("connection is closed".into()))?;

    let (result, dump, annotation) = build_and_execute(provider, operation, kind, parameters);
    match result {
        Ok((outcome, snapshot)) => Ok(CommandResult {
            recordset: outcome.recordset,
            rows_affected: outcome.rows_affected,
            parameters: snapshot,
        }),
        Err(error) => {
            // Aggregate report: causal chain, binding annotation, the
            // original SQL, the bound-parameter dump, and the raw values.
            let mut report = crate::error::causal_chain(&error);
            if !annotation.is_empty() {
                report.push('\n');
                report.push_str(&annotation);
            }
            report.push_str(&format!(
                "\nCommand: {operation:?}\nParameters: {dump}\nValues: {parameters:?}"
            ));
            Err(AdoDbError::Database(report))
        }
    }
}

/// Iterator over a cursor's remaining rows.
pub struct Rows<'a> {
    cursor: &'a mut Cursor,
    done: bool,
}

impl Iterator for Rows<'_> {
    type Item = Result<Vec<Value>, AdoDbError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.cursor.fetchone() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(error) => {
                self.done = true;
                Some(Err(error))
            }
        }
    }
}

impl<'a> IntoIterator for &'a mut Cursor {
    type Item = Result<Vec<Value>, AdoDbError>;
    type IntoIter = Rows<'a>;

    fn into_iter(self) -> Rows<'a> {
        self.rows()
    }
}

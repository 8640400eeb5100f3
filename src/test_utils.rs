//! Scriptable in-memory provider for driver tests.
//!
//! The mock implements the full provider capability interface: scripted
//! execute outcomes (result sets, affected counts, forced failures,
//! output parameter values), configurable transaction capabilities, and a
//! call log readable through a handle that survives moving the provider
//! into `connect_with_provider`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::config::{CursorLocation, IsolationLevel};
use crate::error::AdoDbError;
use crate::params::Parameter;
use crate::provider::{
    CommandKind, ExecuteOutcome, MaterializedRecordset, ProviderCommand, ProviderConnection,
    ProviderRecordset, RecordsetData, TRANSACTION_DDL_PROPERTY, TransactionAttributes, Variant,
};

/// One observed provider call.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderCall {
    SetCursorLocation(CursorLocation),
    SetIsolationLevel(IsolationLevel),
    BeginTransaction,
    CommitTransaction,
    RollbackTransaction,
    Execute {
        text: String,
        kind: CommandKind,
        parameters: Vec<Parameter>,
    },
    Close,
    Release,
}

/// Scripted result of one execute call.
pub struct ScriptedOutcome {
    recordsets: Vec<RecordsetData>,
    rows_affected: i64,
    output_values: Vec<Variant>,
    return_value: Option<Variant>,
    deny_next_recordset: bool,
}

impl ScriptedOutcome {
    /// A rowless execution reporting an affected count.
    #[must_use]
    pub fn count(rows_affected: i64) -> Self {
        Self {
            recordsets: Vec::new(),
            rows_affected,
            output_values: Vec::new(),
            return_value: None,
            deny_next_recordset: false,
        }
    }

    /// A row-returning execution (affected count −1, forward-only).
    #[must_use]
    pub fn rows(recordset: RecordsetData) -> Self {
        Self::multi(vec![recordset])
    }

    /// A row-returning execution producing several result sets.
    #[must_use]
    pub fn multi(recordsets: Vec<RecordsetData>) -> Self {
        Self {
            recordsets,
            rows_affected: -1,
            output_values: Vec::new(),
            return_value: None,
            deny_next_recordset: false,
        }
    }

    /// Values the provider writes back into the command's parameter list
    /// after execution, in declaration order.
    #[must_use]
    pub fn with_output_values(mut self, values: Vec<Variant>) -> Self {
        self.output_values = values;
        self
    }

    /// Append a provider-declared return-value parameter to the command
    /// after execution, the way ADO providers refresh a procedure's
    /// parameter list.
    #[must_use]
    pub fn with_return_value(mut self, value: Variant) -> Self {
        self.return_value = Some(value);
        self
    }

    /// Make the produced recordset reject `next_recordset`.
    #[must_use]
    pub fn with_next_recordset_denied(mut self) -> Self {
        self.deny_next_recordset = true;
        self
    }
}

fn variant_type_code(variant: &Variant) -> crate::types::TypeCode {
    match variant {
        Variant::Bool(_) => crate::types::AD_BOOLEAN,
        Variant::SmallInt(_) => crate::types::AD_SMALL_INT,
        Variant::Int(_) => crate::types::AD_INTEGER,
        Variant::BigInt(_) => crate::types::AD_BIG_INT,
        Variant::Single(_) | Variant::Double(_) => crate::types::AD_DOUBLE,
        Variant::Text(_) => crate::types::AD_BSTR,
        Variant::Bytes(_) => crate::types::AD_BINARY,
        Variant::Currency { .. } => crate::types::AD_CURRENCY,
        Variant::DateSerial(_) | Variant::Timestamp(_) => crate::types::AD_DATE,
        Variant::Numeric(_) => crate::types::AD_NUMERIC,
        Variant::Null => crate::types::AD_VARIANT,
    }
}

type ScriptQueue = VecDeque<Result<ScriptedOutcome, AdoDbError>>;
type CallLog = Arc<Mutex<Vec<ProviderCall>>>;

/// Handle onto the mock's call log.
#[derive(Clone)]
pub struct MockHandle {
    log: CallLog,
}

impl MockHandle {
    /// Snapshot of every provider call observed so far.
    #[must_use]
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// Count of calls matching `predicate`.
    pub fn count(&self, predicate: impl Fn(&ProviderCall) -> bool) -> usize {
        self.calls().iter().filter(|call| predicate(call)).count()
    }

    /// The executed command texts, in order.
    #[must_use]
    pub fn executed_sql(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                ProviderCall::Execute { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }
}

pub struct MockProviderBuilder {
    transaction_ddl: Option<i64>,
    attributes: TransactionAttributes,
    executions: ScriptQueue,
    fail_rollback: bool,
    fail_close: bool,
}

impl Default for MockProviderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProviderBuilder {
    /// A transactional provider with no retaining behavior.
    #[must_use]
    pub fn new() -> Self {
        Self {
            transaction_ddl: Some(1),
            attributes: TransactionAttributes::default(),
            executions: VecDeque::new(),
            fail_rollback: false,
            fail_close: false,
        }
    }

    #[must_use]
    pub fn without_transactions(mut self) -> Self {
        self.transaction_ddl = None;
        self
    }

    #[must_use]
    pub fn with_commit_retaining(mut self) -> Self {
        self.attributes.commit_retaining = true;
        self
    }

    #[must_use]
    pub fn with_abort_retaining(mut self) -> Self {
        self.attributes.abort_retaining = true;
        self
    }

    #[must_use]
    pub fn fail_on_rollback(mut self) -> Self {
        self.fail_rollback = true;
        self
    }

    #[must_use]
    pub fn fail_on_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    /// Enqueue the outcome of the next execute call.
    #[must_use]
    pub fn execution(mut self, outcome: Result<ScriptedOutcome, AdoDbError>) -> Self {
        self.executions.push_back(outcome);
        self
    }

    #[must_use]
    pub fn build(self) -> (Box<dyn ProviderConnection>, MockHandle) {
        let log: CallLog = Arc::new(Mutex::new(Vec::new()));
        let handle = MockHandle {
            log: Arc::clone(&log),
        };
        let provider = MockProvider {
            log,
            transaction_ddl: self.transaction_ddl,
            attributes: self.attributes,
            executions: self.executions,
            fail_rollback: self.fail_rollback,
            fail_close: self.fail_close,
        };
        (Box::new(provider), handle)
    }
}

pub struct MockProvider {
    log: CallLog,
    transaction_ddl: Option<i64>,
    attributes: TransactionAttributes,
    executions: ScriptQueue,
    fail_rollback: bool,
    fail_close: bool,
}

impl MockProvider {
    fn record(&self, call: ProviderCall) {
        if let Ok(mut log) = self.log.lock() {
            log.push(call);
        }
    }
}

impl ProviderConnection for MockProvider {
    fn property(&self, name: &str) -> Option<i64> {
        if name == TRANSACTION_DDL_PROPERTY {
            self.transaction_ddl
        } else {
            None
        }
    }

    fn attributes(&self) -> TransactionAttributes {
        self.attributes
    }

    fn set_isolation_level(&mut self, level: IsolationLevel) -> Result<(), AdoDbError> {
        self.record(ProviderCall::SetIsolationLevel(level));
        Ok(())
    }

    fn set_cursor_location(&mut self, location: CursorLocation) -> Result<(), AdoDbError> {
        self.record(ProviderCall::SetCursorLocation(location));
        Ok(())
    }

    fn begin_transaction(&mut self) -> Result<(), AdoDbError> {
        self.record(ProviderCall::BeginTransaction);
        Ok(())
    }

    fn commit_transaction(&mut self) -> Result<(), AdoDbError> {
        self.record(ProviderCall::CommitTransaction);
        Ok(())
    }

    fn rollback_transaction(&mut self) -> Result<(), AdoDbError> {
        self.record(ProviderCall::RollbackTransaction);
        if self.fail_rollback {
            return Err(AdoDbError::Database("scripted rollback failure".into()));
        }
        Ok(())
    }

    fn create_command(
        &mut self,
        kind: CommandKind,
    ) -> Result<Box<dyn ProviderCommand + '_>, AdoDbError> {
        Ok(Box::new(MockCommand {
            log: Arc::clone(&self.log),
            executions: &mut self.executions,
            kind,
            text: String::new(),
            parameters: Vec::new(),
        }))
    }

    fn close(&mut self) -> Result<(), AdoDbError> {
        self.record(ProviderCall::Close);
        if self.fail_close {
            return Err(AdoDbError::Database("scripted close failure".into()));
        }
        Ok(())
    }

    fn release(&mut self) {
        self.record(ProviderCall::Release);
    }
}

struct MockCommand<'a> {
    log: CallLog,
    executions: &'a mut ScriptQueue,
    kind: CommandKind,
    text: String,
    parameters: Vec<Parameter>,
}

impl ProviderCommand for MockCommand<'_> {
    fn set_text(&mut self, sql: &str) {
        self.text = sql.to_string();
    }

    fn append_parameter(&mut self, parameter: Parameter) {
        self.parameters.push(parameter);
    }

    fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    fn execute(&mut self) -> Result<ExecuteOutcome, AdoDbError> {
        if let Ok(mut log) = self.log.lock() {
            log.push(ProviderCall::Execute {
                text: self.text.clone(),
                kind: self.kind,
                parameters: self.parameters.clone(),
            });
        }

        let scripted = self
            .executions
            .pop_front()
            .unwrap_or_else(|| Ok(ScriptedOutcome::count(0)));
        let outcome = scripted?;

        if !outcome.output_values.is_empty() {
            for (parameter, value) in self.parameters.iter_mut().zip(outcome.output_values) {
                parameter.value = value;
            }
        }
        if let Some(value) = outcome.return_value {
            let mut parameter = Parameter::new("RETURN_VALUE", variant_type_code(&value))
                .with_direction(crate::params::ParamDirection::ReturnValue);
            parameter.value = value;
            self.parameters.push(parameter);
        }

        let deny_next = outcome.deny_next_recordset;
        let recordset = MaterializedRecordset::from_sets(outcome.recordsets).map(|mut rs| {
            if deny_next {
                rs.deny_next_recordset();
            }
            Box::new(rs) as Box<dyn ProviderRecordset>
        });
        Ok(ExecuteOutcome {
            recordset,
            rows_affected: outcome.rows_affected,
        })
    }
}

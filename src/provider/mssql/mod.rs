// MSSQL provider - ADO-style provider over the Tiberius TDS client
//
// This module is split into:
// - config: ADO connection-string parsing into a tiberius::Config
// - command: command execution, result materialization, type mapping
//
// Tiberius is async; the provider owns a current-thread runtime and
// presents the blocking facade the driver contract requires. The
// connection-wide command timeout bounds every blocking call.

mod command;
mod config;

use std::time::Duration;

use tiberius::Client;
use tokio::net::TcpStream;
use tokio::runtime::{Builder, Runtime};
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

use crate::config::{ConnectConfig, CursorLocation, IsolationLevel};
use crate::error::AdoDbError;
use crate::provider::{
    CommandKind, ProviderCommand, ProviderConnection, TRANSACTION_DDL_PROPERTY,
    TransactionAttributes,
};

pub(crate) type TdsClient = Client<Compat<TcpStream>>;

/// Provider connection backed by a Tiberius TDS client.
pub struct TdsProvider {
    runtime: Option<Runtime>,
    client: Option<TdsClient>,
    command_timeout: Duration,
}

impl TdsProvider {
    /// Open a TDS connection from an ADO-style connection string.
    ///
    /// # Errors
    ///
    /// Returns `AdoDbError::Interface` for malformed connection strings,
    /// `AdoDbError::Operational` on timeout, and a database error when
    /// the server rejects the connection.
    pub fn open(connection_string: &str, config: &ConnectConfig) -> Result<Self, AdoDbError> {
        let tds_config = config::parse_connection_string(connection_string)?;
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| AdoDbError::Internal(format!("cannot start the provider runtime: {e}")))?;

        let timeout = config.command_timeout;
        let client = runtime.block_on(async {
            let connect = async {
                let tcp = TcpStream::connect(tds_config.get_addr())
                    .await
                    .map_err(|e| {
                        AdoDbError::Database(format!(
                            "cannot reach {}: {e}",
                            tds_config.get_addr()
                        ))
                    })?;
                let client = Client::connect(tds_config.clone(), tcp.compat_write())
                    .await
                    .map_err(AdoDbError::from)?;
                Ok::<TdsClient, AdoDbError>(client)
            };
            match tokio::time::timeout(timeout, connect).await {
                Ok(result) => result,
                Err(_) => Err(AdoDbError::Operational(format!(
                    "connection attempt timed out after {timeout:?}"
                ))),
            }
        })?;
        debug!(addr = %tds_config.get_addr(), "TDS provider connected");

        Ok(Self {
            runtime: Some(runtime),
            client: Some(client),
            command_timeout: timeout,
        })
    }

    /// Run a rowless SQL batch, draining the token stream.
    fn run_batch(&mut self, sql: &str) -> Result<(), AdoDbError> {
        let runtime = self
            .runtime
            .as_ref()
            .ok_or_else(|| AdoDbError::Internal("provider runtime has been released".into()))?;
        let client = self
            .client
            .as_mut()
            .ok_or_else(|| AdoDbError::Internal("provider connection is closed".into()))?;
        let timeout = self.command_timeout;

        runtime.block_on(async {
            let work = async {
                let stream = client.simple_query(sql).await?;
                stream.into_results().await?;
                Ok::<(), tiberius::error::Error>(())
            };
            match tokio::time::timeout(timeout, work).await {
                Ok(result) => result.map_err(AdoDbError::from),
                Err(_) => Err(AdoDbError::Operational(format!(
                    "command timed out after {timeout:?}"
                ))),
            }
        })
    }
}

impl ProviderConnection for TdsProvider {
    fn property(&self, name: &str) -> Option<i64> {
        // SQL Server supports transactional DDL.
        (name == TRANSACTION_DDL_PROPERTY).then_some(1)
    }

    fn attributes(&self) -> TransactionAttributes {
        // SQL Server performs neither retaining commits nor retaining
        // aborts; the driver opens the follow-up transaction itself.
        TransactionAttributes::default()
    }

    fn set_isolation_level(&mut self, level: IsolationLevel) -> Result<(), AdoDbError> {
        let name = match level {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        };
        self.run_batch(&format!("SET TRANSACTION ISOLATION LEVEL {name}"))
    }

    fn set_cursor_location(&mut self, _location: CursorLocation) -> Result<(), AdoDbError> {
        // Result sets are always materialized on the client side.
        Ok(())
    }

    fn begin_transaction(&mut self) -> Result<(), AdoDbError> {
        self.run_batch("BEGIN TRANSACTION")
    }

    fn commit_transaction(&mut self) -> Result<(), AdoDbError> {
        self.run_batch("COMMIT TRANSACTION")
    }

    fn rollback_transaction(&mut self) -> Result<(), AdoDbError> {
        self.run_batch("ROLLBACK TRANSACTION")
    }

    fn create_command(
        &mut self,
        kind: CommandKind,
    ) -> Result<Box<dyn ProviderCommand + '_>, AdoDbError> {
        let runtime = self
            .runtime
            .as_ref()
            .ok_or_else(|| AdoDbError::Internal("provider runtime has been released".into()))?;
        let client = self
            .client
            .as_mut()
            .ok_or_else(|| AdoDbError::Internal("provider connection is closed".into()))?;
        Ok(Box::new(command::TdsCommand::new(
            runtime,
            client,
            self.command_timeout,
            kind,
        )))
    }

    fn close(&mut self) -> Result<(), AdoDbError> {
        let Some(client) = self.client.take() else {
            return Ok(());
        };
        let runtime = self
            .runtime
            .as_ref()
            .ok_or_else(|| AdoDbError::Internal("provider runtime has been released".into()))?;
        runtime.block_on(client.close()).map_err(AdoDbError::from)?;
        debug!("TDS provider closed");
        Ok(())
    }

    fn release(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

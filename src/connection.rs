//! Connection lifecycle and transaction semantics.
//!
//! While the provider supports transactions the driver keeps exactly one
//! transaction open at all times: one is started at connect, and every
//! commit/rollback starts the next one unless the provider performs
//! retaining commits/aborts itself. Autocommit is never exposed.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use crate::config::ConnectConfig;
use crate::cursor::Cursor;
use crate::error::{AdoDbError, ErrorHook, Message};
use crate::provider::{ProviderConnection, TRANSACTION_DDL_PROPERTY};

/// Shared state behind a `Connection` and its cursors.
pub(crate) struct ConnectionCore {
    pub(crate) provider: Option<Box<dyn ProviderConnection>>,
    pub(crate) supports_transactions: bool,
    pub(crate) messages: Vec<Message>,
    pub(crate) error_hook: Option<ErrorHook>,
}

impl ConnectionCore {
    /// Append the failure to the message log, notify the hook, and hand
    /// the error back for propagation.
    pub(crate) fn record_failure(&mut self, error: AdoDbError) -> AdoDbError {
        let message = Message::from(&error);
        self.messages.push(message.clone());
        if let Some(hook) = self.error_hook.as_mut() {
            hook(&message);
        }
        error
    }
}

/// A DB-API style connection owning one provider handle.
///
/// A connection may be shared across threads but must not be used
/// concurrently; cursors created from it all participate in its single
/// transaction.
pub struct Connection {
    core: Arc<Mutex<ConnectionCore>>,
}

/// Open a connection through the Tiberius TDS provider.
///
/// # Errors
///
/// Returns `AdoDbError` when the connection string is malformed, the
/// provider cannot be reached, or the initial transaction setup fails.
#[cfg(feature = "mssql")]
pub fn connect(connection_string: &str, config: &ConnectConfig) -> Result<Connection, AdoDbError> {
    let provider = crate::provider::mssql::TdsProvider::open(connection_string, config)?;
    connect_with_provider(Box::new(provider), config)
}

/// Wrap an already-open provider connection in the driver contract.
///
/// # Errors
///
/// Returns `AdoDbError` when applying the cursor location or the initial
/// transaction setup fails.
pub fn connect_with_provider(
    mut provider: Box<dyn ProviderConnection>,
    config: &ConnectConfig,
) -> Result<Connection, AdoDbError> {
    provider.set_cursor_location(config.cursor_location)?;

    let supports_transactions = provider
        .property(TRANSACTION_DDL_PROPERTY)
        .is_some_and(|value| value > 0);
    if supports_transactions {
        provider.set_isolation_level(config.isolation_level)?;
        provider.begin_transaction()?;
    }
    debug!(supports_transactions, "provider connection opened");

    Ok(Connection {
        core: Arc::new(Mutex::new(ConnectionCore {
            provider: Some(provider),
            supports_transactions,
            messages: Vec::new(),
            error_hook: None,
        })),
    })
}

enum TransactionEnd {
    Commit,
    Rollback,
}

/// End the current transaction and, unless the provider retains, open the
/// next one.
fn end_transaction(core: &mut ConnectionCore, end: TransactionEnd) -> Result<(), AdoDbError> {
    let provider = core
        .provider
        .as_deref_mut()
        .ok_or_else(|| AdoDbError::General("connection is closed".into()))?;
    match end {
        TransactionEnd::Commit => {
            provider.commit_transaction()?;
            if !provider.attributes().commit_retaining {
                provider.begin_transaction()?;
            }
        }
        TransactionEnd::Rollback => {
            provider.rollback_transaction()?;
            if !provider.attributes().abort_retaining {
                provider.begin_transaction()?;
            }
        }
    }
    Ok(())
}

/// Roll back (when supported), close the provider handle, and always
/// release host-side resources, reporting the first failure.
fn close_core(core: &mut ConnectionCore) -> Result<(), AdoDbError> {
    let Some(mut provider) = core.provider.take() else {
        return Ok(());
    };

    let mut result = Ok(());
    if core.supports_transactions {
        result = provider.rollback_transaction();
    }
    match provider.close() {
        Ok(()) => {}
        Err(close_error) => {
            if result.is_ok() {
                result = Err(close_error);
            } else {
                warn!(%close_error, "provider close failed after rollback failure");
            }
        }
    }
    provider.release();

    match result {
        Ok(()) => {
            debug!("provider connection closed");
            Ok(())
        }
        Err(error) => Err(core.record_failure(AdoDbError::Internal(format!(
            "connection close failed: {error}"
        )))),
    }
}

impl Connection {
    fn lock_core(&self) -> Result<MutexGuard<'_, ConnectionCore>, AdoDbError> {
        self.core
            .lock()
            .map_err(|_| AdoDbError::Internal("connection state poisoned by a panic".into()))
    }

    /// Whether the provider reported transaction support at connect time.
    pub fn supports_transactions(&self) -> Result<bool, AdoDbError> {
        Ok(self.lock_core()?.supports_transactions)
    }

    /// Snapshot of the accumulated message log.
    pub fn messages(&self) -> Result<Vec<Message>, AdoDbError> {
        Ok(self.lock_core()?.messages.clone())
    }

    /// Install (or clear) the error observation hook.
    pub fn set_error_hook(&self, hook: Option<ErrorHook>) -> Result<(), AdoDbError> {
        self.lock_core()?.error_hook = hook;
        Ok(())
    }

    /// Create a cursor bound to this connection.
    ///
    /// # Errors
    ///
    /// Returns `AdoDbError::Internal` when the connection state is
    /// poisoned.
    pub fn cursor(&self) -> Result<Cursor, AdoDbError> {
        let mut core = self.lock_core()?;
        core.messages.clear();
        Ok(Cursor::new(Arc::clone(&self.core)))
    }

    /// Commit the pending transaction. A silent no-op when the provider
    /// does not support transactions.
    ///
    /// # Errors
    ///
    /// Returns the base error kind when the provider commit (or the
    /// follow-up begin) fails.
    pub fn commit(&self) -> Result<(), AdoDbError> {
        let mut core = self.lock_core()?;
        core.messages.clear();
        if !core.supports_transactions {
            return Ok(());
        }
        match end_transaction(&mut core, TransactionEnd::Commit) {
            Ok(()) => {
                debug!("transaction committed");
                Ok(())
            }
            Err(error) => Err(core.record_failure(AdoDbError::General(format!(
                "commit failed: {error}"
            )))),
        }
    }

    /// Abort the pending transaction.
    ///
    /// # Errors
    ///
    /// Returns `AdoDbError::NotSupported` when the provider does not
    /// support transactions; provider rollback failures are routed
    /// through the error hook like every other connection operation.
    pub fn rollback(&self) -> Result<(), AdoDbError> {
        let mut core = self.lock_core()?;
        core.messages.clear();
        if !core.supports_transactions {
            return Err(core.record_failure(AdoDbError::NotSupported(
                "the provider does not support transactions".into(),
            )));
        }
        match end_transaction(&mut core, TransactionEnd::Rollback) {
            Ok(()) => {
                debug!("transaction rolled back");
                Ok(())
            }
            Err(error) => {
                warn!(%error, "rollback failed");
                Err(core.record_failure(AdoDbError::General(format!(
                    "rollback failed: {error}"
                ))))
            }
        }
    }

    /// Close the connection: roll back pending work, close the provider
    /// handle, and release host-side resources. Safe to call repeatedly.
    ///
    /// # Errors
    ///
    /// Returns `AdoDbError::Internal` when the provider teardown fails;
    /// the provider reference is cleared regardless.
    pub fn close(&self) -> Result<(), AdoDbError> {
        let mut core = self.lock_core()?;
        core.messages.clear();
        close_core(&mut core)
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // Best-effort teardown for connections dropped without close().
        if let Ok(mut core) = self.core.lock() {
            if close_core(&mut core).is_err() {
                warn!("implicit connection close failed during drop");
            }
        }
    }
}

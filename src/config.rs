//! Connection configuration.
//!
//! The original ADO bindings configured the default isolation level and
//! cursor location through module-level mutable globals; here the same knobs
//! travel in an explicit config struct handed to `connect`.

use std::time::Duration;

/// Transaction isolation level applied to a new connection when the
/// provider supports transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// The ADO `adXact*` constant for this level.
    #[must_use]
    pub fn ado_value(self) -> u32 {
        match self {
            IsolationLevel::ReadUncommitted => 256,
            IsolationLevel::ReadCommitted => 4096,
            IsolationLevel::RepeatableRead => 65536,
            IsolationLevel::Serializable => 1_048_576,
        }
    }
}

/// Where the provider should run its cursor engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorLocation {
    UseServer,
    UseClient,
}

impl CursorLocation {
    /// The ADO `adUse*` constant for this location.
    #[must_use]
    pub fn ado_value(self) -> u32 {
        match self {
            CursorLocation::UseServer => 2,
            CursorLocation::UseClient => 3,
        }
    }
}

/// Per-connection defaults applied by `connect`.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Command timeout propagated to every command on the connection.
    pub command_timeout: Duration,
    pub isolation_level: IsolationLevel,
    pub cursor_location: CursorLocation,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(30),
            isolation_level: IsolationLevel::ReadCommitted,
            cursor_location: CursorLocation::UseServer,
        }
    }
}

impl ConnectConfig {
    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = level;
        self
    }

    #[must_use]
    pub fn with_cursor_location(mut self, location: CursorLocation) -> Self {
        self.cursor_location = location;
        self
    }
}

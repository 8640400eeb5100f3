//! DB-API 2.0 style connection/cursor middleware over ADO-style data
//! providers.
//!
//! The driver core (connections, cursors, parameter binding, type
//! conversion) talks to a backing database exclusively through the
//! capability traits in [`provider`]; a Tiberius-backed SQL Server
//! provider ships behind the `mssql` feature. SQL uses positional `%s`
//! placeholders, rewritten per call into the provider's native tokens.
//!
//! Threads may share this crate, but a given [`Connection`] must not be
//! used concurrently; open one connection per thread for parallelism.

pub mod config;
pub mod connection;
pub mod conversion;
pub mod cursor;
pub mod decimal;
pub mod error;
pub mod params;
pub mod placeholders;
pub mod provider;
#[cfg(feature = "test-utils")]
pub mod test_utils;
pub mod types;
pub mod value;

pub use config::{ConnectConfig, CursorLocation, IsolationLevel};
#[cfg(feature = "mssql")]
pub use connection::connect;
pub use connection::{Connection, connect_with_provider};
pub use cursor::{ColumnDescriptor, Cursor, Rows};
pub use decimal::Decimal;
pub use error::{AdoDbError, ErrorHook, ErrorKind, Message};
pub use params::{ParamDirection, Parameter};
pub use provider::Variant;
pub use types::{BINARY, DATETIME, NUMBER, ROWID, STRING, TypeCategory, TypeCode, column_matches_category};
pub use value::{Value, date_from_ticks, time_from_ticks, timestamp_from_ticks};

/// Supported DB API level.
pub const API_LEVEL: &str = "2.0";

/// Thread safety level: threads may share the module, but not
/// connections.
pub const THREAD_SAFETY: u8 = 1;

/// Parameter marker style accepted in SQL text.
pub const PARAM_STYLE: &str = "format";

use std::fmt::Write as _;

use thiserror::Error;

/// Classification of a recorded failure, mirroring the DB-API error class
/// hierarchy. Used for the per-connection and per-cursor message logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Warning,
    /// The base error class: misuse of a closed cursor/connection and
    /// provider failures with no more specific classification.
    General,
    Interface,
    Database,
    Internal,
    Operational,
    Programming,
    Integrity,
    Data,
    NotSupported,
}

#[derive(Debug, Error)]
pub enum AdoDbError {
    #[error("warning: {0}")]
    Warning(String),

    #[error("driver error: {0}")]
    General(String),

    #[error("interface error: {message}")]
    Interface {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("database error: {0}")]
    Database(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("operational error: {0}")]
    Operational(String),

    #[error("programming error: {0}")]
    Programming(String),

    #[error("integrity error: {0}")]
    Integrity(String),

    #[error("data error: {0}")]
    Data(String),

    #[error("not supported: {0}")]
    NotSupported(String),

    #[cfg(feature = "mssql")]
    #[error(transparent)]
    Tds(#[from] tiberius::error::Error),
}

impl AdoDbError {
    /// Shorthand for an `Interface` error without an inner cause.
    pub fn interface(message: impl Into<String>) -> Self {
        AdoDbError::Interface {
            message: message.into(),
            source: None,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            AdoDbError::Warning(_) => ErrorKind::Warning,
            AdoDbError::General(_) => ErrorKind::General,
            AdoDbError::Interface { .. } => ErrorKind::Interface,
            AdoDbError::Database(_) => ErrorKind::Database,
            AdoDbError::Internal(_) => ErrorKind::Internal,
            AdoDbError::Operational(_) => ErrorKind::Operational,
            AdoDbError::Programming(_) => ErrorKind::Programming,
            AdoDbError::Integrity(_) => ErrorKind::Integrity,
            AdoDbError::Data(_) => ErrorKind::Data,
            AdoDbError::NotSupported(_) => ErrorKind::NotSupported,
            #[cfg(feature = "mssql")]
            AdoDbError::Tds(_) => ErrorKind::Database,
        }
    }
}

/// One `(error class, detail)` entry in a connection or cursor message log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: ErrorKind,
    pub detail: String,
}

impl From<&AdoDbError> for Message {
    fn from(error: &AdoDbError) -> Self {
        Message {
            kind: error.kind(),
            detail: error.to_string(),
        }
    }
}

/// Observation hook invoked after a failure has been appended to the
/// message logs and before the error is returned to the caller.
pub type ErrorHook = Box<dyn FnMut(&Message) + Send>;

/// Render an error and its `source()` chain, one cause per line.
#[must_use]
pub fn causal_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut rendered = error.to_string();
    let mut cause = error.source();
    while let Some(inner) = cause {
        let _ = write!(rendered, "\ncaused by: {inner}");
        cause = inner.source();
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_match_variants() {
        assert_eq!(AdoDbError::Warning("w".into()).kind(), ErrorKind::Warning);
        assert_eq!(
            AdoDbError::NotSupported("n".into()).kind(),
            ErrorKind::NotSupported
        );
        assert_eq!(AdoDbError::interface("i").kind(), ErrorKind::Interface);
    }

    #[test]
    fn causal_chain_includes_inner_cause() {
        let inner = AdoDbError::Data("bad cell".into());
        let outer = AdoDbError::Interface {
            message: "wrapper".into(),
            source: Some(Box::new(inner)),
        };
        let chain = causal_chain(&outer);
        assert!(chain.contains("wrapper"));
        assert!(chain.contains("caused by: data error: bad cell"));
    }

    #[test]
    fn message_captures_kind_and_detail() {
        let message = Message::from(&AdoDbError::Programming("mismatch".into()));
        assert_eq!(message.kind, ErrorKind::Programming);
        assert!(message.detail.contains("mismatch"));
    }
}

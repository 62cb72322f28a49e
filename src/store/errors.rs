//! Persistent store error types

/// Errors raised by store engines and the connector
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The store could not be opened or created. Fatal for the local layer.
    #[error("Store '{name}' unavailable: {reason}")]
    Unavailable { name: String, reason: String },

    /// A read, write or clear against an open store failed
    #[error("Store {op} failed: {reason}")]
    OperationFailed { op: &'static str, reason: String },

    #[error("Table '{0}' does not exist")]
    MissingTable(String),

    #[error("Transaction on table '{0}' is read-only")]
    ReadOnly(String),
}

impl StoreError {
    pub fn unavailable(name: &str, reason: impl ToString) -> Self {
        StoreError::Unavailable {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn failed(op: &'static str, reason: impl ToString) -> Self {
        StoreError::OperationFailed {
            op,
            reason: reason.to_string(),
        }
    }
}

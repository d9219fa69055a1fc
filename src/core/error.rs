use thiserror::Error;

use crate::core::Value;

/// Failures reported by a storage driver.
///
/// The persister never interprets these; they reach the caller unchanged
/// wrapped in [`PersistError::Storage`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Execution error: {0}")]
    Execution(String),
}

#[derive(Error, Debug)]
pub enum PersistError {
    #[error(
        "Optimistic lock conflict for '{entity}' with primary key {primary_key:?} (expected version {version})"
    )]
    LockConflict {
        entity: String,
        primary_key: Vec<Value>,
        version: Value,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error(
        "Unresolved reference in '{entity}.{property}' to '{}' at dispatch time",
        .target.as_deref().unwrap_or("unknown")
    )]
    UnresolvedReference {
        entity: String,
        property: String,
        /// Entity type the property refers to, when declared
        target: Option<String>,
    },

    #[error("Entity '{0}' is not registered")]
    UnknownEntity(String),

    #[error("Entity '{entity}' has no primary key value")]
    MissingPrimaryKey { entity: String },

    #[error("Identifier already resolved to {existing}, refusing {attempted}")]
    IdentifierAlreadyResolved { existing: Value, attempted: Value },

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Conversion error for '{property}': {message}")]
    Conversion { property: String, message: String },

    #[error("Lock error: {0}")]
    LockError(String),
}

pub type Result<T> = std::result::Result<T, PersistError>;

impl PersistError {
    pub fn is_lock_conflict(&self) -> bool {
        matches!(self, Self::LockConflict { .. })
    }

    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

impl<T> From<std::sync::PoisonError<T>> for PersistError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

// ============================================================================
// Storage Driver Contract
// ============================================================================
//
// The persister talks to storage exclusively through this trait. Rows,
// filters and payloads are keyed by storage field name.
//
// ============================================================================

pub mod memory;
pub mod table;

pub use memory::{InMemoryDriver, OperationKind, RecordedOperation};
pub use table::{ColumnDefault, TableDefinition};

use crate::core::{Row, StorageError, Value};
use crate::transaction::TransactionContext;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Outcome of a write statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub affected_rows: u64,
    /// Key generated by the backend for an insert, if any.
    pub insert_id: Option<Value>,
    /// Column values the backend computed and reported with the write.
    pub row: Option<Row>,
}

impl QueryResult {
    pub fn affected(affected_rows: u64) -> Self {
        Self {
            affected_rows,
            ..Self::default()
        }
    }

    pub fn with_insert_id(mut self, insert_id: impl Into<Value>) -> Self {
        self.insert_id = Some(insert_id.into());
        self
    }

    pub fn with_row(mut self, row: Row) -> Self {
        self.row = Some(row);
        self
    }

    /// Returns a reported column value, ignoring NULLs.
    pub fn returned(&self, field: &str) -> Option<&Value> {
        self.row
            .as_ref()
            .and_then(|row| row.get(field))
            .filter(|value| !value.is_null())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindOptions {
    /// Fields to load in addition to the primary key.
    pub populate: Vec<String>,
}

impl FindOptions {
    pub fn populate(fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            populate: fields.into_iter().map(Into::into).collect(),
        }
    }
}

/// Executes statements against a concrete backend.
///
/// `tx` is the caller's transaction handle, passed through unchanged.
#[async_trait]
pub trait StorageDriver: Send + Sync {
    async fn insert(
        &self,
        entity_name: &str,
        payload: Row,
        tx: Option<&TransactionContext>,
    ) -> StorageResult<QueryResult>;

    async fn update(
        &self,
        entity_name: &str,
        filter: Row,
        payload: Row,
        tx: Option<&TransactionContext>,
    ) -> StorageResult<QueryResult>;

    async fn delete(
        &self,
        entity_name: &str,
        filter: Row,
        tx: Option<&TransactionContext>,
    ) -> StorageResult<QueryResult>;

    async fn find_one(
        &self,
        entity_name: &str,
        filter: Row,
        options: FindOptions,
        tx: Option<&TransactionContext>,
    ) -> StorageResult<Option<Row>>;
}

use super::table::{Table, TableDefinition};
use super::{FindOptions, QueryResult, StorageDriver, StorageResult};
use crate::core::{Row, StorageError};
use crate::transaction::{TransactionContext, TransactionId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationKind {
    Insert,
    Update,
    Delete,
    FindOne,
}

/// One statement as it reached the driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedOperation {
    pub kind: OperationKind,
    pub entity_name: String,
    pub filter: Option<Row>,
    pub payload: Option<Row>,
    pub transaction: Option<TransactionId>,
}

/// Reference [`StorageDriver`] keeping tables in process memory.
///
/// Every call is recorded, and failures can be queued with
/// [`InMemoryDriver::fail_next`].
#[derive(Default)]
pub struct InMemoryDriver {
    /// Each table carries its own lock
    tables: RwLock<HashMap<String, Arc<RwLock<Table>>>>,
    operations: Mutex<Vec<RecordedOperation>>,
    injected_failures: Mutex<VecDeque<StorageError>>,
}

impl InMemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_table(&self, definition: TableDefinition) -> StorageResult<()> {
        let mut tables = self.tables.write().await;
        let name = definition.name().to_string();
        if tables.contains_key(&name) {
            return Err(StorageError::Execution(format!(
                "Table '{}' already exists",
                name
            )));
        }
        tables.insert(name, Arc::new(RwLock::new(Table::new(definition))));
        Ok(())
    }

    pub async fn table_exists(&self, name: &str) -> bool {
        self.tables.read().await.contains_key(name)
    }

    /// Snapshot of all rows currently stored for `entity_name`.
    pub async fn rows(&self, entity_name: &str) -> StorageResult<Vec<Row>> {
        let table = self.get_table(entity_name).await?;
        let table = table.read().await;
        Ok(table.rows())
    }

    pub async fn row_count(&self, entity_name: &str) -> StorageResult<usize> {
        let table = self.get_table(entity_name).await?;
        let table = table.read().await;
        Ok(table.row_count())
    }

    /// Makes the next driver call fail with `error` instead of executing.
    pub async fn fail_next(&self, error: StorageError) {
        self.injected_failures.lock().await.push_back(error);
    }

    pub async fn recorded_operations(&self) -> Vec<RecordedOperation> {
        self.operations.lock().await.clone()
    }

    pub async fn clear_recorded_operations(&self) {
        self.operations.lock().await.clear();
    }

    async fn get_table(&self, name: &str) -> StorageResult<Arc<RwLock<Table>>> {
        self.tables
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::TableNotFound(name.to_string()))
    }

    async fn record(
        &self,
        kind: OperationKind,
        entity_name: &str,
        filter: Option<&Row>,
        payload: Option<&Row>,
        tx: Option<&TransactionContext>,
    ) -> StorageResult<()> {
        self.operations.lock().await.push(RecordedOperation {
            kind,
            entity_name: entity_name.to_string(),
            filter: filter.cloned(),
            payload: payload.cloned(),
            transaction: tx.map(TransactionContext::id),
        });
        match self.injected_failures.lock().await.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl StorageDriver for InMemoryDriver {
    async fn insert(
        &self,
        entity_name: &str,
        payload: Row,
        tx: Option<&TransactionContext>,
    ) -> StorageResult<QueryResult> {
        self.record(OperationKind::Insert, entity_name, None, Some(&payload), tx)
            .await?;
        let table = self.get_table(entity_name).await?;
        let mut table = table.write().await;
        table.insert(payload)
    }

    async fn update(
        &self,
        entity_name: &str,
        filter: Row,
        payload: Row,
        tx: Option<&TransactionContext>,
    ) -> StorageResult<QueryResult> {
        self.record(
            OperationKind::Update,
            entity_name,
            Some(&filter),
            Some(&payload),
            tx,
        )
        .await?;
        let table = self.get_table(entity_name).await?;
        let mut table = table.write().await;
        table.update(&filter, &payload)
    }

    async fn delete(
        &self,
        entity_name: &str,
        filter: Row,
        tx: Option<&TransactionContext>,
    ) -> StorageResult<QueryResult> {
        self.record(OperationKind::Delete, entity_name, Some(&filter), None, tx)
            .await?;
        let table = self.get_table(entity_name).await?;
        let mut table = table.write().await;
        Ok(QueryResult::affected(table.delete(&filter)))
    }

    async fn find_one(
        &self,
        entity_name: &str,
        filter: Row,
        options: FindOptions,
        tx: Option<&TransactionContext>,
    ) -> StorageResult<Option<Row>> {
        self.record(OperationKind::FindOne, entity_name, Some(&filter), None, tx)
            .await?;
        let table = self.get_table(entity_name).await?;
        let table = table.read().await;
        Ok(table.find_one(&filter, &options.populate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Value;

    fn row(pairs: &[(&str, Value)]) -> Row {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_unknown_table() {
        let driver = InMemoryDriver::new();
        let err = driver.insert("missing", Row::new(), None).await.unwrap_err();
        assert_eq!(err, StorageError::TableNotFound("missing".to_string()));
    }

    #[tokio::test]
    async fn test_create_table_twice_fails() {
        let driver = InMemoryDriver::new();
        driver
            .create_table(TableDefinition::new("tag", &["label"]))
            .await
            .unwrap();
        assert!(driver.table_exists("tag").await);
        assert!(
            driver
                .create_table(TableDefinition::new("tag", &["label"]))
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_operations_are_recorded_with_transaction() {
        let driver = InMemoryDriver::new();
        driver
            .create_table(TableDefinition::new("tag", &["label"]))
            .await
            .unwrap();
        let tx = TransactionContext::new();

        driver
            .insert("tag", row(&[("label", Value::from("db"))]), Some(&tx))
            .await
            .unwrap();
        driver
            .delete("tag", row(&[("label", Value::from("db"))]), None)
            .await
            .unwrap();

        let ops = driver.recorded_operations().await;
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].kind, OperationKind::Insert);
        assert_eq!(ops[0].transaction, Some(tx.id()));
        assert_eq!(ops[1].kind, OperationKind::Delete);
        assert_eq!(ops[1].transaction, None);
        assert_eq!(driver.row_count("tag").await.unwrap(), 0);
    }

    #[test]
    fn test_recorded_operation_serializes_with_transaction() {
        let op = RecordedOperation {
            kind: OperationKind::Insert,
            entity_name: "tag".to_string(),
            filter: None,
            payload: Some(row(&[("label", Value::from("db"))])),
            transaction: Some(TransactionId(7)),
        };
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["transaction"], serde_json::json!(7));
        let back: RecordedOperation = serde_json::from_value(json).unwrap();
        assert_eq!(back, op);
    }

    #[tokio::test]
    async fn test_injected_failure_is_consumed_once() {
        let driver = InMemoryDriver::new();
        driver
            .create_table(TableDefinition::new("tag", &["label"]))
            .await
            .unwrap();
        driver
            .fail_next(StorageError::Timeout("slow disk".to_string()))
            .await;

        let first = driver
            .insert("tag", row(&[("label", Value::from("a"))]), None)
            .await;
        assert_eq!(first, Err(StorageError::Timeout("slow disk".to_string())));

        driver
            .insert("tag", row(&[("label", Value::from("a"))]), None)
            .await
            .unwrap();
        assert_eq!(driver.row_count("tag").await.unwrap(), 1);
    }
}

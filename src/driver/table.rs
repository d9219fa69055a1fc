use crate::core::{Row, StorageError, Value};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{QueryResult, StorageResult};

/// Value the backend fills in when an insert leaves a column unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnDefault {
    Value(Value),
    CurrentTimestamp,
}

impl ColumnDefault {
    fn produce(&self) -> Value {
        match self {
            Self::Value(value) => value.clone(),
            Self::CurrentTimestamp => Value::Timestamp(Utc::now()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDefinition {
    name: String,
    primary_key: Vec<String>,
    auto_increment: Option<String>,
    version_column: Option<String>,
    defaults: BTreeMap<String, ColumnDefault>,
}

impl TableDefinition {
    pub fn new(name: &str, primary_key: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            primary_key: primary_key.iter().map(|c| c.to_string()).collect(),
            auto_increment: None,
            version_column: None,
            defaults: BTreeMap::new(),
        }
    }

    /// Generates integer keys for `column` when an insert leaves it unset.
    pub fn auto_increment(mut self, column: &str) -> Self {
        self.auto_increment = Some(column.to_string());
        self
    }

    /// Starts `column` at 1 and increments it on every update.
    pub fn version_column(mut self, column: &str) -> Self {
        self.version_column = Some(column.to_string());
        self
    }

    pub fn default_value(mut self, column: &str, default: ColumnDefault) -> Self {
        self.defaults.insert(column.to_string(), default);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }
}

#[derive(Debug, Clone)]
pub struct Table {
    definition: TableDefinition,
    rows: BTreeMap<usize, Row>,
    next_row_id: usize,
    next_key: i64,
}

impl Table {
    pub fn new(definition: TableDefinition) -> Self {
        Self {
            definition,
            rows: BTreeMap::new(),
            next_row_id: 0,
            next_key: 1,
        }
    }

    pub fn definition(&self) -> &TableDefinition {
        &self.definition
    }

    pub fn insert(&mut self, mut row: Row) -> StorageResult<QueryResult> {
        let mut returned = Row::new();
        let mut insert_id = None;

        if let Some(column) = &self.definition.auto_increment {
            match row.get(column).and_then(Value::as_i64) {
                Some(explicit) => {
                    let after = explicit
                        .checked_add(1)
                        .ok_or_else(|| self.key_exhausted(column))?;
                    self.next_key = self.next_key.max(after);
                }
                None => {
                    let key = Value::Integer(self.next_key);
                    self.next_key = self
                        .next_key
                        .checked_add(1)
                        .ok_or_else(|| self.key_exhausted(column))?;
                    row.insert(column.clone(), key.clone());
                    returned.insert(column.clone(), key.clone());
                    insert_id = Some(key);
                }
            }
        }

        for (column, default) in &self.definition.defaults {
            if row.get(column).is_none_or(Value::is_null) {
                let value = default.produce();
                row.insert(column.clone(), value.clone());
                returned.insert(column.clone(), value);
            }
        }

        if let Some(column) = &self.definition.version_column {
            if row.get(column).is_none_or(Value::is_null) {
                row.insert(column.clone(), Value::Integer(1));
            }
            if let Some(version) = row.get(column) {
                returned.insert(column.clone(), version.clone());
            }
        }

        let key = self.key_of(&row)?;
        if self.rows.values().any(|existing| self.key_matches(existing, &key)) {
            return Err(StorageError::ConstraintViolation(format!(
                "duplicate primary key {:?} in '{}'",
                key, self.definition.name
            )));
        }

        let id = self.next_row_id;
        self.next_row_id += 1;
        self.rows.insert(id, row);

        Ok(QueryResult {
            affected_rows: 1,
            insert_id,
            row: Some(returned),
        })
    }

    pub fn update(&mut self, filter: &Row, payload: &Row) -> StorageResult<QueryResult> {
        let ids = self.matching_ids(filter);
        let version_column = self.definition.version_column.clone();
        let mut returned = None;

        let mut next_versions = Vec::new();
        if let Some(column) = &version_column
            && !payload.contains_key(column)
        {
            for id in &ids {
                let current = self
                    .rows
                    .get(id)
                    .and_then(|row| row.get(column))
                    .and_then(Value::as_i64)
                    .unwrap_or(0);
                let next = current.checked_add(1).ok_or_else(|| {
                    StorageError::ConstraintViolation(format!(
                        "version column '{}' of '{}' overflowed",
                        column, self.definition.name
                    ))
                })?;
                next_versions.push(next);
            }
        }

        for (index, id) in ids.iter().enumerate() {
            let Some(row) = self.rows.get_mut(id) else {
                continue;
            };
            for (column, value) in payload {
                row.insert(column.clone(), value.clone());
            }
            if let (Some(column), Some(next)) = (&version_column, next_versions.get(index)) {
                row.insert(column.clone(), Value::Integer(*next));
            }
            if let Some(column) = &version_column {
                let mut reported = Row::new();
                if let Some(version) = row.get(column) {
                    reported.insert(column.clone(), version.clone());
                }
                returned = Some(reported);
            }
        }

        Ok(QueryResult {
            affected_rows: ids.len() as u64,
            insert_id: None,
            row: returned,
        })
    }

    pub fn delete(&mut self, filter: &Row) -> u64 {
        let ids = self.matching_ids(filter);
        for id in &ids {
            self.rows.remove(id);
        }
        ids.len() as u64
    }

    /// First matching row, projected to the primary key plus `populate`
    /// (all columns when `populate` is empty).
    pub fn find_one(&self, filter: &Row, populate: &[String]) -> Option<Row> {
        let row = self
            .rows
            .values()
            .find(|row| Self::row_matches(row, filter))?;
        if populate.is_empty() {
            return Some(row.clone());
        }
        Some(
            row.iter()
                .filter(|(column, _)| {
                    self.definition.primary_key.contains(column) || populate.contains(column)
                })
                .map(|(column, value)| (column.clone(), value.clone()))
                .collect(),
        )
    }

    pub fn rows(&self) -> Vec<Row> {
        self.rows.values().cloned().collect()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn key_exhausted(&self, column: &str) -> StorageError {
        StorageError::ConstraintViolation(format!(
            "auto-increment column '{}' of '{}' is out of range",
            column, self.definition.name
        ))
    }

    fn key_of(&self, row: &Row) -> StorageResult<Vec<Value>> {
        self.definition
            .primary_key
            .iter()
            .map(|column| {
                row.get(column)
                    .filter(|value| !value.is_null())
                    .cloned()
                    .ok_or_else(|| {
                        StorageError::ConstraintViolation(format!(
                            "primary key column '{}' of '{}' is NULL",
                            column, self.definition.name
                        ))
                    })
            })
            .collect()
    }

    fn key_matches(&self, row: &Row, key: &[Value]) -> bool {
        self.definition
            .primary_key
            .iter()
            .zip(key)
            .all(|(column, value)| row.get(column) == Some(value))
    }

    fn matching_ids(&self, filter: &Row) -> Vec<usize> {
        self.rows
            .iter()
            .filter(|(_, row)| Self::row_matches(row, filter))
            .map(|(id, _)| *id)
            .collect()
    }

    fn row_matches(row: &Row, filter: &Row) -> bool {
        filter.iter().all(|(column, expected)| {
            row.get(column).unwrap_or(&Value::Null) == expected
        })
    }
}

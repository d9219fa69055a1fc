// ============================================================================
// Transaction Context
// ============================================================================
//
// The persister never opens, commits or rolls back transactions. It only
// carries the caller's handle to every storage call unchanged, so drivers can
// route the statement onto the right connection.
//
// ============================================================================

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Global transaction ID counter
static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a caller-owned transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Generate a new unique transaction ID
    pub fn new() -> Self {
        TransactionId(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

/// Opaque transaction handle passed through to the storage driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionContext {
    id: TransactionId,
    label: Option<String>,
}

impl TransactionContext {
    pub fn new() -> Self {
        Self {
            id: TransactionId::new(),
            label: None,
        }
    }

    pub fn with_id(id: TransactionId) -> Self {
        Self { id, label: None }
    }

    /// Attach a human-readable label, recorded on the persist span.
    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

impl Default for TransactionContext {
    fn default() -> Self {
        Self::new()
    }
}

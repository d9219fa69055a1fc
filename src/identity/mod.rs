// ============================================================================
// Deferred Identifiers
// ============================================================================
//
// A payload may reference an entity whose primary key is not known yet. The
// reference is a single-assignment cell keyed by the target's transient
// identity; the target's persist call resolves it, later readers observe
// either "pending" or the final value, never anything in between.
//
// ============================================================================

use crate::core::{PersistError, Result, Value};
use crate::entity::TransientId;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};
use tokio::sync::Notify;

struct CellInner {
    owner: TransientId,
    value: OnceLock<Value>,
    resolved: Notify,
}

/// Write-once placeholder for another entity's primary key.
///
/// Cells are issued by [`IdentifierMap::get`], which is what back-fill resolves.
#[derive(Clone)]
pub struct DeferredIdentifier {
    inner: Arc<CellInner>,
}

impl DeferredIdentifier {
    pub(crate) fn new(owner: TransientId) -> Self {
        Self {
            inner: Arc::new(CellInner {
                owner,
                value: OnceLock::new(),
                resolved: Notify::new(),
            }),
        }
    }

    /// Transient identity of the entity whose key this cell will hold.
    pub fn owner(&self) -> TransientId {
        self.inner.owner
    }

    /// Assigns the final value.
    ///
    /// Resolving again with an equal value is a no-op; a different value is
    /// rejected and the cell keeps its first value.
    pub fn resolve(&self, value: Value) -> Result<()> {
        match self.inner.value.set(value) {
            Ok(()) => {
                self.inner.resolved.notify_waiters();
                Ok(())
            }
            Err(attempted) => {
                let existing = self.inner.value.get().cloned().unwrap_or(Value::Null);
                if existing == attempted {
                    Ok(())
                } else {
                    Err(PersistError::IdentifierAlreadyResolved {
                        existing,
                        attempted,
                    })
                }
            }
        }
    }

    /// Returns the resolved value, or `None` while pending.
    pub fn read(&self) -> Option<Value> {
        self.inner.value.get().cloned()
    }

    pub fn is_resolved(&self) -> bool {
        self.inner.value.get().is_some()
    }

    /// Waits until the cell is resolved.
    pub async fn wait(&self) -> Value {
        loop {
            let notified = self.inner.resolved.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if let Some(value) = self.read() {
                return value;
            }
            notified.await;
        }
    }

    /// Whether both handles point at the same cell.
    pub fn same_cell(&self, other: &DeferredIdentifier) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for DeferredIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredIdentifier")
            .field("owner", &self.inner.owner)
            .field("value", &self.inner.value.get())
            .finish()
    }
}

/// Transient identity -> identifier cell, scoped to one unit of work.
///
/// Cloning shares the underlying map.
#[derive(Clone, Default)]
pub struct IdentifierMap {
    cells: Arc<RwLock<HashMap<TransientId, DeferredIdentifier>>>,
}

impl IdentifierMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cell for `id`, creating a pending one on first access.
    pub fn get(&self, id: TransientId) -> Result<DeferredIdentifier> {
        if let Some(cell) = self.cells.read()?.get(&id) {
            return Ok(cell.clone());
        }
        let mut cells = self.cells.write()?;
        Ok(cells
            .entry(id)
            .or_insert_with(|| DeferredIdentifier::new(id))
            .clone())
    }

    /// Returns the cell for `id` only if one was already handed out.
    pub fn peek(&self, id: TransientId) -> Result<Option<DeferredIdentifier>> {
        Ok(self.cells.read()?.get(&id).cloned())
    }

    /// Transient ids whose cells are still unresolved.
    pub fn pending(&self) -> Result<Vec<TransientId>> {
        let cells = self.cells.read()?;
        let mut pending: Vec<TransientId> = cells
            .iter()
            .filter(|(_, cell)| !cell.is_resolved())
            .map(|(id, _)| *id)
            .collect();
        pending.sort();
        Ok(pending)
    }

    pub fn len(&self) -> usize {
        self.cells.read().map(|cells| cells.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for IdentifierMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentifierMap")
            .field("cells", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_is_single_assignment() {
        let cell = DeferredIdentifier::new(TransientId::new());
        assert_eq!(cell.read(), None);

        cell.resolve(Value::Integer(7)).unwrap();
        cell.resolve(Value::Integer(7)).unwrap();
        let err = cell.resolve(Value::Integer(8)).unwrap_err();
        assert!(matches!(err, PersistError::IdentifierAlreadyResolved { .. }));
        assert_eq!(cell.read(), Some(Value::Integer(7)));
    }

    #[test]
    fn test_map_hands_out_shared_cells() {
        let map = IdentifierMap::new();
        let id = TransientId::new();
        let a = map.get(id).unwrap();
        let b = map.clone().get(id).unwrap();
        assert!(a.same_cell(&b));

        assert_eq!(map.pending().unwrap(), vec![id]);
        b.resolve(Value::Integer(1)).unwrap();
        assert_eq!(a.read(), Some(Value::Integer(1)));
        assert!(map.pending().unwrap().is_empty());
    }

    #[test]
    fn test_peek_does_not_create() {
        let map = IdentifierMap::new();
        assert!(map.peek(TransientId::new()).unwrap().is_none());
        assert!(map.is_empty());
    }

    #[tokio::test]
    async fn test_wait_observes_later_resolution() {
        let cell = DeferredIdentifier::new(TransientId::new());
        let waiter = {
            let cell = cell.clone();
            tokio::spawn(async move { cell.wait().await })
        };
        tokio::task::yield_now().await;
        cell.resolve(Value::from("abc")).unwrap();
        assert_eq!(waiter.await.unwrap(), Value::from("abc"));
    }
}

// ============================================================================
// Change-Set Persister
// ============================================================================
//
// Applies one changeset to storage in strictly ordered steps:
//
//   1. reference resolution + generation hooks   (references.rs)
//   2. insert / update / delete dispatch         (dispatch.rs)
//   3. returned-value mapping                    (mapping.rs)
//   4. primary-key back-fill                     (mapping.rs)
//   5. optimistic-lock verification             (locking.rs)
//   6. commit flag
//
// Step 1 finishes before anything is sent to storage. The changeset is only
// marked committed once every step has succeeded.
//
// ============================================================================

pub mod config;
mod dispatch;
mod locking;
mod mapping;
mod references;

pub use config::PersisterConfig;

use crate::changeset::ChangeSet;
use crate::core::{PersistError, Result, StorageError};
use crate::driver::StorageDriver;
use crate::entity::Entity;
use crate::identity::IdentifierMap;
use crate::metadata::MetadataRegistry;
use crate::transaction::TransactionContext;
use std::sync::Arc;
use tracing::{Instrument, Level, event, info_span};

/// Per-unit-of-work state shared by every persist call: the identifier map
/// and the caller's transaction handle.
#[derive(Debug, Clone, Default)]
pub struct PersistContext {
    identifiers: IdentifierMap,
    transaction: Option<TransactionContext>,
}

impl PersistContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identifiers(identifiers: IdentifierMap) -> Self {
        Self {
            identifiers,
            transaction: None,
        }
    }

    pub fn with_transaction(mut self, transaction: TransactionContext) -> Self {
        self.transaction = Some(transaction);
        self
    }

    pub fn identifiers(&self) -> &IdentifierMap {
        &self.identifiers
    }

    pub fn transaction(&self) -> Option<&TransactionContext> {
        self.transaction.as_ref()
    }
}

pub struct ChangeSetPersister {
    metadata: Arc<MetadataRegistry>,
    driver: Arc<dyn StorageDriver>,
    config: PersisterConfig,
}

impl ChangeSetPersister {
    pub fn new(metadata: Arc<MetadataRegistry>, driver: Arc<dyn StorageDriver>) -> Self {
        Self::with_config(metadata, driver, PersisterConfig::default())
    }

    pub fn with_config(
        metadata: Arc<MetadataRegistry>,
        driver: Arc<dyn StorageDriver>,
        config: PersisterConfig,
    ) -> Self {
        Self {
            metadata,
            driver,
            config,
        }
    }

    pub fn config(&self) -> &PersisterConfig {
        &self.config
    }

    pub fn metadata(&self) -> &MetadataRegistry {
        &self.metadata
    }

    /// Applies `change_set` to storage and writes generated values back into
    /// its entity.
    ///
    /// On error the changeset stays uncommitted; nothing is retried.
    ///
    /// ```
    /// use std::sync::Arc;
    /// use changeset_persister::{
    ///     ChangeSet, ChangeSetPersister, Entity, EntityMetadata, EntityRecord, InMemoryDriver,
    ///     MetadataRegistry, PersistContext, PropertyDescriptor, TableDefinition, Value,
    /// };
    ///
    /// # tokio_test::block_on(async {
    /// let driver = Arc::new(InMemoryDriver::new());
    /// driver
    ///     .create_table(TableDefinition::new("user", &["id"]).auto_increment("id"))
    ///     .await
    ///     .unwrap();
    /// let metadata = MetadataRegistry::new().with(
    ///     EntityMetadata::builder("user")
    ///         .property(PropertyDescriptor::new("id").primary())
    ///         .property(PropertyDescriptor::new("name"))
    ///         .build()
    ///         .unwrap(),
    /// );
    /// let persister = ChangeSetPersister::new(Arc::new(metadata), driver);
    ///
    /// let mut change_set = ChangeSet::create("user", EntityRecord::new()).with("name", "Ada");
    /// persister.persist(&mut change_set, &PersistContext::new()).await.unwrap();
    /// assert_eq!(change_set.entity.get("id"), Some(Value::Integer(1)));
    /// # });
    /// ```
    pub async fn persist<E: Entity>(
        &self,
        change_set: &mut ChangeSet<E>,
        ctx: &PersistContext,
    ) -> Result<()> {
        let span = info_span!(
            "persist.changeset",
            entity = %change_set.entity_name(),
            kind = %change_set.kind(),
            transient_id = %change_set.entity.transient_id(),
            tx = ctx.transaction().map(|tx| tx.id().as_u64()),
            tx_label = ctx.transaction().and_then(|tx| tx.label()),
        );
        self.persist_steps(change_set, ctx).instrument(span).await
    }

    /// Persists `change_sets` one after another in the given order, stopping
    /// at the first failure.
    pub async fn persist_all<E: Entity>(
        &self,
        change_sets: &mut [ChangeSet<E>],
        ctx: &PersistContext,
    ) -> Result<()> {
        for change_set in change_sets.iter_mut() {
            self.persist(change_set, ctx).await?;
        }
        Ok(())
    }

    async fn persist_steps<E: Entity>(
        &self,
        change_set: &mut ChangeSet<E>,
        ctx: &PersistContext,
    ) -> Result<()> {
        let meta = self.metadata.get(change_set.entity_name())?;

        references::resolve_references(&meta, change_set, ctx)?;
        let result = self.dispatch(&meta, change_set, ctx).await?;
        self.verify_version(&meta, change_set, &result, ctx).await?;

        change_set.mark_committed();
        event!(
            Level::DEBUG,
            affected_rows = result.affected_rows,
            "changeset committed"
        );
        Ok(())
    }

    fn storage_failure(&self, operation: &str, err: StorageError) -> PersistError {
        event!(Level::ERROR, operation = %operation, error = %err, "storage call failed");
        PersistError::Storage(err)
    }
}

use super::{ChangeSetPersister, PersistContext};
use crate::changeset::{ChangeSet, ChangeSetKind};
use crate::core::{PersistError, Result, StorageError, Value};
use crate::driver::{FindOptions, QueryResult};
use crate::entity::Entity;
use crate::metadata::EntityMetadata;
use tracing::{Level, event};

impl ChangeSetPersister {
    /// Fails a versioned update that matched no row.
    pub(super) fn check_conflict<E: Entity>(
        &self,
        meta: &EntityMetadata,
        change_set: &ChangeSet<E>,
        result: &QueryResult,
    ) -> Result<()> {
        let Some(version) = meta.version_property() else {
            return Ok(());
        };
        if change_set.kind() != ChangeSetKind::Update || result.affected_rows > 0 {
            return Ok(());
        }

        let expected = change_set.entity.get(version.name()).unwrap_or(Value::Null);
        event!(Level::WARN, expected_version = %expected, "optimistic lock conflict");
        Err(PersistError::LockConflict {
            entity: meta.name().to_string(),
            primary_key: meta
                .primary_key_values(&change_set.entity)
                .unwrap_or_default(),
            version: expected,
        })
    }

    /// Refreshes the in-memory version of a versioned create/update from
    /// storage.
    pub(super) async fn verify_version<E: Entity>(
        &self,
        meta: &EntityMetadata,
        change_set: &mut ChangeSet<E>,
        result: &QueryResult,
        ctx: &PersistContext,
    ) -> Result<()> {
        let Some(version) = meta.version_property() else {
            return Ok(());
        };
        if change_set.kind() == ChangeSetKind::Delete {
            return Ok(());
        }

        if self.config.reuse_returned_version
            && let Some(raw) = result.returned(version.field_name())
        {
            let refreshed = version.convert(raw)?;
            event!(Level::DEBUG, version = %refreshed, "version taken from write result");
            change_set.entity.set(version.name(), refreshed);
            return Ok(());
        }

        let filter = meta.primary_key_filter(&change_set.entity)?;
        let row = self
            .driver
            .find_one(
                change_set.entity_name(),
                filter,
                FindOptions::populate([version.field_name()]),
                ctx.transaction(),
            )
            .await
            .map_err(|err| self.storage_failure("find_one", err))?;

        match row.and_then(|mut row| row.remove(version.field_name())) {
            Some(raw) => {
                let refreshed = version.convert(&raw)?;
                event!(Level::DEBUG, version = %refreshed, "version refreshed");
                change_set.entity.set(version.name(), refreshed);
                Ok(())
            }
            None if self.config.require_version_row => {
                event!(Level::ERROR, "row missing on version refresh");
                Err(PersistError::Storage(StorageError::Execution(format!(
                    "row of '{}' not found while refreshing '{}'",
                    meta.name(),
                    version.name()
                ))))
            }
            None => {
                event!(Level::WARN, "row missing on version refresh, keeping in-memory version");
                Ok(())
            }
        }
    }
}

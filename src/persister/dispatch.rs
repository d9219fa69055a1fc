use super::mapping::{backfill_primary_key, link_assigned_key, map_returned_values, storage_row};
use super::{ChangeSetPersister, PersistContext};
use crate::changeset::{ChangeSet, ChangeSetKind};
use crate::core::{PersistError, Result, Value};
use crate::driver::QueryResult;
use crate::entity::Entity;
use crate::metadata::EntityMetadata;
use tracing::{Level, event};

impl ChangeSetPersister {
    /// Sends the changeset to storage and applies what the write reported.
    pub(super) async fn dispatch<E: Entity>(
        &self,
        meta: &EntityMetadata,
        change_set: &mut ChangeSet<E>,
        ctx: &PersistContext,
    ) -> Result<QueryResult> {
        match change_set.kind() {
            ChangeSetKind::Delete => self.dispatch_delete(meta, change_set, ctx).await,
            ChangeSetKind::Update => self.dispatch_update(meta, change_set, ctx).await,
            ChangeSetKind::Create => self.dispatch_create(meta, change_set, ctx).await,
        }
    }

    async fn dispatch_delete<E: Entity>(
        &self,
        meta: &EntityMetadata,
        change_set: &mut ChangeSet<E>,
        ctx: &PersistContext,
    ) -> Result<QueryResult> {
        let filter = meta.primary_key_filter(&change_set.entity)?;
        event!(Level::DEBUG, filter = ?filter, "dispatching delete");

        self.driver
            .delete(change_set.entity_name(), filter, ctx.transaction())
            .await
            .map_err(|err| self.storage_failure("delete", err))
    }

    async fn dispatch_update<E: Entity>(
        &self,
        meta: &EntityMetadata,
        change_set: &mut ChangeSet<E>,
        ctx: &PersistContext,
    ) -> Result<QueryResult> {
        let payload = storage_row(meta, change_set.resolved_payload()?);

        let mut filter = meta.primary_key_filter(&change_set.entity)?;
        if let Some(version) = meta.version_property() {
            let current = change_set.entity.get(version.name()).unwrap_or(Value::Null);
            filter.insert(version.field_name().to_string(), current);
        }

        self.log_dispatch("update", change_set);
        let result = self
            .driver
            .update(change_set.entity_name(), filter, payload, ctx.transaction())
            .await
            .map_err(|err| self.storage_failure("update", err))?;

        // a stale write must not leak returned values into the entity
        self.check_conflict(meta, change_set, &result)?;
        map_returned_values(meta, &mut change_set.entity, &result)?;
        Ok(result)
    }

    async fn dispatch_create<E: Entity>(
        &self,
        meta: &EntityMetadata,
        change_set: &mut ChangeSet<E>,
        ctx: &PersistContext,
    ) -> Result<QueryResult> {
        let key_assigned = meta.has_primary_key(&change_set.entity);
        let payload = storage_row(meta, change_set.resolved_payload()?);

        self.log_dispatch("insert", change_set);
        let result = self
            .driver
            .insert(change_set.entity_name(), payload, ctx.transaction())
            .await
            .map_err(|err| self.storage_failure("insert", err))?;

        map_returned_values(meta, &mut change_set.entity, &result)?;

        if key_assigned {
            link_assigned_key(meta, &change_set.entity, ctx)?;
        } else {
            let field = meta.primary_key_property().field_name();
            let raw = result
                .insert_id
                .clone()
                .or_else(|| result.returned(field).cloned())
                .ok_or_else(|| PersistError::MissingPrimaryKey {
                    entity: meta.name().to_string(),
                })?;
            backfill_primary_key(meta, &mut change_set.entity, &raw, ctx)?;
        }

        change_set.entity.mark_initialized();
        Ok(result)
    }

    fn log_dispatch<E: Entity>(&self, operation: &str, change_set: &ChangeSet<E>) {
        if self.config.log_payloads {
            event!(
                Level::DEBUG,
                operation = %operation,
                payload = %change_set.payload_json(),
                "dispatching changeset"
            );
        } else {
            event!(Level::DEBUG, operation = %operation, "dispatching changeset");
        }
    }
}

use super::PersistContext;
use super::mapping::backfill_primary_key;
use crate::changeset::{ChangeSet, ChangeSetKind, PayloadValue};
use crate::core::{PersistError, Result};
use crate::entity::Entity;
use crate::metadata::EntityMetadata;
use tracing::{Level, event};

/// Replaces resolved references in the payload and runs generation hooks,
/// property by property in declaration order.
///
/// A key produced by an on-create hook is back-filled immediately, so other
/// changesets can resolve against it before this insert is sent. Pending
/// references are rejected before any hook runs, so a failed changeset never
/// publishes its key.
pub(super) fn resolve_references<E: Entity>(
    meta: &EntityMetadata,
    change_set: &mut ChangeSet<E>,
    ctx: &PersistContext,
) -> Result<()> {
    let kind = change_set.kind();

    // deletes never send the payload
    if kind != ChangeSetKind::Delete {
        ensure_references_resolved(meta, change_set)?;
    }

    for property in meta.properties() {
        let name = property.name();

        let resolved = match change_set.payload.get(name) {
            Some(PayloadValue::Deferred(cell)) => cell.read(),
            _ => None,
        };
        if let Some(value) = resolved {
            event!(Level::TRACE, property = %name, value = %value, "reference resolved");
            change_set
                .payload
                .insert(name.to_string(), PayloadValue::Value(value));
        }

        let hook = match kind {
            ChangeSetKind::Create => property.create_hook(),
            ChangeSetKind::Update => property.update_hook(),
            ChangeSetKind::Delete => None,
        };
        let Some(hook) = hook else {
            continue;
        };

        let value = hook.generate(&change_set.entity);
        change_set.entity.set(name, value.clone());
        change_set
            .payload
            .insert(name.to_string(), PayloadValue::Value(value.clone()));

        if kind == ChangeSetKind::Create && property.is_primary() {
            backfill_primary_key(meta, &mut change_set.entity, &value, ctx)?;
        }
    }

    Ok(())
}

/// Fails on the first payload entry whose reference is still pending.
fn ensure_references_resolved<E: Entity>(
    meta: &EntityMetadata,
    change_set: &ChangeSet<E>,
) -> Result<()> {
    let Some(name) = change_set.unresolved_properties().first().map(|n| n.to_string()) else {
        return Ok(());
    };
    let target = meta
        .property(&name)
        .and_then(|property| property.reference())
        .map(str::to_string);

    event!(
        Level::ERROR,
        property = %name,
        refers_to = ?target,
        "reference still pending at dispatch"
    );
    Err(PersistError::UnresolvedReference {
        entity: meta.name().to_string(),
        property: name,
        target,
    })
}

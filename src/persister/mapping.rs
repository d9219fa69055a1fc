use super::PersistContext;
use crate::core::{PersistError, Result, Row, Value};
use crate::driver::QueryResult;
use crate::entity::Entity;
use crate::metadata::EntityMetadata;
use tracing::{Level, event};

/// Renames payload entries from property names to storage field names.
/// Entries that match no property are passed through unchanged.
pub(super) fn storage_row(meta: &EntityMetadata, payload: Row) -> Row {
    payload
        .into_iter()
        .map(|(name, value)| {
            let field = meta
                .property(&name)
                .map(|p| p.field_name().to_string())
                .unwrap_or(name);
            (field, value)
        })
        .collect()
}

/// Copies server-reported values into attributes the caller left unset.
///
/// Primary keys are skipped; they are only ever set by back-fill.
pub(super) fn map_returned_values(
    meta: &EntityMetadata,
    entity: &mut dyn Entity,
    result: &QueryResult,
) -> Result<()> {
    let Some(row) = &result.row else {
        return Ok(());
    };

    for property in meta.properties() {
        if property.is_primary() || entity.is_set(property.name()) {
            continue;
        }
        let Some(raw) = row.get(property.field_name()).filter(|v| !v.is_null()) else {
            continue;
        };
        let value = property.convert(raw)?;
        event!(Level::TRACE, property = %property.name(), value = %value, "returned value mapped");
        entity.set(property.name(), value);
    }
    Ok(())
}

/// Sets the entity's primary key from a newly known raw value (unless the
/// caller already set it) and resolves the entity's identifier cell.
pub(super) fn backfill_primary_key(
    meta: &EntityMetadata,
    entity: &mut dyn Entity,
    raw: &Value,
    ctx: &PersistContext,
) -> Result<()> {
    let property = meta.primary_key_property();
    let converted = property.convert(raw)?;

    if !entity.is_set(property.name()) {
        entity.set(property.name(), converted);
    }

    let key = entity
        .get(property.name())
        .filter(|v| !v.is_null())
        .ok_or_else(|| PersistError::MissingPrimaryKey {
            entity: meta.name().to_string(),
        })?;

    event!(Level::DEBUG, key = %key, "primary key back-filled");
    ctx.identifiers().get(entity.transient_id())?.resolve(key)
}

/// Resolves the identifier cell of an entity whose key the caller assigned.
pub(super) fn link_assigned_key(
    meta: &EntityMetadata,
    entity: &dyn Entity,
    ctx: &PersistContext,
) -> Result<()> {
    let property = meta.primary_key_property();
    let Some(key) = entity.get(property.name()).filter(|v| !v.is_null()) else {
        return Ok(());
    };
    ctx.identifiers().get(entity.transient_id())?.resolve(key)
}

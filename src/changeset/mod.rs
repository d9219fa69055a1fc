// ============================================================================
// Change Sets
// ============================================================================
//
// One pending mutation for one entity instance, produced by the upstream
// change-tracking layer and consumed (mutated in place) by the persister.
//
// ============================================================================

use crate::core::{PersistError, Result, Row, Value};
use crate::entity::{Entity, EntityRecord};
use crate::identity::DeferredIdentifier;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeSetKind {
    Create,
    Update,
    Delete,
}

impl fmt::Display for ChangeSetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        };
        write!(f, "{label}")
    }
}

/// A payload entry: either a concrete value or a reference to another
/// entity's not-yet-known primary key.
#[derive(Debug, Clone)]
pub enum PayloadValue {
    Value(Value),
    Deferred(DeferredIdentifier),
}

impl PayloadValue {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::Deferred(_) => None,
        }
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, Self::Deferred(_))
    }
}

macro_rules! payload_value_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for PayloadValue {
                fn from(value: $ty) -> Self {
                    Self::Value(value.into())
                }
            }
        )*
    };
}

payload_value_from!(
    Value,
    i64,
    i32,
    f64,
    bool,
    String,
    &str,
    chrono::DateTime<chrono::Utc>,
);

impl From<DeferredIdentifier> for PayloadValue {
    fn from(cell: DeferredIdentifier) -> Self {
        Self::Deferred(cell)
    }
}

/// Property name -> value to be written.
pub type Payload = BTreeMap<String, PayloadValue>;

#[derive(Debug)]
pub struct ChangeSet<E: Entity = EntityRecord> {
    kind: ChangeSetKind,
    entity_name: String,
    pub entity: E,
    pub payload: Payload,
    committed: bool,
}

impl<E: Entity> ChangeSet<E> {
    pub fn new(kind: ChangeSetKind, entity_name: &str, entity: E) -> Self {
        Self {
            kind,
            entity_name: entity_name.to_string(),
            entity,
            payload: Payload::new(),
            committed: false,
        }
    }

    pub fn create(entity_name: &str, entity: E) -> Self {
        Self::new(ChangeSetKind::Create, entity_name, entity)
    }

    pub fn update(entity_name: &str, entity: E) -> Self {
        Self::new(ChangeSetKind::Update, entity_name, entity)
    }

    pub fn delete(entity_name: &str, entity: E) -> Self {
        Self::new(ChangeSetKind::Delete, entity_name, entity)
    }

    /// Builder-style payload entry.
    pub fn with(mut self, property: &str, value: impl Into<PayloadValue>) -> Self {
        self.payload.insert(property.to_string(), value.into());
        self
    }

    pub fn kind(&self) -> ChangeSetKind {
        self.kind
    }

    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    pub(crate) fn mark_committed(&mut self) {
        self.committed = true;
    }

    pub fn into_entity(self) -> E {
        self.entity
    }

    /// Names of payload entries still holding an unresolved reference.
    pub fn unresolved_properties(&self) -> Vec<&str> {
        self.payload
            .iter()
            .filter(|(_, value)| matches!(value, PayloadValue::Deferred(cell) if !cell.is_resolved()))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Renders the payload as JSON; pending references become
    /// `{"$deferred": "<transient id>"}`.
    pub fn payload_json(&self) -> serde_json::Value {
        let entries = self
            .payload
            .iter()
            .map(|(name, value)| {
                let json = match value {
                    PayloadValue::Value(value) => value.to_json(),
                    PayloadValue::Deferred(cell) => match cell.read() {
                        Some(value) => value.to_json(),
                        None => serde_json::json!({ "$deferred": cell.owner().to_string() }),
                    },
                };
                (name.clone(), json)
            })
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(entries)
    }

    /// Flattens the payload into concrete values keyed by property name.
    ///
    /// Fails on the first entry that is still a pending reference.
    pub(crate) fn resolved_payload(&self) -> Result<Row> {
        let mut row = Row::new();
        for (name, value) in &self.payload {
            let value = match value {
                PayloadValue::Value(value) => value.clone(),
                PayloadValue::Deferred(cell) => {
                    cell.read()
                        .ok_or_else(|| PersistError::UnresolvedReference {
                            entity: self.entity_name.clone(),
                            property: name.clone(),
                            target: None,
                        })?
                }
            };
            row.insert(name.clone(), value);
        }
        Ok(row)
    }
}

use crate::core::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Client-side identity of an in-memory entity, stable before and after the
/// storage layer assigns a primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransientId(Uuid);

impl TransientId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TransientId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Live, mutable object the persister reads from and writes back into.
///
/// Attributes are addressed by property name (not storage field name).
/// An attribute holding [`Value::Null`] counts as unset.
pub trait Entity: Send + Sync {
    /// Returns the transient identity used to key the identifier map.
    fn transient_id(&self) -> TransientId;
    /// Returns the current value of an attribute, if any.
    fn get(&self, attribute: &str) -> Option<Value>;
    /// Writes an attribute.
    fn set(&mut self, attribute: &str, value: Value);
    /// Whether the entity has been written to storage at least once.
    fn is_initialized(&self) -> bool;
    /// Marks the entity as backed by a stored row.
    fn mark_initialized(&mut self);

    fn is_set(&self, attribute: &str) -> bool {
        self.get(attribute).is_some_and(|value| !value.is_null())
    }
}

impl<E: Entity + ?Sized> Entity for Box<E> {
    fn transient_id(&self) -> TransientId {
        (**self).transient_id()
    }

    fn get(&self, attribute: &str) -> Option<Value> {
        (**self).get(attribute)
    }

    fn set(&mut self, attribute: &str, value: Value) {
        (**self).set(attribute, value)
    }

    fn is_initialized(&self) -> bool {
        (**self).is_initialized()
    }

    fn mark_initialized(&mut self) {
        (**self).mark_initialized()
    }
}

/// Attribute-map entity for dynamically described schemas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    transient_id: TransientId,
    attributes: BTreeMap<String, Value>,
    initialized: bool,
}

impl EntityRecord {
    pub fn new() -> Self {
        Self {
            transient_id: TransientId::new(),
            attributes: BTreeMap::new(),
            initialized: false,
        }
    }

    /// Builder-style attribute setter.
    pub fn with(mut self, attribute: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(attribute.to_string(), value.into());
        self
    }

    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    pub fn remove(&mut self, attribute: &str) -> Option<Value> {
        self.attributes.remove(attribute)
    }
}

impl Default for EntityRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl Entity for EntityRecord {
    fn transient_id(&self) -> TransientId {
        self.transient_id
    }

    fn get(&self, attribute: &str) -> Option<Value> {
        self.attributes.get(attribute).cloned()
    }

    fn set(&mut self, attribute: &str, value: Value) {
        self.attributes.insert(attribute.to_string(), value);
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn mark_initialized(&mut self) {
        self.initialized = true;
    }
}

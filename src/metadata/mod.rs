// ============================================================================
// Entity Metadata
// ============================================================================
//
// Static, shared schema description consumed by the persister: ordered
// properties, primary keys and the optional optimistic-lock version property.
//
// ============================================================================

pub mod property;
pub mod registry;

pub use property::{
    IntegerConverter, PropertyDescriptor, TimestampConverter, TypeConverter, ValueGenerator,
};
pub use registry::MetadataRegistry;

use crate::core::{PersistError, Result, Row, Value};
use crate::entity::Entity;
use std::sync::Arc;

/// Schema description of one entity type.
#[derive(Debug, Clone)]
pub struct EntityMetadata {
    name: String,
    properties: Vec<Arc<PropertyDescriptor>>,
    primary_keys: Vec<String>,
    version_property: Option<String>,
}

impl EntityMetadata {
    pub fn builder(name: &str) -> EntityMetadataBuilder {
        EntityMetadataBuilder {
            name: name.to_string(),
            properties: Vec::new(),
            version_property: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Properties in declaration order.
    pub fn properties(&self) -> &[Arc<PropertyDescriptor>] {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&Arc<PropertyDescriptor>> {
        self.properties.iter().find(|p| p.name() == name)
    }

    pub fn primary_keys(&self) -> &[String] {
        &self.primary_keys
    }

    pub fn has_composite_key(&self) -> bool {
        self.primary_keys.len() > 1
    }

    /// The first primary-key property; auto-generated ids land here.
    pub fn primary_key_property(&self) -> &Arc<PropertyDescriptor> {
        // build() guarantees at least one primary key that exists
        &self.properties[self.primary_key_index(0)]
    }

    pub fn version_property(&self) -> Option<&Arc<PropertyDescriptor>> {
        self.version_property
            .as_deref()
            .and_then(|name| self.property(name))
    }

    /// Whether every primary-key attribute of `entity` is set.
    pub fn has_primary_key(&self, entity: &dyn Entity) -> bool {
        self.primary_keys.iter().all(|pk| entity.is_set(pk))
    }

    pub fn primary_key_values(&self, entity: &dyn Entity) -> Option<Vec<Value>> {
        self.primary_keys
            .iter()
            .map(|pk| entity.get(pk).filter(|v| !v.is_null()))
            .collect()
    }

    /// Builds a `field name -> value` filter selecting `entity` by primary key.
    pub fn primary_key_filter(&self, entity: &dyn Entity) -> Result<Row> {
        let mut filter = Row::new();
        for pk in &self.primary_keys {
            let value = entity
                .get(pk)
                .filter(|v| !v.is_null())
                .ok_or_else(|| PersistError::MissingPrimaryKey {
                    entity: self.name.clone(),
                })?;
            let field = self
                .property(pk)
                .map(|p| p.field_name().to_string())
                .unwrap_or_else(|| pk.clone());
            filter.insert(field, value);
        }
        Ok(filter)
    }

    fn primary_key_index(&self, position: usize) -> usize {
        let name = &self.primary_keys[position];
        self.properties
            .iter()
            .position(|p| p.name() == name)
            .unwrap_or_default()
    }
}

pub struct EntityMetadataBuilder {
    name: String,
    properties: Vec<PropertyDescriptor>,
    version_property: Option<String>,
}

impl EntityMetadataBuilder {
    pub fn property(mut self, property: PropertyDescriptor) -> Self {
        self.properties.push(property);
        self
    }

    /// Declares the property used for optimistic locking.
    pub fn version_property(mut self, name: &str) -> Self {
        self.version_property = Some(name.to_string());
        self
    }

    pub fn build(self) -> Result<EntityMetadata> {
        let mut seen = std::collections::HashSet::new();
        for property in &self.properties {
            if !seen.insert(property.name().to_string()) {
                return Err(PersistError::Metadata(format!(
                    "Property '{}' declared twice on '{}'",
                    property.name(),
                    self.name
                )));
            }
        }

        let primary_keys: Vec<String> = self
            .properties
            .iter()
            .filter(|p| p.is_primary())
            .map(|p| p.name().to_string())
            .collect();
        if primary_keys.is_empty() {
            return Err(PersistError::Metadata(format!(
                "Entity '{}' declares no primary key",
                self.name
            )));
        }

        if let Some(version) = &self.version_property {
            let Some(property) = self.properties.iter().find(|p| p.name() == version) else {
                return Err(PersistError::Metadata(format!(
                    "Version property '{}' is not a property of '{}'",
                    version, self.name
                )));
            };
            if property.is_primary() {
                return Err(PersistError::Metadata(format!(
                    "Version property '{}' of '{}' cannot be part of the primary key",
                    version, self.name
                )));
            }
        }

        Ok(EntityMetadata {
            name: self.name,
            properties: self.properties.into_iter().map(Arc::new).collect(),
            primary_keys,
            version_property: self.version_property,
        })
    }
}

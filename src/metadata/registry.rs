use super::EntityMetadata;
use crate::core::{PersistError, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Entity name -> metadata lookup shared by every persist call.
#[derive(Debug, Clone, Default)]
pub struct MetadataRegistry {
    entities: HashMap<String, Arc<EntityMetadata>>,
}

impl MetadataRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the metadata for `metadata.name()`.
    pub fn register(&mut self, metadata: EntityMetadata) -> &mut Self {
        self.entities
            .insert(metadata.name().to_string(), Arc::new(metadata));
        self
    }

    pub fn with(mut self, metadata: EntityMetadata) -> Self {
        self.register(metadata);
        self
    }

    pub fn get(&self, entity_name: &str) -> Result<Arc<EntityMetadata>> {
        self.entities
            .get(entity_name)
            .cloned()
            .ok_or_else(|| PersistError::UnknownEntity(entity_name.to_string()))
    }

    pub fn contains(&self, entity_name: &str) -> bool {
        self.entities.contains_key(entity_name)
    }

    pub fn entity_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entities.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::PropertyDescriptor;

    #[test]
    fn test_unknown_entity_is_reported_by_name() {
        let registry = MetadataRegistry::new();
        match registry.get("Ghost") {
            Err(PersistError::UnknownEntity(name)) => assert_eq!(name, "Ghost"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_register_and_list() {
        let registry = MetadataRegistry::new()
            .with(
                EntityMetadata::builder("Publisher")
                    .property(PropertyDescriptor::new("id").primary())
                    .build()
                    .unwrap(),
            )
            .with(
                EntityMetadata::builder("Author")
                    .property(PropertyDescriptor::new("id").primary())
                    .build()
                    .unwrap(),
            );
        assert!(registry.contains("Author"));
        assert_eq!(registry.entity_names(), vec!["Author", "Publisher"]);
    }
}

// ============================================================================
// Change-Set Persister Library
// ============================================================================
//
// Applies single-entity mutations (create / update / delete) computed by an
// upstream change tracker to a storage driver: resolves deferred references,
// back-fills generated keys and values, and enforces optimistic locking.
//
// ============================================================================

pub mod changeset;
pub mod core;
pub mod driver;
pub mod entity;
pub mod identity;
pub mod metadata;
pub mod persister;
pub mod transaction;

// Re-export main types for convenience
pub use changeset::{ChangeSet, ChangeSetKind, Payload, PayloadValue};
pub use self::core::{PersistError, Result, Row, StorageError, Value};
pub use driver::{
    ColumnDefault, FindOptions, InMemoryDriver, OperationKind, QueryResult, RecordedOperation,
    StorageDriver, StorageResult, TableDefinition,
};
pub use entity::{Entity, EntityRecord, TransientId};
pub use identity::{DeferredIdentifier, IdentifierMap};
pub use metadata::{
    EntityMetadata, IntegerConverter, MetadataRegistry, PropertyDescriptor, TimestampConverter,
    TypeConverter, ValueGenerator,
};
pub use persister::{ChangeSetPersister, PersistContext, PersisterConfig};
pub use transaction::{TransactionContext, TransactionId};

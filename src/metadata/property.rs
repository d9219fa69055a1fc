use crate::core::{PersistError, Result, Value};
use crate::entity::Entity;
use chrono::{DateTime, TimeZone, Utc};
use std::fmt;
use std::sync::Arc;

/// Converts a raw storage value into its in-memory representation.
pub trait TypeConverter: Send + Sync {
    fn to_in_memory(&self, raw: &Value) -> Result<Value>;
}

impl<F> TypeConverter for F
where
    F: Fn(&Value) -> Result<Value> + Send + Sync,
{
    fn to_in_memory(&self, raw: &Value) -> Result<Value> {
        self(raw)
    }
}

/// Produces a property value from the current entity state.
///
/// Attached to a property as an on-create or on-update hook.
pub trait ValueGenerator: Send + Sync {
    fn generate(&self, entity: &dyn Entity) -> Value;
}

impl<F> ValueGenerator for F
where
    F: Fn(&dyn Entity) -> Value + Send + Sync,
{
    fn generate(&self, entity: &dyn Entity) -> Value {
        self(entity)
    }
}

/// Coerces integers, floats and numeric text into `Value::Integer`.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegerConverter;

impl TypeConverter for IntegerConverter {
    fn to_in_memory(&self, raw: &Value) -> Result<Value> {
        match raw {
            Value::Null => Ok(Value::Null),
            other => other
                .as_i64()
                .map(Value::Integer)
                .ok_or_else(|| PersistError::Conversion {
                    property: String::new(),
                    message: format!("cannot read {} as INTEGER", other.type_name()),
                }),
        }
    }
}

/// Reads RFC 3339 text or epoch milliseconds as `Value::Timestamp`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampConverter;

impl TypeConverter for TimestampConverter {
    fn to_in_memory(&self, raw: &Value) -> Result<Value> {
        let converted: Option<DateTime<Utc>> = match raw {
            Value::Null => return Ok(Value::Null),
            Value::Integer(millis) => Utc.timestamp_millis_opt(*millis).single(),
            other => other.as_timestamp(),
        };
        converted
            .map(Value::Timestamp)
            .ok_or_else(|| PersistError::Conversion {
                property: String::new(),
                message: format!("cannot read {} as TIMESTAMP", raw),
            })
    }
}

/// Schema description of one entity property.
#[derive(Clone)]
pub struct PropertyDescriptor {
    name: String,
    field_name: String,
    primary: bool,
    reference: Option<String>,
    converter: Option<Arc<dyn TypeConverter>>,
    on_create: Option<Arc<dyn ValueGenerator>>,
    on_update: Option<Arc<dyn ValueGenerator>>,
}

impl PropertyDescriptor {
    /// Creates a property whose storage field has the same name.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            field_name: name.to_string(),
            primary: false,
            reference: None,
            converter: None,
            on_create: None,
            on_update: None,
        }
    }

    /// Sets the storage field name.
    pub fn field(mut self, field_name: &str) -> Self {
        self.field_name = field_name.to_string();
        self
    }

    /// Marks the property as (part of) the primary key.
    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    /// Marks the property as a reference to another entity type.
    pub fn references(mut self, entity_name: &str) -> Self {
        self.reference = Some(entity_name.to_string());
        self
    }

    pub fn converter(mut self, converter: impl TypeConverter + 'static) -> Self {
        self.converter = Some(Arc::new(converter));
        self
    }

    pub fn on_create(mut self, generator: impl ValueGenerator + 'static) -> Self {
        self.on_create = Some(Arc::new(generator));
        self
    }

    pub fn on_update(mut self, generator: impl ValueGenerator + 'static) -> Self {
        self.on_update = Some(Arc::new(generator));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn reference(&self) -> Option<&str> {
        self.reference.as_deref()
    }

    pub fn create_hook(&self) -> Option<&Arc<dyn ValueGenerator>> {
        self.on_create.as_ref()
    }

    pub fn update_hook(&self) -> Option<&Arc<dyn ValueGenerator>> {
        self.on_update.as_ref()
    }

    /// Runs the custom converter, if any; otherwise returns the raw value.
    pub fn convert(&self, raw: &Value) -> Result<Value> {
        match &self.converter {
            Some(converter) => converter.to_in_memory(raw).map_err(|err| match err {
                PersistError::Conversion { message, .. } => PersistError::Conversion {
                    property: self.name.clone(),
                    message,
                },
                other => other,
            }),
            None => Ok(raw.clone()),
        }
    }
}

impl fmt::Debug for PropertyDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyDescriptor")
            .field("name", &self.name)
            .field("field_name", &self.field_name)
            .field("primary", &self.primary)
            .field("reference", &self.reference)
            .field("converter", &self.converter.is_some())
            .field("on_create", &self.on_create.is_some())
            .field("on_update", &self.on_update.is_some())
            .finish()
    }
}

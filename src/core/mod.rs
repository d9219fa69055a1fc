pub mod error;
pub mod value;

pub use error::{PersistError, Result, StorageError};
pub use value::Value;

use std::collections::BTreeMap;

/// Column name -> value, as exchanged with a storage driver.
pub type Row = BTreeMap<String, Value>;

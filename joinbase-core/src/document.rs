// src/document.rs
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Document ID as stored in the `_id` field.
/// Untagged so it appears as a plain value in documents: {"_id": 2}
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum DocumentId {
    Int(i64),
    String(String),
}

impl DocumentId {
    /// Next auto-increment ID
    pub fn new_auto(last_id: u64) -> Self {
        DocumentId::Int((last_id + 1) as i64)
    }

    /// Read an `_id` value. `None` for values that cannot identify a document
    /// (objects, arrays, booleans, fractional numbers, null).
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(DocumentId::Int),
            Value::String(s) => Some(DocumentId::String(s.clone())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            DocumentId::Int(i) => Value::from(*i),
            DocumentId::String(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentId::Int(i) => write!(f, "{}", i),
            DocumentId::String(s) => write!(f, "{}", s),
        }
    }
}

/// Name of a collection in the store.
///
/// Derived names are the lower-cased record type name (`User` -> `user`); the
/// same string is the join and query key, so two record types must not map to
/// the same name within one store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionName(String);

impl CollectionName {
    /// Use `name` verbatim
    pub fn new(name: impl Into<String>) -> Self {
        CollectionName(name.into())
    }

    /// Lower-cased record type name
    pub fn from_type_name(type_name: &str) -> Self {
        CollectionName(type_name.to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the array field a lookup into `right` adds to documents of this
    /// collection: `<self>_<right>`
    pub fn joined_field(&self, right: &CollectionName) -> String {
        format!("{}_{}", self.0, right.0)
    }

    /// Collection names must be non-empty and free of `$` and NUL
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty() && !self.0.contains('$') && !self.0.contains('\0')
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CollectionName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CollectionName {
    fn from(name: &str) -> Self {
        CollectionName::new(name)
    }
}

/// A record type that lives in its own collection.
///
/// Field access goes through serde: object keys in the JSON source map to
/// struct fields by exact name, and the serialized record is what the store
/// persists.
///
/// ```rust
/// use joinbase_core::Record;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Organization {
///     #[serde(rename = "_id")]
///     id: i64,
///     name: String,
/// }
///
/// impl Record for Organization {
///     const TYPE_NAME: &'static str = "Organization";
/// }
///
/// assert_eq!(Organization::collection_name().as_str(), "organization");
/// ```
pub trait Record: Serialize + DeserializeOwned {
    const TYPE_NAME: &'static str;

    fn collection_name() -> CollectionName {
        CollectionName::from_type_name(Self::TYPE_NAME)
    }
}

/// Schema-less record, used when the collection is only known at run time
pub type DynamicRecord = Map<String, Value>;

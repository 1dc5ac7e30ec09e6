//! Canonical configuration trees.
//!
//! Desired-state records and remote API responses are both reduced to a
//! [`ConfigTree`] before they are compared. The tree is an explicit tagged
//! union built from `serde_json::Value`, so the differ never has to reflect
//! over arbitrary Rust types.

mod path;

pub use path::{ChangePath, top_level_key};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use std::fmt;

/// A scalar leaf value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// Boolean value.
    Bool(bool),
    /// Numeric value, kept in its JSON representation.
    Number(Number),
    /// String value.
    String(String),
}

/// A dynamically-shaped configuration value.
///
/// Object keys are unique and iterate in lexicographic order; arrays are
/// positional.
#[derive(Debug, Clone, Default)]
pub enum ConfigTree {
    /// Absent value.
    #[default]
    Null,
    /// Scalar leaf.
    Scalar(Scalar),
    /// Positional list.
    Array(Vec<ConfigTree>),
    /// Keyed map.
    Object(BTreeMap<String, ConfigTree>),
}

impl ConfigTree {
    /// Builds a tree by serializing a typed record.
    ///
    /// # Errors
    ///
    /// Returns the serializer error if the record cannot be represented as JSON.
    pub fn from_serializable<T: Serialize>(value: &T) -> serde_json::Result<Self> {
        serde_json::to_value(value).map(Self::from)
    }

    /// Creates a string scalar.
    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self::Scalar(Scalar::String(value.into()))
    }

    /// Creates a boolean scalar.
    #[must_use]
    pub const fn bool(value: bool) -> Self {
        Self::Scalar(Scalar::Bool(value))
    }

    /// Creates an empty object.
    #[must_use]
    pub const fn empty_object() -> Self {
        Self::Object(BTreeMap::new())
    }

    /// Creates an empty array.
    #[must_use]
    pub const fn empty_array() -> Self {
        Self::Array(Vec::new())
    }

    /// Returns true for `null`, `[]` and `{}`.
    ///
    /// Empty collections are omitted from serialized records, so all three
    /// mean "nothing here".
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Array(items) => items.is_empty(),
            Self::Object(map) => map.is_empty(),
            Self::Scalar(_) => false,
        }
    }

    /// Returns the object map, if this is an object.
    #[must_use]
    pub const fn as_object(&self) -> Option<&BTreeMap<String, Self>> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Looks up a key on an object node.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Self> {
        self.as_object().and_then(|map| map.get(key))
    }

    /// Short name of the node's shape, used in logs and output.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Scalar(Scalar::Bool(_)) => "bool",
            Self::Scalar(Scalar::Number(_)) => "number",
            Self::Scalar(Scalar::String(_)) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
        }
    }

    /// Converts the tree back into a JSON value.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Scalar(Scalar::Bool(b)) => Value::Bool(*b),
            Self::Scalar(Scalar::Number(n)) => Value::Number(n.clone()),
            Self::Scalar(Scalar::String(s)) => Value::String(s.clone()),
            Self::Array(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<Map<String, Value>>(),
            ),
        }
    }
}

impl Scalar {
    /// Compares two scalars of the same kind.
    ///
    /// Numbers compare by value, so `1` and `1.0` are equal. Returns `None`
    /// when the kinds differ.
    #[must_use]
    pub fn same_kind_eq(&self, other: &Self) -> Option<bool> {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => Some(a == b),
            (Self::String(a), Self::String(b)) => Some(a == b),
            (Self::Number(a), Self::Number(b)) => Some(numbers_equal(a, b)),
            _ => None,
        }
    }
}

#[allow(clippy::float_cmp)]
fn numbers_equal(a: &Number, b: &Number) -> bool {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x == y;
    }
    if let (Some(x), Some(y)) = (a.as_u64(), b.as_u64()) {
        return x == y;
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

impl PartialEq for ConfigTree {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Scalar(a), Self::Scalar(b)) => a.same_kind_eq(b).unwrap_or(false),
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl From<Value> for ConfigTree {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Scalar(Scalar::Bool(b)),
            Value::Number(n) => Self::Scalar(Scalar::Number(n)),
            Value::String(s) => Self::Scalar(Scalar::String(s)),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Value::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl From<&ConfigTree> for Value {
    fn from(tree: &ConfigTree) -> Self {
        tree.to_json()
    }
}

impl Serialize for ConfigTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ConfigTree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from)
    }
}

impl fmt::Display for ConfigTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(Scalar::String(s)) => write!(f, "{s:?}"),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

//! Core traits and types for the entity cache.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Trait for Rust types that live in an entity collection.
///
/// The cache itself stores entities as JSON objects; implementors only name the
/// collection they belong to. Primary keys come from the registered metadata.
pub trait Entity: Clone + Send + Sync + Serialize + DeserializeOwned {
  /// Entity type name (e.g., "Hero", "Villain")
  fn entity_name() -> &'static str;
}

/// Primary key of a cached entity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityKey {
  Int(i64),
  Str(String),
}

impl EntityKey {
  /// Read a key out of a JSON scalar. Anything but an integer or string has no key.
  pub fn from_value(value: &Value) -> Option<Self> {
    match value {
      Value::Number(n) => n.as_i64().map(EntityKey::Int),
      Value::String(s) => Some(EntityKey::Str(s.clone())),
      _ => None,
    }
  }

  /// Parse user input, preferring an integer key when the text is numeric.
  pub fn parse(s: &str) -> Self {
    s.trim()
      .parse::<i64>()
      .map(EntityKey::Int)
      .unwrap_or_else(|_| EntityKey::Str(s.to_string()))
  }

  pub fn to_value(&self) -> Value {
    match self {
      EntityKey::Int(i) => Value::from(*i),
      EntityKey::Str(s) => Value::from(s.as_str()),
    }
  }
}

impl fmt::Display for EntityKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      EntityKey::Int(i) => write!(f, "{}", i),
      EntityKey::Str(s) => write!(f, "{}", s),
    }
  }
}

impl From<i64> for EntityKey {
  fn from(i: i64) -> Self {
    EntityKey::Int(i)
  }
}

impl From<&str> for EntityKey {
  fn from(s: &str) -> Self {
    EntityKey::Str(s.to_string())
  }
}

impl From<String> for EntityKey {
  fn from(s: String) -> Self {
    EntityKey::Str(s)
  }
}

/// Convert between a typed entity and its cached JSON form.
pub fn reserialize<T: DeserializeOwned>(value: impl Serialize) -> serde_json::Result<T> {
  serde_json::from_value(serde_json::to_value(value)?)
}

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Maps singular entity names to their plural resource names.
#[derive(Debug, Default)]
pub struct Pluralizer {
  plural_names: RwLock<HashMap<String, String>>,
}

impl Pluralizer {
  pub fn new() -> Self {
    Self::default()
  }

  /// Create a pluralizer seeded with one set of overrides.
  pub fn with_plural_names<I, K, V>(names: I) -> Self
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
  {
    let pluralizer = Self::new();
    pluralizer.register_plural_names(names);
    pluralizer
  }

  /// Merge plural overrides into the existing ones. A name registered again takes the new plural.
  pub fn register_plural_names<I, K, V>(&self, names: I)
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
  {
    let mut plural_names = self
      .plural_names
      .write()
      .unwrap_or_else(PoisonError::into_inner);
    for (singular, plural) in names {
      plural_names.insert(singular.into(), plural.into());
    }
  }

  /// Plural of `name`: the registered override (exact, case-sensitive match), else `name` + "s".
  pub fn pluralize(&self, name: &str) -> String {
    let plural_names = self
      .plural_names
      .read()
      .unwrap_or_else(PoisonError::into_inner);
    match plural_names.get(name) {
      Some(plural) => plural.clone(),
      None => format!("{}s", name),
    }
  }
}

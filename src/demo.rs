//! Built-in entity types and data for running without a backend.

use entity_cache::data::InMemoryBackend;
use entity_cache::metadata::{props_filter, sort_by_field, EntityMetadata, EntityMetadataMap};
use entity_cache::Entity;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hero {
  pub id: i64,
  pub name: String,
  #[serde(default)]
  pub saying: String,
}

impl Entity for Hero {
  fn entity_name() -> &'static str {
    "Hero"
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Villain {
  pub id: i64,
  pub name: String,
}

impl Entity for Villain {
  fn entity_name() -> &'static str {
    "Villain"
  }
}

pub fn plural_names() -> [(&'static str, &'static str); 1] {
  [(Hero::entity_name(), "Heroes")]
}

/// Heroes filter on name and saying; villains are kept sorted by name.
pub fn metadata() -> EntityMetadataMap {
  let mut map = EntityMetadataMap::new();
  map.insert(
    Hero::entity_name().to_string(),
    EntityMetadata::new(Hero::entity_name()).with_filter(props_filter(["name", "saying"])),
  );
  map.insert(
    Villain::entity_name().to_string(),
    EntityMetadata::new(Villain::entity_name())
      .with_filter(props_filter(["name"]))
      .with_sort(sort_by_field("name")),
  );
  map
}

fn hero(id: i64, name: &str, saying: &str) -> Hero {
  Hero {
    id,
    name: name.to_string(),
    saying: saying.to_string(),
  }
}

fn villain(id: i64, name: &str) -> Villain {
  Villain {
    id,
    name: name.to_string(),
  }
}

fn to_values<T: Serialize>(entities: &[T]) -> Vec<Value> {
  entities
    .iter()
    .filter_map(|entity| serde_json::to_value(entity).ok())
    .collect()
}

/// Backend preloaded with a few heroes and villains.
pub fn seeded_backend() -> InMemoryBackend {
  let backend = InMemoryBackend::new();
  backend.seed(
    Hero::entity_name(),
    to_values(&[
      hero(1, "Windstorm", "Blows you away"),
      hero(2, "Bombasto", "Boom"),
      hero(3, "Magneta", "Attractive"),
      hero(4, "Tornado", "Spins"),
    ]),
  );
  backend.seed(
    Villain::entity_name(),
    to_values(&[villain(1, "Dr. Evil"), villain(2, "Agent Smith"), villain(3, "Magneto")]),
  );
  backend
}

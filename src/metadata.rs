//! Entity metadata and the registry that holds it.
//!
//! Each entity type is described once: how to read its primary key, how to filter
//! and sort it, whether saves are optimistic, and which extra fields its collection
//! carries. Registration is additive; the last registration of a name wins.

use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

use crate::cache::{EntityCollection, EntityKey};
use crate::error::{Error, Result};

pub type SelectIdFn = Arc<dyn Fn(&Value) -> Option<EntityKey> + Send + Sync>;
pub type FilterFn = Arc<dyn Fn(&[Value], &str) -> Vec<Value> + Send + Sync>;
pub type SortComparer = Arc<dyn Fn(&Value, &Value) -> Ordering + Send + Sync>;

/// Entity metadata keyed by entity name.
pub type EntityMetadataMap = BTreeMap<String, EntityMetadata>;

/// Whether each kind of save is applied to the cache before the server confirms it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherOptions {
  pub optimistic_add: bool,
  pub optimistic_update: bool,
  pub optimistic_delete: bool,
}

impl Default for DispatcherOptions {
  fn default() -> Self {
    Self {
      optimistic_add: false,
      optimistic_update: false,
      optimistic_delete: true,
    }
  }
}

#[derive(Clone)]
pub struct EntityMetadata {
  /// Empty means "not set"; the map form of registration fills it from the key
  pub entity_name: String,
  pub select_id: SelectIdFn,
  pub filter_fn: Option<FilterFn>,
  pub sort_comparer: Option<SortComparer>,
  pub dispatcher_options: DispatcherOptions,
  pub additional_state: Map<String, Value>,
}

impl EntityMetadata {
  pub fn new(entity_name: impl Into<String>) -> Self {
    Self {
      entity_name: entity_name.into(),
      select_id: id_field_selector("id"),
      filter_fn: None,
      sort_comparer: None,
      dispatcher_options: DispatcherOptions::default(),
      additional_state: Map::new(),
    }
  }

  pub fn with_select_id<F>(mut self, select_id: F) -> Self
  where
    F: Fn(&Value) -> Option<EntityKey> + Send + Sync + 'static,
  {
    self.select_id = Arc::new(select_id);
    self
  }

  pub fn with_filter<F>(mut self, filter_fn: F) -> Self
  where
    F: Fn(&[Value], &str) -> Vec<Value> + Send + Sync + 'static,
  {
    self.filter_fn = Some(Arc::new(filter_fn));
    self
  }

  pub fn with_sort<F>(mut self, comparer: F) -> Self
  where
    F: Fn(&Value, &Value) -> Ordering + Send + Sync + 'static,
  {
    self.sort_comparer = Some(Arc::new(comparer));
    self
  }

  pub fn with_dispatcher_options(mut self, options: DispatcherOptions) -> Self {
    self.dispatcher_options = options;
    self
  }

  pub fn with_additional_state(mut self, field: impl Into<String>, initial: Value) -> Self {
    self.additional_state.insert(field.into(), initial);
    self
  }

  pub fn select_id(&self, entity: &Value) -> Option<EntityKey> {
    (self.select_id)(entity)
  }

  /// An empty collection for this entity type, with its extra fields at their initial values.
  pub fn initial_collection(&self) -> EntityCollection {
    let mut collection = EntityCollection::new(&self.entity_name);
    collection.extra = self.additional_state.clone();
    collection
  }
}

impl fmt::Debug for EntityMetadata {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("EntityMetadata")
      .field("entity_name", &self.entity_name)
      .field("filter_fn", &self.filter_fn.is_some())
      .field("sort_comparer", &self.sort_comparer.is_some())
      .field("dispatcher_options", &self.dispatcher_options)
      .field("additional_state", &self.additional_state)
      .finish_non_exhaustive()
  }
}

/// Primary key read from a single top-level field.
pub fn id_field_selector(field: &str) -> SelectIdFn {
  let field = field.to_string();
  Arc::new(move |entity: &Value| entity.get(&field).and_then(EntityKey::from_value))
}

/// Filter keeping entities where any of `props` contains the pattern, ignoring case.
///
/// A blank pattern keeps every entity.
pub fn props_filter<I, S>(props: I) -> impl Fn(&[Value], &str) -> Vec<Value> + Send + Sync + 'static
where
  I: IntoIterator<Item = S>,
  S: Into<String>,
{
  let props: Vec<String> = props.into_iter().map(Into::into).collect();
  move |entities: &[Value], pattern: &str| {
    let pattern = pattern.trim().to_lowercase();
    if pattern.is_empty() {
      return entities.to_vec();
    }
    entities
      .iter()
      .filter(|entity| {
        props.iter().any(|prop| match entity.get(prop) {
          Some(Value::String(s)) => s.to_lowercase().contains(&pattern),
          Some(Value::Number(n)) => n.to_string().contains(&pattern),
          _ => false,
        })
      })
      .cloned()
      .collect()
  }
}

/// Comparer ordering entities by one field. Missing or null values sort first.
pub fn sort_by_field(field: &str) -> impl Fn(&Value, &Value) -> Ordering + Send + Sync + 'static {
  let field = field.to_string();
  move |a: &Value, b: &Value| compare_json(a.get(&field), b.get(&field))
}

fn compare_json(a: Option<&Value>, b: Option<&Value>) -> Ordering {
  match (a, b) {
    (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
    (None | Some(Value::Null), _) => Ordering::Less,
    (_, None | Some(Value::Null)) => Ordering::Greater,
    (Some(Value::Number(x)), Some(Value::Number(y))) => x
      .as_f64()
      .partial_cmp(&y.as_f64())
      .unwrap_or(Ordering::Equal),
    (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
    (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
    (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
  }
}

/// Registry of entity metadata, keyed by entity name.
#[derive(Default)]
pub struct EntityMetadataRegistry {
  definitions: RwLock<HashMap<String, Arc<EntityMetadata>>>,
}

impl EntityMetadataRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register one entity type. Replaces any earlier registration of the same name.
  pub fn register(&self, metadata: EntityMetadata) -> Result<()> {
    if metadata.entity_name.trim().is_empty() {
      return Err(Error::Validation(
        "entity metadata must have an entity name".to_string(),
      ));
    }
    debug!(entity = %metadata.entity_name, "registering entity metadata");
    self
      .definitions
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(metadata.entity_name.clone(), Arc::new(metadata));
    Ok(())
  }

  /// Merge a map of metadata into the registry.
  ///
  /// Entries without an entity name take their map key. Nothing is registered if
  /// any entry has neither.
  pub fn register_map(&self, map: EntityMetadataMap) -> Result<()> {
    let mut resolved = Vec::with_capacity(map.len());
    for (key, mut metadata) in map {
      if metadata.entity_name.trim().is_empty() {
        if key.trim().is_empty() {
          return Err(Error::Validation(
            "entity metadata map entry has no entity name".to_string(),
          ));
        }
        metadata.entity_name = key;
      }
      resolved.push(metadata);
    }

    let mut definitions = self
      .definitions
      .write()
      .unwrap_or_else(PoisonError::into_inner);
    for metadata in resolved {
      debug!(entity = %metadata.entity_name, "registering entity metadata");
      definitions.insert(metadata.entity_name.clone(), Arc::new(metadata));
    }
    Ok(())
  }

  /// Metadata for `entity_name`, or the defaults when it was never registered.
  pub fn get(&self, entity_name: &str) -> Arc<EntityMetadata> {
    self
      .definitions
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .get(entity_name)
      .cloned()
      .unwrap_or_else(|| Arc::new(EntityMetadata::new(entity_name)))
  }

  pub fn is_registered(&self, entity_name: &str) -> bool {
    self
      .definitions
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .contains_key(entity_name)
  }

  pub fn entity_names(&self) -> Vec<String> {
    let mut names: Vec<String> = self
      .definitions
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .keys()
      .cloned()
      .collect();
    names.sort();
    names
  }
}

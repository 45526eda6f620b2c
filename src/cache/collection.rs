//! Normalized in-memory state of one entity type.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

use super::action::CorrelationId;
use super::traits::EntityKey;
use crate::metadata::SortComparer;

/// Cached entities of one type plus their filter and load flags.
///
/// `ids` and the keys of `entities` always match one-to-one. With a sort
/// comparer `ids` is kept sorted; otherwise it is in insertion order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntityCollection {
  pub(crate) entity_name: String,
  pub(crate) ids: Vec<EntityKey>,
  pub(crate) entities: HashMap<EntityKey, Value>,
  pub(crate) filter: String,
  pub(crate) loading: bool,
  pub(crate) loaded: bool,
  /// Extra fields declared as additional state in the metadata
  pub(crate) extra: Map<String, Value>,
  /// Optimistic saves awaiting confirmation, by the id of the request that made them
  pub(crate) pending: BTreeMap<CorrelationId, PendingChange>,
}

/// What an optimistic save did to the collection, so that exactly that change can be undone.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingChange {
  Added {
    key: EntityKey,
    entity: Value,
  },
  Updated {
    key: EntityKey,
    before: Value,
    after: Value,
  },
  Deleted {
    key: EntityKey,
    /// `None` once the entity turned out never to have existed on the server
    entity: Option<Value>,
    index: usize,
  },
}

impl EntityCollection {
  pub fn new(entity_name: impl Into<String>) -> Self {
    Self {
      entity_name: entity_name.into(),
      ..Default::default()
    }
  }

  pub fn entity_name(&self) -> &str {
    &self.entity_name
  }

  pub fn len(&self) -> usize {
    self.ids.len()
  }

  pub fn is_empty(&self) -> bool {
    self.ids.is_empty()
  }

  pub fn contains(&self, key: &EntityKey) -> bool {
    self.entities.contains_key(key)
  }

  pub fn get(&self, key: &EntityKey) -> Option<&Value> {
    self.entities.get(key)
  }

  pub fn pending(&self) -> impl Iterator<Item = (&CorrelationId, &PendingChange)> {
    self.pending.iter()
  }

  /// Insert a new entity. Existing keys are left alone.
  pub(crate) fn add(&mut self, key: EntityKey, entity: Value, sort: Option<&SortComparer>) -> bool {
    if self.entities.contains_key(&key) {
      return false;
    }
    self.ids.push(key.clone());
    self.entities.insert(key, entity);
    self.resort(sort);
    true
  }

  /// Replace an existing entity in place. Missing keys are left alone.
  pub(crate) fn replace(
    &mut self,
    key: &EntityKey,
    entity: Value,
    sort: Option<&SortComparer>,
  ) -> bool {
    match self.entities.get_mut(key) {
      Some(existing) => {
        *existing = entity;
        self.resort(sort);
        true
      }
      None => false,
    }
  }

  pub(crate) fn upsert(&mut self, key: EntityKey, entity: Value, sort: Option<&SortComparer>) {
    if !self.replace(&key, entity.clone(), sort) {
      self.add(key, entity, sort);
    }
  }

  /// Insert at a position (clamped to the end), then re-sort if a comparer is set.
  pub(crate) fn insert_at(
    &mut self,
    index: usize,
    key: EntityKey,
    entity: Value,
    sort: Option<&SortComparer>,
  ) {
    if self.entities.contains_key(&key) {
      return;
    }
    let index = index.min(self.ids.len());
    self.ids.insert(index, key.clone());
    self.entities.insert(key, entity);
    self.resort(sort);
  }

  /// Remove an entity, returning its former position and value.
  pub(crate) fn remove(&mut self, key: &EntityKey) -> Option<(usize, Value)> {
    let entity = self.entities.remove(key)?;
    let index = self.ids.iter().position(|id| id == key).unwrap_or(self.ids.len());
    if index < self.ids.len() {
      self.ids.remove(index);
    }
    Some((index, entity))
  }

  pub(crate) fn clear(&mut self) {
    self.ids.clear();
    self.entities.clear();
  }

  pub(crate) fn resort(&mut self, sort: Option<&SortComparer>) {
    let Some(compare) = sort else {
      return;
    };
    let entities = &self.entities;
    self.ids.sort_by(|a, b| match (entities.get(a), entities.get(b)) {
      (Some(a), Some(b)) => compare(a, b),
      _ => std::cmp::Ordering::Equal,
    });
  }
}

//! Derived views of an entity collection.
//!
//! The free functions read a collection directly. [`EntitySelectors`] adds
//! memoization: results are reused for as long as the same collection (by `Arc`
//! identity) and filter pattern are passed in.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::collection::EntityCollection;
use super::traits::EntityKey;
use crate::metadata::EntityMetadata;

/// Entities in `ids` order.
pub fn select_all(collection: &EntityCollection) -> Vec<Value> {
  collection
    .ids
    .iter()
    .filter_map(|key| collection.entities.get(key).cloned())
    .collect()
}

pub fn select_entities(collection: &EntityCollection) -> &HashMap<EntityKey, Value> {
  &collection.entities
}

pub fn select_keys(collection: &EntityCollection) -> &[EntityKey] {
  &collection.ids
}

pub fn select_count(collection: &EntityCollection) -> usize {
  collection.ids.len()
}

pub fn select_by_key<'a>(collection: &'a EntityCollection, key: &EntityKey) -> Option<&'a Value> {
  collection.entities.get(key)
}

pub fn select_filter(collection: &EntityCollection) -> &str {
  &collection.filter
}

pub fn select_loading(collection: &EntityCollection) -> bool {
  collection.loading
}

pub fn select_loaded(collection: &EntityCollection) -> bool {
  collection.loaded
}

/// Value of a field declared as additional state.
pub fn select_extra<'a>(collection: &'a EntityCollection, field: &str) -> Option<&'a Value> {
  collection.extra.get(field)
}

/// Entities passing the metadata's filter function for the current pattern.
/// Without a filter function this is [`select_all`].
pub fn select_filtered(collection: &EntityCollection, metadata: &EntityMetadata) -> Vec<Value> {
  let all = select_all(collection);
  match &metadata.filter_fn {
    Some(filter_fn) => filter_fn(all.as_slice(), &collection.filter),
    None => all,
  }
}

#[derive(Default)]
struct Memo {
  all: Option<(Arc<EntityCollection>, Arc<Vec<Value>>)>,
  filtered: Option<(Arc<Vec<Value>>, String, Arc<Vec<Value>>)>,
}

/// Memoized selectors for one entity type.
pub struct EntitySelectors {
  metadata: Arc<EntityMetadata>,
  memo: Mutex<Memo>,
}

impl EntitySelectors {
  pub fn new(metadata: Arc<EntityMetadata>) -> Self {
    Self {
      metadata,
      memo: Mutex::new(Memo::default()),
    }
  }

  pub fn entity_name(&self) -> &str {
    &self.metadata.entity_name
  }

  /// All entities in order, recomputed only when a different collection is passed.
  pub fn select_all(&self, collection: &Arc<EntityCollection>) -> Arc<Vec<Value>> {
    let mut memo = self.memo.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some((cached_for, all)) = &memo.all {
      if Arc::ptr_eq(cached_for, collection) {
        return Arc::clone(all);
      }
    }
    // Keep the previous list when only flags changed, so downstream memos hold
    let all = select_all(collection);
    let all = match &memo.all {
      Some((_, cached)) if **cached == all => Arc::clone(cached),
      _ => Arc::new(all),
    };
    memo.all = Some((Arc::clone(collection), Arc::clone(&all)));
    all
  }

  /// Filtered entities, recomputed only when the entity list or filter pattern changes.
  pub fn filtered_entities(&self, collection: &Arc<EntityCollection>) -> Arc<Vec<Value>> {
    let all = self.select_all(collection);
    let Some(filter_fn) = &self.metadata.filter_fn else {
      return all;
    };

    let mut memo = self.memo.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some((cached_all, cached_filter, filtered)) = &memo.filtered {
      if Arc::ptr_eq(cached_all, &all) && *cached_filter == collection.filter {
        return Arc::clone(filtered);
      }
    }
    let filtered = Arc::new(filter_fn(all.as_slice(), &collection.filter));
    memo.filtered = Some((all, collection.filter.clone(), Arc::clone(&filtered)));
    filtered
  }

  pub fn loading(&self, collection: &EntityCollection) -> bool {
    select_loading(collection)
  }

  pub fn loaded(&self, collection: &EntityCollection) -> bool {
    select_loaded(collection)
  }

  pub fn filter<'a>(&self, collection: &'a EntityCollection) -> &'a str {
    select_filter(collection)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::action::{EntityAction, EntityOp};
  use crate::cache::reducer::reduce;
  use crate::metadata::props_filter;
  use serde_json::json;
  use std::sync::atomic::{AtomicUsize, Ordering};

  fn villains() -> Vec<Value> {
    vec![
      json!({"id": 1, "name": "Zorro"}),
      json!({"id": 2, "name": "Magneto"}),
    ]
  }

  fn collection_with(metadata: &EntityMetadata, filter: &str) -> Arc<EntityCollection> {
    let loaded = reduce(
      &metadata.initial_collection(),
      metadata,
      &EntityAction::new("Villain", EntityOp::AddAll(villains())),
    )
    .collection;
    let filtered = reduce(
      &loaded,
      metadata,
      &EntityAction::new("Villain", EntityOp::SetFilter(filter.to_string())),
    )
    .collection;
    Arc::new(filtered)
  }

  #[test]
  fn test_absent_collection_yields_defaults() {
    let collection = EntityCollection::new("Villain");
    assert!(select_all(&collection).is_empty());
    assert!(!select_loading(&collection));
    assert!(!select_loaded(&collection));
    assert_eq!(select_filter(&collection), "");
    assert_eq!(select_count(&collection), 0);
  }

  #[test]
  fn test_filtered_entities_by_name() {
    let metadata = Arc::new(EntityMetadata::new("Villain").with_filter(props_filter(["name"])));
    let selectors = EntitySelectors::new(Arc::clone(&metadata));

    let filtered = selectors.filtered_entities(&collection_with(&metadata, "zor"));
    assert_eq!(*filtered, vec![json!({"id": 1, "name": "Zorro"})]);

    let unfiltered = selectors.filtered_entities(&collection_with(&metadata, ""));
    assert_eq!(unfiltered.len(), 2);
  }

  #[test]
  fn test_without_filter_fn_returns_all() {
    let metadata = Arc::new(EntityMetadata::new("Villain"));
    let selectors = EntitySelectors::new(Arc::clone(&metadata));
    let collection = collection_with(&metadata, "zor");
    assert_eq!(selectors.filtered_entities(&collection).len(), 2);
  }

  #[test]
  fn test_filtered_entities_are_memoized() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let filter = props_filter(["name"]);
    let metadata = Arc::new(EntityMetadata::new("Villain").with_filter(
      move |entities: &[Value], pattern: &str| {
        counter.fetch_add(1, Ordering::SeqCst);
        filter(entities, pattern)
      },
    ));
    let selectors = EntitySelectors::new(Arc::clone(&metadata));
    let collection = collection_with(&metadata, "mag");

    let first = selectors.filtered_entities(&collection);
    let second = selectors.filtered_entities(&collection);
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let flagged = Arc::new(
      reduce(
        &collection,
        &metadata,
        &EntityAction::new("Villain", EntityOp::SetLoading(true)),
      )
      .collection,
    );
    let fourth = selectors.filtered_entities(&flagged);
    assert!(Arc::ptr_eq(&first, &fourth));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let refiltered = Arc::new(
      reduce(
        &collection,
        &metadata,
        &EntityAction::new("Villain", EntityOp::SetFilter("zor".to_string())),
      )
      .collection,
    );
    let third = selectors.filtered_entities(&refiltered);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(*third, vec![json!({"id": 1, "name": "Zorro"})]);
  }

  #[test]
  fn test_select_all_follows_ids_order() {
    let metadata = EntityMetadata::new("Villain");
    let collection = collection_with(&metadata, "");
    let keys: Vec<EntityKey> = select_keys(&collection).to_vec();
    assert_eq!(keys, vec![EntityKey::Int(1), EntityKey::Int(2)]);
    assert_eq!(select_all(&collection), villains());
    assert_eq!(
      select_by_key(&collection, &EntityKey::Int(2)),
      Some(&json!({"id": 2, "name": "Magneto"}))
    );
  }
}

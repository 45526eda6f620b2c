//! Pure state transitions for entity collections.

use serde_json::Value;
use tracing::{debug, warn};

use super::action::{CorrelationId, EntityAction, EntityOp, Update};
use super::collection::{EntityCollection, PendingChange};
use super::traits::EntityKey;
use crate::error::Error;
use crate::metadata::EntityMetadata;

/// Result of applying one action.
#[derive(Debug, Clone, PartialEq)]
pub struct Reduction {
  pub collection: EntityCollection,
  /// Set when an error action could not undo its optimistic change
  pub conflict: Option<Error>,
}

/// Apply `action` to `collection`, producing the next collection state.
pub fn reduce(
  collection: &EntityCollection,
  metadata: &EntityMetadata,
  action: &EntityAction,
) -> Reduction {
  let mut reducer = CollectionReducer {
    next: collection.clone(),
    metadata,
    action,
    conflict: None,
  };
  reducer.apply();
  Reduction {
    collection: reducer.next,
    conflict: reducer.conflict,
  }
}

struct CollectionReducer<'a> {
  next: EntityCollection,
  metadata: &'a EntityMetadata,
  action: &'a EntityAction,
  conflict: Option<Error>,
}

impl CollectionReducer<'_> {
  fn apply(&mut self) {
    let action = self.action;
    let metadata = self.metadata;
    let sort = metadata.sort_comparer.as_ref();
    let optimistic = action.is_optimistic;
    let cid = action.correlation_id.clone();

    match &action.op {
      EntityOp::QueryAll | EntityOp::QueryMany(_) | EntityOp::QueryByKey(_) => {
        self.next.loading = true;
      }
      EntityOp::QueryAllSuccess(entities) => {
        self.next.clear();
        self.add_all(entities);
        self.next.loading = false;
        self.next.loaded = true;
      }
      EntityOp::QueryManySuccess(entities) => {
        for entity in entities {
          self.upsert(entity);
        }
        self.next.loading = false;
        self.next.loaded = true;
      }
      EntityOp::QueryByKeySuccess(entity) => {
        self.upsert(entity);
        self.next.loading = false;
        self.next.loaded = true;
      }
      EntityOp::QueryAllError(_) | EntityOp::QueryManyError(_) | EntityOp::QueryByKeyError(_) => {
        self.next.loading = false;
      }

      EntityOp::SaveAddOne(entity) => {
        self.next.loading = true;
        if optimistic {
          if let Some(key) = self.key_of(entity) {
            if self.next.add(key.clone(), entity.clone(), sort) {
              self.next.pending.insert(
                cid,
                PendingChange::Added {
                  key,
                  entity: entity.clone(),
                },
              );
            }
          }
        }
      }
      EntityOp::SaveAddOneSuccess(entity) => {
        self.next.loading = false;
        if optimistic {
          self.next.pending.remove(&cid);
          // The optimistic entity may have been removed meanwhile; don't bring it back.
          if let Some(key) = self.key_of(entity) {
            self.next.replace(&key, entity.clone(), sort);
          }
        } else {
          self.upsert(entity);
        }
      }

      EntityOp::SaveUpdateOne(update) => {
        self.next.loading = true;
        if optimistic {
          if let Some(before) = self.next.get(&update.id).cloned() {
            let after = merge_changes(&before, &update.changes);
            self.next.replace(&update.id, after.clone(), sort);
            self.next.pending.insert(
              cid,
              PendingChange::Updated {
                key: update.id.clone(),
                before,
                after,
              },
            );
          }
        }
      }
      EntityOp::SaveUpdateOneSuccess(update) => {
        self.next.loading = false;
        if optimistic {
          self.next.pending.remove(&cid);
        }
        self.update_existing(update);
      }

      EntityOp::SaveDeleteOne(key) => {
        self.next.loading = true;
        if optimistic {
          if let Some((index, entity)) = self.next.remove(key) {
            self.next.pending.insert(
              cid,
              PendingChange::Deleted {
                key: key.clone(),
                entity: Some(entity),
                index,
              },
            );
          }
        }
      }
      EntityOp::SaveDeleteOneSuccess(key) => {
        self.next.loading = false;
        if optimistic {
          self.next.pending.remove(&cid);
        } else {
          self.next.remove(key);
        }
      }

      EntityOp::SaveAddOneError(_)
      | EntityOp::SaveUpdateOneError(_)
      | EntityOp::SaveDeleteOneError(_) => {
        self.next.loading = false;
        self.rollback(&cid);
      }

      EntityOp::AddAll(entities) => {
        self.next.clear();
        self.add_all(entities);
        self.next.loading = false;
        self.next.loaded = true;
      }
      EntityOp::AddOne(entity) => self.add_all(std::slice::from_ref(entity)),
      EntityOp::AddMany(entities) => self.add_all(entities),
      EntityOp::UpsertOne(entity) => self.upsert(entity),
      EntityOp::UpsertMany(entities) => {
        for entity in entities {
          self.upsert(entity);
        }
      }
      EntityOp::UpdateOne(update) => self.update_existing(update),
      EntityOp::RemoveOne(key) => {
        self.next.remove(key);
      }
      EntityOp::RemoveMany(keys) => {
        for key in keys {
          self.next.remove(key);
        }
      }
      EntityOp::RemoveAll => {
        self.next.clear();
        self.next.pending.clear();
        self.next.loading = false;
        self.next.loaded = false;
      }
      EntityOp::SetFilter(pattern) => {
        self.next.filter = pattern.clone();
      }
      EntityOp::SetLoaded(loaded) => self.next.loaded = *loaded,
      EntityOp::SetLoading(loading) => self.next.loading = *loading,
    }
  }

  fn key_of(&self, entity: &Value) -> Option<EntityKey> {
    let key = self.metadata.select_id(entity);
    if key.is_none() {
      warn!(
        entity = %self.metadata.entity_name,
        action = %self.action,
        "ignoring entity without a primary key"
      );
    }
    key
  }

  fn add_all(&mut self, entities: &[Value]) {
    for entity in entities {
      if let Some(key) = self.key_of(entity) {
        self.next.add(key, entity.clone(), None);
      }
    }
    self.next.resort(self.metadata.sort_comparer.as_ref());
  }

  fn upsert(&mut self, entity: &Value) {
    if let Some(key) = self.key_of(entity) {
      let sort = self.metadata.sort_comparer.as_ref();
      self.next.upsert(key, entity.clone(), sort);
    }
  }

  /// Merge changes into an entity that is still cached. Missing entities stay missing.
  fn update_existing(&mut self, update: &Update) {
    let Some(current) = self.next.get(&update.id) else {
      debug!(
        entity = %self.metadata.entity_name,
        key = %update.id,
        "update for an entity no longer in the cache"
      );
      return;
    };
    let merged = merge_changes(current, &update.changes);
    let sort = self.metadata.sort_comparer.as_ref();
    self.next.replace(&update.id, merged, sort);
  }

  /// Undo the optimistic change recorded under `cid`, if it still applies.
  fn rollback(&mut self, cid: &CorrelationId) {
    let Some(change) = self.next.pending.remove(cid) else {
      return;
    };
    let sort = self.metadata.sort_comparer.clone();

    let skipped = match change {
      PendingChange::Added { key, entity } => match self.next.get(&key) {
        Some(current) if *current == entity => {
          self.next.remove(&key);
          None
        }
        Some(_) => Some(format!("entity {} changed after it was added", key)),
        None => match self.pending_delete_of(&key) {
          // The entity never existed on the server, so the delete has nothing to restore
          Some(restore) => {
            *restore = None;
            None
          }
          None => Some(format!("entity {} was already removed", key)),
        },
      },
      PendingChange::Updated { key, before, after } => match self.next.get(&key) {
        Some(current) if *current == after => {
          self.next.replace(&key, before, sort.as_ref());
          None
        }
        Some(_) => match self.pending_update_from(&key, &after) {
          Some(later_before) => {
            *later_before = before;
            None
          }
          None => Some(format!("entity {} changed after the update", key)),
        },
        None => match self.pending_delete_of(&key) {
          Some(restore) => {
            *restore = Some(before);
            None
          }
          None => Some(format!("entity {} was removed after the update", key)),
        },
      },
      PendingChange::Deleted { key, entity, index } => {
        if self.next.contains(&key) {
          Some(format!("entity {} was re-added after the delete", key))
        } else {
          if let Some(entity) = entity {
            self.next.insert_at(index, key, entity, sort.as_ref());
          }
          None
        }
      }
    };

    if let Some(reason) = skipped {
      warn!(
        entity = %self.metadata.entity_name,
        correlation_id = %cid,
        %reason,
        "skipping rollback"
      );
      self.conflict = Some(Error::RollbackConflict {
        entity_name: self.metadata.entity_name.clone(),
        correlation_id: cid.to_string(),
        reason,
      });
    }
  }

  /// What a still pending optimistic delete of `key` would restore.
  fn pending_delete_of(&mut self, key: &EntityKey) -> Option<&mut Option<Value>> {
    self.next.pending.values_mut().find_map(|change| match change {
      PendingChange::Deleted {
        key: deleted,
        entity,
        ..
      } if deleted == key => Some(entity),
      _ => None,
    })
  }

  /// Snapshot of a still pending optimistic update of `key` that was taken from `state`.
  fn pending_update_from(&mut self, key: &EntityKey, state: &Value) -> Option<&mut Value> {
    self.next.pending.values_mut().find_map(|change| match change {
      PendingChange::Updated {
        key: updated,
        before,
        ..
      } if updated == key && *before == *state => Some(before),
      _ => None,
    })
  }
}

/// Shallow merge of `changes` into `entity`. Non-object changes replace the entity.
pub fn merge_changes(entity: &Value, changes: &Value) -> Value {
  match (entity, changes) {
    (Value::Object(base), Value::Object(patch)) => {
      let mut merged = base.clone();
      for (field, value) in patch {
        merged.insert(field.clone(), value.clone());
      }
      Value::Object(merged)
    }
    _ => changes.clone(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::DataServiceError;
  use crate::metadata::{props_filter, sort_by_field};
  use serde_json::json;

  fn heroes() -> EntityMetadata {
    EntityMetadata::new("Hero")
  }

  fn sorted_heroes() -> EntityMetadata {
    EntityMetadata::new("Hero").with_sort(sort_by_field("name"))
  }

  fn hero(id: i64, name: &str) -> Value {
    json!({"id": id, "name": name})
  }

  fn remote_error() -> Error {
    Error::RemoteRequest(DataServiceError::new("POST", "api/hero/", "boom").with_status(500))
  }

  fn apply(
    collection: &EntityCollection,
    metadata: &EntityMetadata,
    action: &EntityAction,
  ) -> EntityCollection {
    reduce(collection, metadata, action).collection
  }

  fn loaded_with(metadata: &EntityMetadata, entities: Vec<Value>) -> EntityCollection {
    let action = EntityAction::new("Hero", EntityOp::AddAll(entities));
    apply(&metadata.initial_collection(), metadata, &action)
  }

  fn ids(collection: &EntityCollection) -> Vec<i64> {
    collection
      .ids
      .iter()
      .map(|k| match k {
        EntityKey::Int(i) => *i,
        EntityKey::Str(_) => panic!("unexpected string key"),
      })
      .collect()
  }

  #[test]
  fn test_query_all_sets_loading_then_loaded() {
    let metadata = heroes();
    let start = EntityAction::new("Hero", EntityOp::QueryAll);
    let loading = apply(&metadata.initial_collection(), &metadata, &start);
    assert!(loading.loading);
    assert!(!loading.loaded);

    let done = start.follow_up(EntityOp::QueryAllSuccess(vec![hero(1, "A"), hero(2, "B")]));
    let loaded = apply(&loading, &metadata, &done);
    assert!(!loaded.loading);
    assert!(loaded.loaded);
    assert_eq!(ids(&loaded), vec![1, 2]);
  }

  #[test]
  fn test_query_all_replaces_and_is_idempotent() {
    let metadata = heroes();
    let collection = loaded_with(&metadata, vec![hero(9, "Old")]);
    let action = EntityAction::new(
      "Hero",
      EntityOp::QueryAllSuccess(vec![hero(1, "A"), hero(2, "B")]),
    );

    let once = apply(&collection, &metadata, &action);
    let twice = apply(&once, &metadata, &action);
    assert_eq!(ids(&once), vec![1, 2]);
    assert_eq!(once, twice);
  }

  #[test]
  fn test_query_many_merges() {
    let metadata = heroes();
    let collection = loaded_with(&metadata, vec![hero(1, "A"), hero(2, "B")]);
    let action = EntityAction::new(
      "Hero",
      EntityOp::QueryManySuccess(vec![hero(2, "B2"), hero(3, "C")]),
    );
    let next = apply(&collection, &metadata, &action);
    assert_eq!(ids(&next), vec![1, 2, 3]);
    assert_eq!(next.get(&EntityKey::Int(2)), Some(&hero(2, "B2")));
  }

  #[test]
  fn test_query_failure_keeps_entities() {
    let metadata = heroes();
    let mut collection = loaded_with(&metadata, vec![hero(1, "A")]);
    collection.loading = true;
    let action = EntityAction::new("Hero", EntityOp::QueryAllError(remote_error()));
    let next = apply(&collection, &metadata, &action);
    assert!(!next.loading);
    assert_eq!(ids(&next), vec![1]);
  }

  #[test]
  fn test_sorted_after_adds_and_updates() {
    let metadata = sorted_heroes();
    let mut collection = loaded_with(&metadata, vec![hero(1, "Mia"), hero(2, "Cat")]);
    assert_eq!(ids(&collection), vec![2, 1]);

    let add = EntityAction::new("Hero", EntityOp::SaveAddOne(hero(3, "Abe"))).optimistic(true);
    collection = apply(&collection, &metadata, &add);
    assert_eq!(ids(&collection), vec![3, 2, 1]);

    let update = EntityAction::new(
      "Hero",
      EntityOp::SaveUpdateOne(Update {
        id: EntityKey::Int(3),
        changes: json!({"name": "Zed"}),
      }),
    )
    .optimistic(true);
    collection = apply(&collection, &metadata, &update);
    assert_eq!(ids(&collection), vec![2, 1, 3]);

    let pessimistic = EntityAction::new("Hero", EntityOp::SaveAddOneSuccess(hero(4, "Bob")));
    collection = apply(&collection, &metadata, &pessimistic);
    assert_eq!(ids(&collection), vec![4, 2, 1, 3]);
  }

  #[test]
  fn test_unsorted_appends_and_update_keeps_position() {
    let metadata = heroes();
    let mut collection = loaded_with(&metadata, vec![hero(5, "E"), hero(1, "A")]);

    let add = EntityAction::new("Hero", EntityOp::SaveAddOneSuccess(hero(3, "C")));
    collection = apply(&collection, &metadata, &add);
    assert_eq!(ids(&collection), vec![5, 1, 3]);

    let update = EntityAction::new(
      "Hero",
      EntityOp::UpdateOne(Update {
        id: EntityKey::Int(5),
        changes: json!({"name": "Z"}),
      }),
    );
    collection = apply(&collection, &metadata, &update);
    assert_eq!(ids(&collection), vec![5, 1, 3]);
    assert_eq!(collection.get(&EntityKey::Int(5)), Some(&hero(5, "Z")));

    let remove = EntityAction::new("Hero", EntityOp::RemoveOne(EntityKey::Int(1)));
    collection = apply(&collection, &metadata, &remove);
    assert_eq!(ids(&collection), vec![5, 3]);
  }

  #[test]
  fn test_pessimistic_add_waits_for_success() {
    let metadata = heroes();
    let collection = loaded_with(&metadata, vec![hero(1, "A")]);
    let add = EntityAction::new("Hero", EntityOp::SaveAddOne(hero(2, "B")));

    let started = apply(&collection, &metadata, &add);
    assert!(started.loading);
    assert_eq!(ids(&started), vec![1]);

    let failed = apply(
      &started,
      &metadata,
      &add.follow_up(EntityOp::SaveAddOneError(remote_error())),
    );
    assert_eq!(failed, collection);

    let saved = apply(
      &started,
      &metadata,
      &add.follow_up(EntityOp::SaveAddOneSuccess(hero(2, "B"))),
    );
    assert_eq!(ids(&saved), vec![1, 2]);
    assert!(!saved.loading);
  }

  #[test]
  fn test_optimistic_add_failure_round_trips() {
    let metadata = heroes();
    let collection = loaded_with(&metadata, vec![hero(1, "A")]);
    let add = EntityAction::new("Hero", EntityOp::SaveAddOne(hero(2, "B"))).optimistic(true);

    let started = apply(&collection, &metadata, &add);
    assert_eq!(ids(&started), vec![1, 2]);
    assert_eq!(started.pending.len(), 1);

    let reduction = reduce(
      &started,
      &metadata,
      &add.follow_up(EntityOp::SaveAddOneError(remote_error())),
    );
    assert_eq!(reduction.collection, collection);
    assert!(reduction.conflict.is_none());
  }

  #[test]
  fn test_optimistic_add_success_applies_server_entity() {
    let metadata = heroes();
    let collection = loaded_with(&metadata, vec![]);
    let add = EntityAction::new("Hero", EntityOp::SaveAddOne(hero(2, "B"))).optimistic(true);
    let started = apply(&collection, &metadata, &add);

    let saved = json!({"id": 2, "name": "B", "power": "flight"});
    let done = apply(
      &started,
      &metadata,
      &add.follow_up(EntityOp::SaveAddOneSuccess(saved.clone())),
    );
    assert_eq!(done.get(&EntityKey::Int(2)), Some(&saved));
    assert!(done.pending.is_empty());
  }

  #[test]
  fn test_optimistic_update_failure_restores_snapshot() {
    let metadata = sorted_heroes();
    let collection = loaded_with(&metadata, vec![hero(1, "A"), hero(2, "B")]);
    let update = EntityAction::new(
      "Hero",
      EntityOp::SaveUpdateOne(Update {
        id: EntityKey::Int(1),
        changes: json!({"name": "Z"}),
      }),
    )
    .optimistic(true);

    let started = apply(&collection, &metadata, &update);
    assert_eq!(ids(&started), vec![2, 1]);

    let failed = apply(
      &started,
      &metadata,
      &update.follow_up(EntityOp::SaveUpdateOneError(remote_error())),
    );
    assert_eq!(failed, collection);
  }

  #[test]
  fn test_pessimistic_update_applies_server_changes() {
    let metadata = heroes();
    let collection = loaded_with(&metadata, vec![hero(1, "A")]);
    let changes = Update {
      id: EntityKey::Int(1),
      changes: json!({"name": "B"}),
    };
    let update = EntityAction::new("Hero", EntityOp::SaveUpdateOne(changes));

    let started = apply(&collection, &metadata, &update);
    assert_eq!(started.get(&EntityKey::Int(1)), Some(&hero(1, "A")));

    let server = Update {
      id: EntityKey::Int(1),
      changes: json!({"id": 1, "name": "B", "version": 2}),
    };
    let saved = apply(
      &started,
      &metadata,
      &update.follow_up(EntityOp::SaveUpdateOneSuccess(server)),
    );
    assert_eq!(
      saved.get(&EntityKey::Int(1)),
      Some(&json!({"id": 1, "name": "B", "version": 2}))
    );
  }

  #[test]
  fn test_optimistic_delete_failure_reinserts_at_index() {
    let metadata = heroes();
    let collection = loaded_with(&metadata, vec![hero(1, "A"), hero(2, "B"), hero(3, "C")]);
    let delete =
      EntityAction::new("Hero", EntityOp::SaveDeleteOne(EntityKey::Int(2))).optimistic(true);

    let started = apply(&collection, &metadata, &delete);
    assert_eq!(ids(&started), vec![1, 3]);

    let failed = apply(
      &started,
      &metadata,
      &delete.follow_up(EntityOp::SaveDeleteOneError(remote_error())),
    );
    assert_eq!(failed, collection);
  }

  #[test]
  fn test_pessimistic_delete_waits_for_success() {
    let metadata = heroes();
    let collection = loaded_with(&metadata, vec![hero(1, "A"), hero(2, "B")]);
    let delete = EntityAction::new("Hero", EntityOp::SaveDeleteOne(EntityKey::Int(1)));

    let started = apply(&collection, &metadata, &delete);
    assert_eq!(ids(&started), vec![1, 2]);

    let done = apply(
      &started,
      &metadata,
      &delete.follow_up(EntityOp::SaveDeleteOneSuccess(EntityKey::Int(1))),
    );
    assert_eq!(ids(&done), vec![2]);
  }

  #[test]
  fn test_rollback_only_touches_its_own_request() {
    let metadata = heroes();
    let collection = loaded_with(&metadata, vec![hero(1, "A")]);
    let first = EntityAction::new(
      "Hero",
      EntityOp::SaveUpdateOne(Update {
        id: EntityKey::Int(1),
        changes: json!({"name": "B"}),
      }),
    )
    .optimistic(true);
    let second = EntityAction::new(
      "Hero",
      EntityOp::SaveUpdateOne(Update {
        id: EntityKey::Int(1),
        changes: json!({"name": "C"}),
      }),
    )
    .optimistic(true);

    let state = apply(&collection, &metadata, &first);
    let state = apply(&state, &metadata, &second);

    // The first update fails after the second one already overwrote it.
    let reduction = reduce(
      &state,
      &metadata,
      &first.follow_up(EntityOp::SaveUpdateOneError(remote_error())),
    );
    assert_eq!(reduction.collection.get(&EntityKey::Int(1)), Some(&hero(1, "C")));
    assert!(reduction.conflict.is_none());

    // The second update's rollback skips the rejected "B".
    let state = apply(
      &reduction.collection,
      &metadata,
      &second.follow_up(EntityOp::SaveUpdateOneError(remote_error())),
    );
    assert_eq!(state.get(&EntityKey::Int(1)), Some(&hero(1, "A")));
    assert!(state.pending.is_empty());
  }

  #[test]
  fn test_update_rollback_conflicts_after_unrelated_change() {
    let metadata = heroes();
    let collection = loaded_with(&metadata, vec![hero(1, "A")]);
    let update = EntityAction::new(
      "Hero",
      EntityOp::SaveUpdateOne(Update {
        id: EntityKey::Int(1),
        changes: json!({"name": "B"}),
      }),
    )
    .optimistic(true);

    let state = apply(&collection, &metadata, &update);
    let state = apply(
      &state,
      &metadata,
      &EntityAction::new("Hero", EntityOp::UpsertOne(hero(1, "Server"))),
    );
    let reduction = reduce(
      &state,
      &metadata,
      &update.follow_up(EntityOp::SaveUpdateOneError(remote_error())),
    );

    assert_eq!(reduction.collection.get(&EntityKey::Int(1)), Some(&hero(1, "Server")));
    assert!(matches!(reduction.conflict, Some(Error::RollbackConflict { .. })));
  }

  #[test]
  fn test_failed_update_then_failed_delete_restores_original() {
    let metadata = heroes();
    let collection = loaded_with(&metadata, vec![hero(1, "A"), hero(2, "B")]);
    let update = EntityAction::new(
      "Hero",
      EntityOp::SaveUpdateOne(Update {
        id: EntityKey::Int(1),
        changes: json!({"name": "Z"}),
      }),
    )
    .optimistic(true);
    let delete =
      EntityAction::new("Hero", EntityOp::SaveDeleteOne(EntityKey::Int(1))).optimistic(true);

    let state = apply(&collection, &metadata, &update);
    let state = apply(&state, &metadata, &delete);
    let reduction = reduce(
      &state,
      &metadata,
      &update.follow_up(EntityOp::SaveUpdateOneError(remote_error())),
    );
    assert!(reduction.conflict.is_none());
    assert_eq!(ids(&reduction.collection), vec![2]);

    let state = apply(
      &reduction.collection,
      &metadata,
      &delete.follow_up(EntityOp::SaveDeleteOneError(remote_error())),
    );
    assert_eq!(state.get(&EntityKey::Int(1)), Some(&hero(1, "A")));
    assert_eq!(ids(&state), vec![1, 2]);
    assert!(state.pending.is_empty());
  }

  #[test]
  fn test_failed_add_then_failed_delete_leaves_nothing() {
    let metadata = heroes();
    let collection = loaded_with(&metadata, vec![hero(1, "A")]);
    let add = EntityAction::new("Hero", EntityOp::SaveAddOne(hero(7, "New"))).optimistic(true);
    let delete =
      EntityAction::new("Hero", EntityOp::SaveDeleteOne(EntityKey::Int(7))).optimistic(true);

    let state = apply(&collection, &metadata, &add);
    let state = apply(&state, &metadata, &delete);
    let reduction = reduce(
      &state,
      &metadata,
      &add.follow_up(EntityOp::SaveAddOneError(remote_error())),
    );
    assert!(reduction.conflict.is_none());

    let state = apply(
      &reduction.collection,
      &metadata,
      &delete.follow_up(EntityOp::SaveDeleteOneError(remote_error())),
    );
    assert_eq!(ids(&state), vec![1]);
    assert!(state.pending.is_empty());
  }

  #[test]
  fn test_failed_add_without_pending_delete_conflicts() {
    let metadata = heroes();
    let collection = loaded_with(&metadata, vec![hero(1, "A")]);
    let add = EntityAction::new("Hero", EntityOp::SaveAddOne(hero(7, "New"))).optimistic(true);

    let state = apply(&collection, &metadata, &add);
    let state = apply(
      &state,
      &metadata,
      &EntityAction::new("Hero", EntityOp::RemoveOne(EntityKey::Int(7))),
    );
    let reduction = reduce(
      &state,
      &metadata,
      &add.follow_up(EntityOp::SaveAddOneError(remote_error())),
    );
    assert_eq!(ids(&reduction.collection), vec![1]);
    assert!(reduction.conflict.is_some());
  }

  #[test]
  fn test_update_success_does_not_resurrect_deleted_entity() {
    let metadata = heroes();
    let collection = loaded_with(&metadata, vec![hero(1, "A"), hero(2, "B")]);
    let update = EntityAction::new(
      "Hero",
      EntityOp::SaveUpdateOne(Update {
        id: EntityKey::Int(1),
        changes: json!({"name": "Z"}),
      }),
    );
    let delete =
      EntityAction::new("Hero", EntityOp::SaveDeleteOne(EntityKey::Int(1))).optimistic(true);

    let state = apply(&collection, &metadata, &update);
    let state = apply(&state, &metadata, &delete);
    let state = apply(
      &state,
      &metadata,
      &delete.follow_up(EntityOp::SaveDeleteOneSuccess(EntityKey::Int(1))),
    );
    let state = apply(
      &state,
      &metadata,
      &update.follow_up(EntityOp::SaveUpdateOneSuccess(Update {
        id: EntityKey::Int(1),
        changes: hero(1, "Z"),
      })),
    );

    assert_eq!(ids(&state), vec![2]);
    assert!(state.pending.is_empty());
  }

  #[test]
  fn test_delete_rollback_conflicts_when_re_added() {
    let metadata = heroes();
    let collection = loaded_with(&metadata, vec![hero(1, "A")]);
    let delete =
      EntityAction::new("Hero", EntityOp::SaveDeleteOne(EntityKey::Int(1))).optimistic(true);

    let state = apply(&collection, &metadata, &delete);
    let state = apply(
      &state,
      &metadata,
      &EntityAction::new("Hero", EntityOp::AddOne(hero(1, "New"))),
    );
    let reduction = reduce(
      &state,
      &metadata,
      &delete.follow_up(EntityOp::SaveDeleteOneError(remote_error())),
    );

    assert_eq!(reduction.collection.get(&EntityKey::Int(1)), Some(&hero(1, "New")));
    assert!(reduction.conflict.is_some());
  }

  #[test]
  fn test_set_filter_leaves_entities() {
    let metadata = heroes().with_filter(props_filter(["name"]));
    let collection = loaded_with(&metadata, vec![hero(1, "A")]);
    let next = apply(
      &collection,
      &metadata,
      &EntityAction::new("Hero", EntityOp::SetFilter("a".into())),
    );
    assert_eq!(next.filter, "a");
    assert_eq!(next.entities, collection.entities);
    assert_eq!(next.ids, collection.ids);
  }

  #[test]
  fn test_remove_all_clears_loaded() {
    let metadata = heroes();
    let collection = loaded_with(&metadata, vec![hero(1, "A")]);
    assert!(collection.loaded);
    let next = apply(&collection, &metadata, &EntityAction::new("Hero", EntityOp::RemoveAll));
    assert!(next.is_empty());
    assert!(!next.loaded);
  }

  #[test]
  fn test_entities_without_key_are_ignored() {
    let metadata = heroes();
    let collection = loaded_with(&metadata, vec![json!({"name": "nameless"}), hero(1, "A")]);
    assert_eq!(ids(&collection), vec![1]);
  }

  #[test]
  fn test_merge_changes_is_shallow() {
    let merged = merge_changes(&json!({"id": 1, "a": {"x": 1}, "b": 2}), &json!({"a": {"y": 2}}));
    assert_eq!(merged, json!({"id": 1, "a": {"y": 2}, "b": 2}));
  }
}

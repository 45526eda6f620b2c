//! Dispatcher that turns entity commands into cache actions and remote requests.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use crate::cache::{EntityAction, EntityCache, EntityCollection, EntityKey, EntityOp, Update};
use crate::data::{DataResult, EntityCollectionDataService};
use crate::error::{Error, Result};
use crate::event::EntityErrors;
use crate::metadata::EntityMetadata;

/// Per-call override of the metadata's optimistic setting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveOptions {
  /// `None` uses the entity's dispatcher options
  pub is_optimistic: Option<bool>,
}

impl SaveOptions {
  pub fn optimistic() -> Self {
    Self {
      is_optimistic: Some(true),
    }
  }

  pub fn pessimistic() -> Self {
    Self {
      is_optimistic: Some(false),
    }
  }
}

/// What to delete: a key, or an entity whose key is read through the metadata.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyOrEntity {
  Key(EntityKey),
  Entity(Value),
}

impl From<EntityKey> for KeyOrEntity {
  fn from(key: EntityKey) -> Self {
    KeyOrEntity::Key(key)
  }
}

impl From<Value> for KeyOrEntity {
  fn from(entity: Value) -> Self {
    KeyOrEntity::Entity(entity)
  }
}

/// Dispatcher for one entity type.
///
/// Remote operations dispatch a start action, await the data service, then
/// dispatch a success or error action with the same correlation id. Optimistic
/// saves change the cache with the start action; pessimistic saves only with
/// the success action. A failed optimistic save is rolled back by the reducer.
///
/// No timeout applies unless the data service sets one. A request that never
/// resolves, or a future dropped before it completes, leaves `loading` set and
/// keeps its optimistic change in the collection's pending records for the rest
/// of the session.
#[derive(Clone)]
pub struct EntityDispatcher {
  entity_name: String,
  cache: Arc<EntityCache>,
  data_service: Arc<dyn EntityCollectionDataService>,
}

impl EntityDispatcher {
  pub fn new(
    entity_name: impl Into<String>,
    cache: Arc<EntityCache>,
    data_service: Arc<dyn EntityCollectionDataService>,
  ) -> Self {
    Self {
      entity_name: entity_name.into(),
      cache,
      data_service,
    }
  }

  pub fn entity_name(&self) -> &str {
    &self.entity_name
  }

  pub fn metadata(&self) -> Arc<EntityMetadata> {
    self.cache.registry().get(&self.entity_name)
  }

  /// Current snapshot of this type's collection.
  pub fn collection(&self) -> Arc<EntityCollection> {
    self.cache.collection(&self.entity_name)
  }

  /// Error actions for this entity type, from now on.
  pub fn errors(&self) -> EntityErrors {
    EntityErrors::new(&self.entity_name, self.cache.subscribe())
  }

  pub fn create_action(&self, op: EntityOp) -> EntityAction {
    EntityAction::new(&self.entity_name, op)
  }

  pub fn dispatch(&self, action: EntityAction) -> Arc<EntityCollection> {
    self.cache.dispatch(action)
  }

  /// Dispatch the outcome of a remote request as the follow-up of `action`.
  fn complete<T>(
    &self,
    action: &EntityAction,
    result: DataResult<T>,
    on_success: impl FnOnce(&T) -> EntityOp,
    on_error: fn(Error) -> EntityOp,
  ) -> Result<T> {
    match result {
      Ok(value) => {
        self.cache.dispatch(action.follow_up(on_success(&value)));
        Ok(value)
      }
      Err(e) => {
        let error = Error::from(e);
        info!(action = %action, %error, "remote request failed");
        self.cache.dispatch(action.follow_up(on_error(error.clone())));
        Err(error)
      }
    }
  }

  fn key_of(&self, metadata: &EntityMetadata, entity: &Value) -> Result<EntityKey> {
    metadata
      .select_id(entity)
      .ok_or_else(|| Error::MissingKey(self.entity_name.clone()))
  }

  /// Query every entity and replace the collection with the result.
  pub async fn get_all(&self) -> Result<Vec<Value>> {
    let action = self.create_action(EntityOp::QueryAll);
    self.cache.dispatch(action.clone());

    let result = self.data_service.get_all().await;
    self.complete(
      &action,
      result,
      |entities| EntityOp::QueryAllSuccess(entities.clone()),
      EntityOp::QueryAllError,
    )
  }

  /// Query one entity and merge it into the collection.
  pub async fn get_by_key(&self, key: impl Into<EntityKey>) -> Result<Value> {
    let key = key.into();
    let action = self.create_action(EntityOp::QueryByKey(key.clone()));
    self.cache.dispatch(action.clone());

    let result = self.data_service.get_by_key(key).await;
    self.complete(
      &action,
      result,
      |entity| EntityOp::QueryByKeySuccess(entity.clone()),
      EntityOp::QueryByKeyError,
    )
  }

  /// Query several entities and merge them into the collection.
  pub async fn get_by_keys(&self, keys: Vec<EntityKey>) -> Result<Vec<Value>> {
    let action = self.create_action(EntityOp::QueryMany(keys.clone()));
    self.cache.dispatch(action.clone());

    let result = self.data_service.get_by_keys(keys).await;
    self.complete(
      &action,
      result,
      |entities| EntityOp::QueryManySuccess(entities.clone()),
      EntityOp::QueryManyError,
    )
  }

  /// Save a new entity. Resolves to the entity as the server saved it.
  pub async fn add(&self, entity: Value, options: SaveOptions) -> Result<Value> {
    let metadata = self.metadata();
    let optimistic = options
      .is_optimistic
      .unwrap_or(metadata.dispatcher_options.optimistic_add);
    if optimistic {
      // An optimistic add has to be cached under its final key
      self.key_of(&metadata, &entity)?;
    }

    let action = self
      .create_action(EntityOp::SaveAddOne(entity.clone()))
      .optimistic(optimistic);
    debug!(action = %action, "saving new entity");
    self.cache.dispatch(action.clone());

    let result = self.data_service.add(entity).await;
    self.complete(
      &action,
      result,
      |saved| EntityOp::SaveAddOneSuccess(saved.clone()),
      EntityOp::SaveAddOneError,
    )
  }

  /// Save changes to an entity. Resolves to the saved entity.
  pub async fn update(&self, entity: Value, options: SaveOptions) -> Result<Value> {
    let metadata = self.metadata();
    let key = self.key_of(&metadata, &entity)?;
    let optimistic = options
      .is_optimistic
      .unwrap_or(metadata.dispatcher_options.optimistic_update);

    let update = Update {
      id: key,
      changes: entity,
    };
    let action = self
      .create_action(EntityOp::SaveUpdateOne(update.clone()))
      .optimistic(optimistic);
    debug!(action = %action, "saving entity changes");
    self.cache.dispatch(action.clone());

    let result = self.data_service.update(update.clone()).await;
    // No response body means the server took the changes as sent
    let result = result.map(|saved| saved.unwrap_or_else(|| update.changes.clone()));
    self.complete(
      &action,
      result,
      |saved| {
        EntityOp::SaveUpdateOneSuccess(Update {
          id: update.id.clone(),
          changes: saved.clone(),
        })
      },
      EntityOp::SaveUpdateOneError,
    )
  }

  /// Delete an entity by key or by value. Resolves to the deleted key.
  pub async fn delete(
    &self,
    target: impl Into<KeyOrEntity>,
    options: SaveOptions,
  ) -> Result<EntityKey> {
    let metadata = self.metadata();
    let key = match target.into() {
      KeyOrEntity::Key(key) => key,
      KeyOrEntity::Entity(entity) => self.key_of(&metadata, &entity)?,
    };
    let optimistic = options
      .is_optimistic
      .unwrap_or(metadata.dispatcher_options.optimistic_delete);

    let action = self
      .create_action(EntityOp::SaveDeleteOne(key.clone()))
      .optimistic(optimistic);
    debug!(action = %action, "deleting entity");
    self.cache.dispatch(action.clone());

    let result = self.data_service.delete(key.clone()).await.map(|_| key);
    self.complete(
      &action,
      result,
      |key| EntityOp::SaveDeleteOneSuccess(key.clone()),
      EntityOp::SaveDeleteOneError,
    )
  }

  pub fn set_filter(&self, pattern: impl Into<String>) {
    self
      .cache
      .dispatch(self.create_action(EntityOp::SetFilter(pattern.into())));
  }

  /// Replace the cached entities without a remote call.
  pub fn add_all_to_cache(&self, entities: Vec<Value>) {
    self.cache.dispatch(self.create_action(EntityOp::AddAll(entities)));
  }

  pub fn add_one_to_cache(&self, entity: Value) {
    self.cache.dispatch(self.create_action(EntityOp::AddOne(entity)));
  }

  pub fn upsert_one_in_cache(&self, entity: Value) {
    self.cache.dispatch(self.create_action(EntityOp::UpsertOne(entity)));
  }

  pub fn remove_one_from_cache(&self, key: impl Into<EntityKey>) {
    self
      .cache
      .dispatch(self.create_action(EntityOp::RemoveOne(key.into())));
  }

  /// Drop every cached entity and mark the collection as not loaded.
  pub fn clear_cache(&self) {
    self.cache.dispatch(self.create_action(EntityOp::RemoveAll));
  }

  pub fn set_loaded(&self, loaded: bool) {
    self.cache.dispatch(self.create_action(EntityOp::SetLoaded(loaded)));
  }

  pub fn set_loading(&self, loading: bool) {
    self.cache.dispatch(self.create_action(EntityOp::SetLoading(loading)));
  }
}

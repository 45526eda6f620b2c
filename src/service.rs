//! Typed access to entity collections.

use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::cache::{reserialize, Entity, EntityCache, EntityKey, EntitySelectors};
use crate::data::EntityDataService;
use crate::dispatcher::{EntityDispatcher, SaveOptions};
use crate::error::Result;
use crate::event::EntityErrors;
use crate::metadata::EntityMetadataRegistry;

/// Everything needed to build dispatchers: metadata, the cache and the data services.
#[derive(Clone)]
pub struct EntityServices {
  registry: Arc<EntityMetadataRegistry>,
  cache: Arc<EntityCache>,
  data: Arc<EntityDataService>,
}

impl EntityServices {
  pub fn new(registry: Arc<EntityMetadataRegistry>, data: EntityDataService) -> Self {
    Self {
      cache: Arc::new(EntityCache::new(Arc::clone(&registry))),
      registry,
      data: Arc::new(data),
    }
  }

  pub fn registry(&self) -> &Arc<EntityMetadataRegistry> {
    &self.registry
  }

  pub fn cache(&self) -> &Arc<EntityCache> {
    &self.cache
  }

  pub fn data(&self) -> &Arc<EntityDataService> {
    &self.data
  }

  /// Untyped dispatcher for `entity_name`.
  pub fn dispatcher(&self, entity_name: &str) -> EntityDispatcher {
    EntityDispatcher::new(
      entity_name,
      Arc::clone(&self.cache),
      self.data.get_service(entity_name),
    )
  }

  pub fn collection_service<T: Entity>(&self) -> EntityCollectionService<T> {
    EntityCollectionService::new(self)
  }
}

/// Commands and selectors for one entity type, converting to and from `T`.
pub struct EntityCollectionService<T> {
  dispatcher: EntityDispatcher,
  selectors: EntitySelectors,
  _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> EntityCollectionService<T> {
  pub fn new(services: &EntityServices) -> Self {
    let name = T::entity_name();
    Self {
      dispatcher: services.dispatcher(name),
      selectors: EntitySelectors::new(services.registry.get(name)),
      _entity: PhantomData,
    }
  }

  pub fn dispatcher(&self) -> &EntityDispatcher {
    &self.dispatcher
  }

  pub async fn get_all(&self) -> Result<Vec<T>> {
    let entities = self.dispatcher.get_all().await?;
    to_entities(entities.iter())
  }

  pub async fn get_by_key(&self, key: impl Into<EntityKey>) -> Result<T> {
    let entity = self.dispatcher.get_by_key(key).await?;
    Ok(reserialize(entity)?)
  }

  pub async fn get_by_keys(&self, keys: Vec<EntityKey>) -> Result<Vec<T>> {
    let entities = self.dispatcher.get_by_keys(keys).await?;
    to_entities(entities.iter())
  }

  pub async fn add(&self, entity: &T, options: SaveOptions) -> Result<T> {
    let saved = self.dispatcher.add(serde_json::to_value(entity)?, options).await?;
    Ok(reserialize(saved)?)
  }

  pub async fn update(&self, entity: &T, options: SaveOptions) -> Result<T> {
    let saved = self
      .dispatcher
      .update(serde_json::to_value(entity)?, options)
      .await?;
    Ok(reserialize(saved)?)
  }

  pub async fn delete(&self, key: impl Into<EntityKey>, options: SaveOptions) -> Result<EntityKey> {
    self.dispatcher.delete(key.into(), options).await
  }

  pub async fn delete_entity(&self, entity: &T, options: SaveOptions) -> Result<EntityKey> {
    self
      .dispatcher
      .delete(serde_json::to_value(entity)?, options)
      .await
  }

  pub fn set_filter(&self, pattern: impl Into<String>) {
    self.dispatcher.set_filter(pattern);
  }

  /// Cached entities in collection order.
  pub fn entities(&self) -> Result<Vec<T>> {
    let all = self.selectors.select_all(&self.dispatcher.collection());
    to_entities(all.iter())
  }

  /// Cached entities that pass the current filter.
  pub fn filtered_entities(&self) -> Result<Vec<T>> {
    let filtered = self
      .selectors
      .filtered_entities(&self.dispatcher.collection());
    to_entities(filtered.iter())
  }

  pub fn count(&self) -> usize {
    self.dispatcher.collection().len()
  }

  pub fn loading(&self) -> bool {
    self.selectors.loading(&self.dispatcher.collection())
  }

  pub fn loaded(&self) -> bool {
    self.selectors.loaded(&self.dispatcher.collection())
  }

  pub fn filter(&self) -> String {
    self
      .selectors
      .filter(&self.dispatcher.collection())
      .to_string()
  }

  pub fn errors(&self) -> EntityErrors {
    self.dispatcher.errors()
  }
}

fn to_entities<'a, T: Entity>(values: impl Iterator<Item = &'a Value>) -> Result<Vec<T>> {
  values
    .map(|value| reserialize::<T>(value).map_err(Into::into))
    .collect()
}

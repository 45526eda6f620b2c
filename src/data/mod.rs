//! Remote data access for entity collections.
//!
//! A data service talks to the backend for one entity type. The dispatcher only
//! sees the [`EntityCollectionDataService`] trait; [`HttpDataService`] speaks REST
//! and [`InMemoryDataService`] keeps everything in process.

mod http;
mod memory;

use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::cache::{EntityKey, Update};
use crate::error::DataServiceError;

pub use http::{DataServiceConfig, HttpDataService, HttpDataServiceFactory};
pub use memory::{InMemoryBackend, InMemoryDataService};

pub type DataResult<T> = Result<T, DataServiceError>;

/// Backend operations for one entity type.
///
/// A key the backend does not have is an error (404) for `get_by_key`,
/// `get_by_keys`, `update` and `delete`.
pub trait EntityCollectionDataService: Send + Sync {
  fn name(&self) -> &str;

  fn get_all(&self) -> BoxFuture<'_, DataResult<Vec<Value>>>;

  fn get_by_key(&self, key: EntityKey) -> BoxFuture<'_, DataResult<Value>>;

  fn get_by_keys(&self, keys: Vec<EntityKey>) -> BoxFuture<'_, DataResult<Vec<Value>>>;

  /// Returns the entity as saved, which may carry server-assigned fields.
  fn add(&self, entity: Value) -> BoxFuture<'_, DataResult<Value>>;

  /// Returns the saved entity, or `None` when the server sent no body.
  fn update(&self, update: Update) -> BoxFuture<'_, DataResult<Option<Value>>>;

  fn delete(&self, key: EntityKey) -> BoxFuture<'_, DataResult<()>>;
}

type ServiceFactory = Box<dyn Fn(&str) -> Arc<dyn EntityCollectionDataService> + Send + Sync>;

/// Registry of data services by entity name.
///
/// Types without an explicitly registered service get one from the default factory.
pub struct EntityDataService {
  services: RwLock<HashMap<String, Arc<dyn EntityCollectionDataService>>>,
  factory: ServiceFactory,
}

impl EntityDataService {
  pub fn new<F>(factory: F) -> Self
  where
    F: Fn(&str) -> Arc<dyn EntityCollectionDataService> + Send + Sync + 'static,
  {
    Self {
      services: RwLock::new(HashMap::new()),
      factory: Box::new(factory),
    }
  }

  /// Data service for `entity_name`, created by the default factory on first use.
  pub fn get_service(&self, entity_name: &str) -> Arc<dyn EntityCollectionDataService> {
    if let Some(service) = self
      .services
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .get(entity_name)
    {
      return Arc::clone(service);
    }

    let mut services = self
      .services
      .write()
      .unwrap_or_else(PoisonError::into_inner);
    Arc::clone(
      services
        .entry(entity_name.to_string())
        .or_insert_with(|| (self.factory)(entity_name)),
    )
  }

  /// Use a specific data service for one entity type.
  pub fn register_service(&self, entity_name: &str, service: Arc<dyn EntityCollectionDataService>) {
    self
      .services
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(entity_name.to_string(), service);
  }
}

//! In-process backend, used by the demo and by tests.

use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use super::{DataResult, EntityCollectionDataService};
use crate::cache::{merge_changes, EntityKey, Update};
use crate::error::DataServiceError;

#[derive(Default)]
struct BackendState {
  collections: HashMap<String, Vec<Value>>,
  /// Failures to return for the next requests, per entity name
  failures: HashMap<String, VecDeque<String>>,
}

/// Shared in-memory tables of JSON entities, keyed by their "id" field.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
  state: Arc<Mutex<BackendState>>,
}

impl InMemoryBackend {
  pub fn new() -> Self {
    Self::default()
  }

  /// Replace the stored entities of one type.
  pub fn seed(&self, entity_name: &str, entities: Vec<Value>) {
    self
      .lock()
      .collections
      .insert(entity_name.to_string(), entities);
  }

  /// Make the next request for `entity_name` fail with `message`.
  pub fn fail_next(&self, entity_name: &str, message: impl Into<String>) {
    self
      .lock()
      .failures
      .entry(entity_name.to_string())
      .or_default()
      .push_back(message.into());
  }

  pub fn entities(&self, entity_name: &str) -> Vec<Value> {
    self
      .lock()
      .collections
      .get(entity_name)
      .cloned()
      .unwrap_or_default()
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, BackendState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

/// Data service backed by an [`InMemoryBackend`].
pub struct InMemoryDataService {
  entity_name: String,
  backend: InMemoryBackend,
}

impl InMemoryDataService {
  pub fn new(entity_name: &str, backend: InMemoryBackend) -> Self {
    Self {
      entity_name: entity_name.to_string(),
      backend,
    }
  }

  fn url(&self) -> String {
    format!("memory:{}", self.entity_name.to_lowercase())
  }

  /// Run `op` against this type's table unless a failure was queued.
  fn with_table<T>(
    &self,
    method: &str,
    op: impl FnOnce(&mut Vec<Value>) -> DataResult<T>,
  ) -> DataResult<T> {
    let mut state = self.backend.lock();
    if let Some(message) = state
      .failures
      .get_mut(&self.entity_name)
      .and_then(VecDeque::pop_front)
    {
      debug!(entity = %self.entity_name, method, "injected failure");
      return Err(DataServiceError::new(method, self.url(), message).with_status(500));
    }
    let table = state.collections.entry(self.entity_name.clone()).or_default();
    op(table)
  }
}

fn key_of(entity: &Value) -> Option<EntityKey> {
  entity.get("id").and_then(EntityKey::from_value)
}

fn position(table: &[Value], key: &EntityKey) -> Option<usize> {
  table.iter().position(|e| key_of(e).as_ref() == Some(key))
}

/// Next integer id: one past the largest integer id in the table.
fn next_id(table: &[Value]) -> i64 {
  table
    .iter()
    .filter_map(|e| match key_of(e) {
      Some(EntityKey::Int(i)) => Some(i),
      _ => None,
    })
    .max()
    .unwrap_or(0)
    + 1
}

impl EntityCollectionDataService for InMemoryDataService {
  fn name(&self) -> &str {
    &self.entity_name
  }

  fn get_all(&self) -> BoxFuture<'_, DataResult<Vec<Value>>> {
    Box::pin(async move { self.with_table("GET", |table| Ok(table.clone())) })
  }

  fn get_by_key(&self, key: EntityKey) -> BoxFuture<'_, DataResult<Value>> {
    Box::pin(async move {
      let url = self.url();
      self.with_table("GET", |table| {
        position(table, &key)
          .map(|i| table[i].clone())
          .ok_or_else(|| DataServiceError::not_found("GET", &url, &key))
      })
    })
  }

  fn get_by_keys(&self, keys: Vec<EntityKey>) -> BoxFuture<'_, DataResult<Vec<Value>>> {
    Box::pin(async move {
      let url = self.url();
      self.with_table("GET", |table| {
        keys
          .iter()
          .map(|key| {
            position(table, key)
              .map(|i| table[i].clone())
              .ok_or_else(|| DataServiceError::not_found("GET", &url, key))
          })
          .collect::<DataResult<Vec<Value>>>()
      })
    })
  }

  fn add(&self, entity: Value) -> BoxFuture<'_, DataResult<Value>> {
    Box::pin(async move {
      let url = self.url();
      self.with_table("POST", |table| {
        let mut entity = entity;
        match key_of(&entity) {
          Some(key) if position(table, &key).is_some() => {
            return Err(
              DataServiceError::new("POST", &url, format!("entity {} already exists", key))
                .with_status(409),
            );
          }
          Some(_) => {}
          None => {
            let id = next_id(table);
            match entity.as_object_mut() {
              Some(fields) => {
                fields.insert("id".to_string(), Value::from(id));
              }
              None => {
                return Err(
                  DataServiceError::new("POST", &url, "entity must be a JSON object")
                    .with_status(400),
                );
              }
            }
          }
        }
        table.push(entity.clone());
        Ok(entity)
      })
    })
  }

  fn update(&self, update: Update) -> BoxFuture<'_, DataResult<Option<Value>>> {
    Box::pin(async move {
      let url = self.url();
      self.with_table("PUT", |table| {
        let index = position(table, &update.id)
          .ok_or_else(|| DataServiceError::not_found("PUT", &url, &update.id))?;
        let saved = merge_changes(&table[index], &update.changes);
        table[index] = saved.clone();
        Ok(Some(saved))
      })
    })
  }

  fn delete(&self, key: EntityKey) -> BoxFuture<'_, DataResult<()>> {
    Box::pin(async move {
      let url = self.url();
      self.with_table("DELETE", |table| {
        let index =
          position(table, &key).ok_or_else(|| DataServiceError::not_found("DELETE", &url, &key))?;
        table.remove(index);
        Ok(())
      })
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn service() -> (InMemoryBackend, InMemoryDataService) {
    let backend = InMemoryBackend::new();
    backend.seed("Hero", vec![json!({"id": 1, "name": "A"}), json!({"id": 2, "name": "B"})]);
    let service = InMemoryDataService::new("Hero", backend.clone());
    (backend, service)
  }

  #[tokio::test]
  async fn test_add_assigns_next_id() {
    let (backend, service) = service();
    let saved = service.add(json!({"name": "C"})).await.unwrap();
    assert_eq!(saved, json!({"id": 3, "name": "C"}));
    assert_eq!(backend.entities("Hero").len(), 3);
  }

  #[tokio::test]
  async fn test_add_existing_id_conflicts() {
    let (_, service) = service();
    let err = service.add(json!({"id": 1, "name": "X"})).await.unwrap_err();
    assert_eq!(err.status, Some(409));
  }

  #[tokio::test]
  async fn test_update_merges_and_delete_removes() {
    let (backend, service) = service();
    let saved = service
      .update(Update {
        id: EntityKey::Int(2),
        changes: json!({"name": "Bee"}),
      })
      .await
      .unwrap();
    assert_eq!(saved, Some(json!({"id": 2, "name": "Bee"})));

    service.delete(EntityKey::Int(1)).await.unwrap();
    assert_eq!(backend.entities("Hero"), vec![json!({"id": 2, "name": "Bee"})]);
  }

  #[tokio::test]
  async fn test_missing_key_is_not_found() {
    let (_, service) = service();
    let err = service.get_by_key(EntityKey::Int(9)).await.unwrap_err();
    assert_eq!(err.status, Some(404));

    let err = service
      .get_by_keys(vec![EntityKey::Int(2), EntityKey::Int(9)])
      .await
      .unwrap_err();
    assert_eq!(err.status, Some(404));

    let found = service.get_by_keys(vec![EntityKey::Int(2)]).await.unwrap();
    assert_eq!(found, vec![json!({"id": 2, "name": "B"})]);

    let err = service.delete(EntityKey::Int(9)).await.unwrap_err();
    assert_eq!(err.status, Some(404));
    assert_eq!(err.method, "DELETE");
  }

  #[tokio::test]
  async fn test_injected_failure_applies_once() {
    let (_, service) = service();
    service.backend.fail_next("Hero", "backend down");

    let err = service.get_all().await.unwrap_err();
    assert_eq!(err.message, "backend down");
    assert_eq!(service.get_all().await.unwrap().len(), 2);
  }
}

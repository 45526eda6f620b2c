//! The in-memory store owning every entity collection.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::action::EntityAction;
use super::collection::EntityCollection;
use super::reducer::reduce;
use crate::error::Error;
use crate::metadata::EntityMetadataRegistry;

/// How many unread events a slow subscriber may fall behind by
const EVENT_CAPACITY: usize = 256;

/// Notification published for every action the cache applies.
#[derive(Debug, Clone)]
pub enum CacheEvent {
  Applied(EntityAction),
  /// An error action whose optimistic change could no longer be undone
  RollbackConflict { action: EntityAction, error: Error },
}

impl CacheEvent {
  pub fn action(&self) -> &EntityAction {
    match self {
      CacheEvent::Applied(action) => action,
      CacheEvent::RollbackConflict { action, .. } => action,
    }
  }
}

/// Entity cache: one collection per entity type, changed only through [`EntityCache::dispatch`].
///
/// Collections are immutable snapshots behind `Arc`s. An action that changes a
/// collection swaps in a new snapshot; one that changes nothing keeps the old
/// `Arc`, so selectors can memoize on identity.
pub struct EntityCache {
  registry: Arc<EntityMetadataRegistry>,
  collections: RwLock<HashMap<String, Arc<EntityCollection>>>,
  events: broadcast::Sender<CacheEvent>,
}

impl EntityCache {
  pub fn new(registry: Arc<EntityMetadataRegistry>) -> Self {
    let (events, _) = broadcast::channel(EVENT_CAPACITY);
    Self {
      registry,
      collections: RwLock::new(HashMap::new()),
      events,
    }
  }

  pub fn registry(&self) -> &Arc<EntityMetadataRegistry> {
    &self.registry
  }

  /// Apply an action to its collection, creating the collection on first use.
  ///
  /// Returns the collection as it stands after the action.
  pub fn dispatch(&self, action: EntityAction) -> Arc<EntityCollection> {
    let metadata = self.registry.get(&action.entity_name);

    let (collection, conflict) = {
      let mut collections = self
        .collections
        .write()
        .unwrap_or_else(PoisonError::into_inner);
      let current = collections
        .entry(action.entity_name.clone())
        .or_insert_with(|| Arc::new(metadata.initial_collection()));

      let reduction = reduce(current, &metadata, &action);
      if reduction.collection != **current {
        *current = Arc::new(reduction.collection);
      }
      (Arc::clone(current), reduction.conflict)
    };

    debug!(
      action = %action,
      count = collection.len(),
      loading = collection.loading,
      "applied action"
    );

    let event = match conflict {
      Some(error) => {
        warn!(action = %action, %error, "optimistic change not rolled back");
        CacheEvent::RollbackConflict { action, error }
      }
      None => CacheEvent::Applied(action),
    };
    // Nobody listening is fine
    let _ = self.events.send(event);

    collection
  }

  /// Current snapshot of a collection. Types with no actions yet get an empty collection.
  pub fn collection(&self, entity_name: &str) -> Arc<EntityCollection> {
    if let Some(collection) = self
      .collections
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .get(entity_name)
    {
      return Arc::clone(collection);
    }
    Arc::new(self.registry.get(entity_name).initial_collection())
  }

  pub fn has_collection(&self, entity_name: &str) -> bool {
    self
      .collections
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .contains_key(entity_name)
  }

  /// Subscribe to every action applied from now on.
  pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
    self.events.subscribe()
  }
}

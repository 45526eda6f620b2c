use tokio::sync::broadcast::{
  self,
  error::{RecvError, TryRecvError},
};
use tracing::warn;

use crate::cache::{CacheEvent, EntityAction};

/// Stream of failed operations for one entity type.
///
/// Every error action the cache applies for that type comes through here,
/// after its rollback (if any) has already happened.
pub struct EntityErrors {
  entity_name: String,
  rx: broadcast::Receiver<CacheEvent>,
}

impl EntityErrors {
  pub fn new(entity_name: impl Into<String>, rx: broadcast::Receiver<CacheEvent>) -> Self {
    Self {
      entity_name: entity_name.into(),
      rx,
    }
  }

  /// Receive the next error action. `None` once the cache is gone.
  pub async fn next(&mut self) -> Option<EntityAction> {
    loop {
      match self.rx.recv().await {
        Ok(event) => {
          if let Some(action) = self.matching(&event) {
            return Some(action);
          }
        }
        Err(RecvError::Lagged(skipped)) => self.lagged(skipped),
        Err(RecvError::Closed) => return None,
      }
    }
  }

  /// Next error action that is already waiting, without blocking.
  pub fn try_next(&mut self) -> Option<EntityAction> {
    loop {
      match self.rx.try_recv() {
        Ok(event) => {
          if let Some(action) = self.matching(&event) {
            return Some(action);
          }
        }
        Err(TryRecvError::Lagged(skipped)) => self.lagged(skipped),
        Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
      }
    }
  }

  fn matching(&self, event: &CacheEvent) -> Option<EntityAction> {
    let action = event.action();
    (action.entity_name == self.entity_name && action.error().is_some()).then(|| action.clone())
  }

  fn lagged(&self, skipped: u64) {
    warn!(entity = %self.entity_name, skipped, "error stream fell behind");
  }
}

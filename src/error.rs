use chrono::{DateTime, Utc};

use crate::cache::EntityKey;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
  #[error("Validation error: {0}")]
  Validation(String),
  #[error("{0}")]
  RemoteRequest(#[from] DataServiceError),
  #[error("Rollback of {correlation_id} on {entity_name} skipped: {reason}")]
  RollbackConflict {
    entity_name: String,
    correlation_id: String,
    reason: String,
  },
  #[error("Entity of type {0} has no primary key")]
  MissingKey(String),
  #[error("Failed to convert entity: {0}")]
  Serialization(String),
}

impl From<serde_json::Error> for Error {
  fn from(e: serde_json::Error) -> Self {
    Error::Serialization(e.to_string())
  }
}

/// Failure reported by a remote data service, along with the request that caused it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{method} {url} failed{}: {message}", status_suffix(.status))]
pub struct DataServiceError {
  pub method: String,
  pub url: String,
  /// HTTP status, when the server answered at all
  pub status: Option<u16>,
  pub message: String,
  pub occurred_at: DateTime<Utc>,
}

fn status_suffix(status: &Option<u16>) -> String {
  status.map(|s| format!(" ({})", s)).unwrap_or_default()
}

impl DataServiceError {
  pub fn new(
    method: impl Into<String>,
    url: impl Into<String>,
    message: impl Into<String>,
  ) -> Self {
    Self {
      method: method.into(),
      url: url.into(),
      status: None,
      message: message.into(),
      occurred_at: Utc::now(),
    }
  }

  pub fn with_status(mut self, status: u16) -> Self {
    self.status = Some(status);
    self
  }

  /// Error for a key lookup that the backend could not satisfy.
  pub fn not_found(method: &str, url: &str, key: &EntityKey) -> Self {
    Self::new(method, url, format!("entity {} not found", key)).with_status(404)
  }
}

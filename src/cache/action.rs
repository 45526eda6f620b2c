//! Actions applied to entity collections.

use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::traits::EntityKey;
use crate::error::Error;

/// Identifies one logical operation across its start, success and error actions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CorrelationId(String);

impl CorrelationId {
  /// Generate the next process-wide id ("CRID1", "CRID2", ...).
  pub fn next() -> Self {
    static SEED: AtomicU64 = AtomicU64::new(0);
    let n = SEED.fetch_add(1, Ordering::Relaxed) + 1;
    CorrelationId(format!("CRID{}", n))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for CorrelationId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Partial (or full) changes to one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
  pub id: EntityKey,
  /// JSON object whose fields replace the entity's fields
  pub changes: Value,
}

/// The operation an action carries, with its payload.
#[derive(Debug, Clone, PartialEq)]
pub enum EntityOp {
  // Remote queries
  QueryAll,
  QueryAllSuccess(Vec<Value>),
  QueryAllError(Error),
  QueryByKey(EntityKey),
  QueryByKeySuccess(Value),
  QueryByKeyError(Error),
  QueryMany(Vec<EntityKey>),
  QueryManySuccess(Vec<Value>),
  QueryManyError(Error),

  // Remote saves
  SaveAddOne(Value),
  SaveAddOneSuccess(Value),
  SaveAddOneError(Error),
  SaveUpdateOne(Update),
  SaveUpdateOneSuccess(Update),
  SaveUpdateOneError(Error),
  SaveDeleteOne(EntityKey),
  SaveDeleteOneSuccess(EntityKey),
  SaveDeleteOneError(Error),

  // Cache-only
  AddAll(Vec<Value>),
  AddOne(Value),
  AddMany(Vec<Value>),
  UpsertOne(Value),
  UpsertMany(Vec<Value>),
  UpdateOne(Update),
  RemoveOne(EntityKey),
  RemoveMany(Vec<EntityKey>),
  RemoveAll,
  SetFilter(String),
  SetLoaded(bool),
  SetLoading(bool),
}

impl EntityOp {
  /// Short name used in logs
  pub fn name(&self) -> &'static str {
    match self {
      EntityOp::QueryAll => "query-all",
      EntityOp::QueryAllSuccess(_) => "query-all/success",
      EntityOp::QueryAllError(_) => "query-all/error",
      EntityOp::QueryByKey(_) => "query-by-key",
      EntityOp::QueryByKeySuccess(_) => "query-by-key/success",
      EntityOp::QueryByKeyError(_) => "query-by-key/error",
      EntityOp::QueryMany(_) => "query-many",
      EntityOp::QueryManySuccess(_) => "query-many/success",
      EntityOp::QueryManyError(_) => "query-many/error",
      EntityOp::SaveAddOne(_) => "save/add-one",
      EntityOp::SaveAddOneSuccess(_) => "save/add-one/success",
      EntityOp::SaveAddOneError(_) => "save/add-one/error",
      EntityOp::SaveUpdateOne(_) => "save/update-one",
      EntityOp::SaveUpdateOneSuccess(_) => "save/update-one/success",
      EntityOp::SaveUpdateOneError(_) => "save/update-one/error",
      EntityOp::SaveDeleteOne(_) => "save/delete-one",
      EntityOp::SaveDeleteOneSuccess(_) => "save/delete-one/success",
      EntityOp::SaveDeleteOneError(_) => "save/delete-one/error",
      EntityOp::AddAll(_) => "add-all",
      EntityOp::AddOne(_) => "add-one",
      EntityOp::AddMany(_) => "add-many",
      EntityOp::UpsertOne(_) => "upsert-one",
      EntityOp::UpsertMany(_) => "upsert-many",
      EntityOp::UpdateOne(_) => "update-one",
      EntityOp::RemoveOne(_) => "remove-one",
      EntityOp::RemoveMany(_) => "remove-many",
      EntityOp::RemoveAll => "remove-all",
      EntityOp::SetFilter(_) => "set-filter",
      EntityOp::SetLoaded(_) => "set-loaded",
      EntityOp::SetLoading(_) => "set-loading",
    }
  }

  /// The error carried by a failure op.
  pub fn error(&self) -> Option<&Error> {
    match self {
      EntityOp::QueryAllError(e)
      | EntityOp::QueryByKeyError(e)
      | EntityOp::QueryManyError(e)
      | EntityOp::SaveAddOneError(e)
      | EntityOp::SaveUpdateOneError(e)
      | EntityOp::SaveDeleteOneError(e) => Some(e),
      _ => None,
    }
  }
}

/// An operation addressed to one entity collection.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityAction {
  pub entity_name: String,
  pub op: EntityOp,
  pub correlation_id: CorrelationId,
  /// Whether a save was applied to the cache ahead of the server
  pub is_optimistic: bool,
}

impl EntityAction {
  pub fn new(entity_name: impl Into<String>, op: EntityOp) -> Self {
    Self {
      entity_name: entity_name.into(),
      op,
      correlation_id: CorrelationId::next(),
      is_optimistic: false,
    }
  }

  pub fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
    self.correlation_id = correlation_id;
    self
  }

  pub fn optimistic(mut self, is_optimistic: bool) -> Self {
    self.is_optimistic = is_optimistic;
    self
  }

  /// Follow-up action for the same operation (success or error).
  pub fn follow_up(&self, op: EntityOp) -> Self {
    Self {
      entity_name: self.entity_name.clone(),
      op,
      correlation_id: self.correlation_id.clone(),
      is_optimistic: self.is_optimistic,
    }
  }

  pub fn error(&self) -> Option<&Error> {
    self.op.error()
  }
}

impl fmt::Display for EntityAction {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "[{}] {} ({})",
      self.entity_name,
      self.op.name(),
      self.correlation_id
    )
  }
}

//! REST resource URLs for entity collections.

use std::sync::Arc;
use url::Url;

use crate::error::{Error, Result};
use crate::pluralizer::Pluralizer;

/// Builds resource paths from entity names.
///
/// Single-entity endpoints use the lowercased entity name ("hero"); collection
/// endpoints use the lowercased plural ("heroes").
#[derive(Debug, Clone)]
pub struct HttpUrlGenerator {
  pluralizer: Arc<Pluralizer>,
}

/// Absolute URLs for one entity type under an API root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResourceUrls {
  /// e.g. http://localhost:3000/api/hero/
  pub entity_resource_url: Url,
  /// e.g. http://localhost:3000/api/heroes/
  pub collection_resource_url: Url,
}

impl HttpUrlGenerator {
  pub fn new(pluralizer: Arc<Pluralizer>) -> Self {
    Self { pluralizer }
  }

  pub fn resource_url(&self, entity_name: &str) -> String {
    entity_name.to_lowercase()
  }

  pub fn collection_url(&self, entity_name: &str) -> String {
    self.pluralizer.pluralize(entity_name).to_lowercase()
  }

  /// Join both resource paths onto an absolute API root.
  pub fn resource_urls(&self, root: &str, entity_name: &str) -> Result<HttpResourceUrls> {
    let mut root = root.trim().to_string();
    if !root.ends_with('/') {
      root.push('/');
    }
    let root = Url::parse(&root)
      .map_err(|e| Error::Validation(format!("invalid API root {}: {}", root, e)))?;

    let join = |segment: String| {
      root
        .join(&format!("{}/", segment))
        .map_err(|e| Error::Validation(format!("invalid resource path {}: {}", segment, e)))
    };

    Ok(HttpResourceUrls {
      entity_resource_url: join(self.resource_url(entity_name))?,
      collection_resource_url: join(self.collection_url(entity_name))?,
    })
  }
}

//! REST data service over reqwest.

use futures::future::{self, BoxFuture};
use reqwest::{Client, Method};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{DataResult, EntityCollectionDataService};
use crate::cache::{EntityKey, Update};
use crate::error::DataServiceError;
use crate::pluralizer::Pluralizer;
use crate::url_generator::{HttpResourceUrls, HttpUrlGenerator};

/// Settings shared by every HTTP data service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataServiceConfig {
  /// Absolute API root, e.g. "http://localhost:3000/api"
  pub root: String,
  /// Per-request timeout. `None` waits indefinitely.
  pub timeout: Option<Duration>,
}

impl Default for DataServiceConfig {
  fn default() -> Self {
    Self {
      root: "http://localhost:3000/api".to_string(),
      timeout: None,
    }
  }
}

/// Creates [`HttpDataService`]s that share one client and URL generator.
#[derive(Clone)]
pub struct HttpDataServiceFactory {
  client: Client,
  config: DataServiceConfig,
  urls: HttpUrlGenerator,
}

impl HttpDataServiceFactory {
  pub fn new(config: DataServiceConfig, pluralizer: Arc<Pluralizer>) -> Self {
    Self {
      client: Client::new(),
      config,
      urls: HttpUrlGenerator::new(pluralizer),
    }
  }

  pub fn create(&self, entity_name: &str) -> HttpDataService {
    HttpDataService {
      entity_name: entity_name.to_string(),
      client: self.client.clone(),
      config: self.config.clone(),
      urls: self.urls.clone(),
    }
  }
}

/// Data service for one entity type against a REST backend.
///
/// - GET    {root}/{plural}/       all entities
/// - GET    {root}/{singular}/{id} one entity
/// - POST   {root}/{singular}/     add
/// - PUT    {root}/{singular}/{id} update
/// - DELETE {root}/{singular}/{id} delete
pub struct HttpDataService {
  entity_name: String,
  client: Client,
  config: DataServiceConfig,
  urls: HttpUrlGenerator,
}

impl HttpDataService {
  fn resource_urls(&self, method: &Method) -> DataResult<HttpResourceUrls> {
    self
      .urls
      .resource_urls(&self.config.root, &self.entity_name)
      .map_err(|e| DataServiceError::new(method.as_str(), &self.config.root, e.to_string()))
  }

  fn entity_url(&self, method: &Method, key: &EntityKey) -> DataResult<Url> {
    let mut url = self.resource_urls(method)?.entity_resource_url;
    let root = url.to_string();
    url
      .path_segments_mut()
      .map_err(|_| DataServiceError::new(method.as_str(), &root, "API root cannot have a path"))?
      .pop_if_empty()
      .push(&key.to_string());
    Ok(url)
  }

  /// Send one request; an empty success body is `None`.
  async fn execute(
    &self,
    method: Method,
    url: Url,
    body: Option<&Value>,
  ) -> DataResult<Option<Value>> {
    let fail = |message: String| DataServiceError::new(method.as_str(), url.as_str(), message);

    let mut request = self.client.request(method.clone(), url.clone());
    if let Some(timeout) = self.config.timeout {
      request = request.timeout(timeout);
    }
    if let Some(body) = body {
      request = request.json(body);
    }

    debug!(entity = %self.entity_name, %method, %url, "sending request");
    let response = request.send().await.map_err(|e| {
      if e.is_timeout() {
        fail("request timed out".to_string())
      } else {
        fail(e.to_string())
      }
    })?;

    let status = response.status();
    let text = response.text().await.map_err(|e| fail(e.to_string()))?;

    if !status.is_success() {
      let message = if text.trim().is_empty() {
        status.canonical_reason().unwrap_or("request failed").to_string()
      } else {
        text
      };
      return Err(fail(message).with_status(status.as_u16()));
    }

    if text.trim().is_empty() {
      return Ok(None);
    }
    serde_json::from_str(&text)
      .map(Some)
      .map_err(|e| fail(format!("invalid response body: {}", e)).with_status(status.as_u16()))
  }

  async fn execute_entity(
    &self,
    method: Method,
    url: Url,
    body: Option<&Value>,
  ) -> DataResult<Value> {
    let display = url.to_string();
    self
      .execute(method.clone(), url, body)
      .await?
      .ok_or_else(|| DataServiceError::new(method.as_str(), display, "empty response body"))
  }
}

fn into_list(method: &Method, url: &str, value: Value) -> DataResult<Vec<Value>> {
  match value {
    Value::Array(items) => Ok(items),
    _ => Err(DataServiceError::new(method.as_str(), url, "expected a JSON array")),
  }
}

impl EntityCollectionDataService for HttpDataService {
  fn name(&self) -> &str {
    &self.entity_name
  }

  fn get_all(&self) -> BoxFuture<'_, DataResult<Vec<Value>>> {
    Box::pin(async move {
      let url = self.resource_urls(&Method::GET)?.collection_resource_url;
      let display = url.to_string();
      let body = self.execute_entity(Method::GET, url, None).await?;
      into_list(&Method::GET, &display, body)
    })
  }

  fn get_by_key(&self, key: EntityKey) -> BoxFuture<'_, DataResult<Value>> {
    Box::pin(async move {
      let url = self.entity_url(&Method::GET, &key)?;
      self.execute_entity(Method::GET, url, None).await
    })
  }

  fn get_by_keys(&self, keys: Vec<EntityKey>) -> BoxFuture<'_, DataResult<Vec<Value>>> {
    Box::pin(async move {
      let requests = keys
        .into_iter()
        .map(|key| self.get_by_key(key))
        .collect::<Vec<_>>();
      future::try_join_all(requests).await
    })
  }

  fn add(&self, entity: Value) -> BoxFuture<'_, DataResult<Value>> {
    Box::pin(async move {
      let url = self.resource_urls(&Method::POST)?.entity_resource_url;
      self.execute_entity(Method::POST, url, Some(&entity)).await
    })
  }

  fn update(&self, update: Update) -> BoxFuture<'_, DataResult<Option<Value>>> {
    Box::pin(async move {
      let url = self.entity_url(&Method::PUT, &update.id)?;
      self.execute(Method::PUT, url, Some(&update.changes)).await
    })
  }

  fn delete(&self, key: EntityKey) -> BoxFuture<'_, DataResult<()>> {
    Box::pin(async move {
      let url = self.entity_url(&Method::DELETE, &key)?;
      self.execute(Method::DELETE, url, None).await.map(|_| ())
    })
  }
}

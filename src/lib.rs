//! Client-side entity cache.
//!
//! Entities of each registered type live in a normalized collection inside an
//! [`EntityCache`]. An [`EntityDispatcher`] runs queries and saves against a
//! remote data service and records their progress in the cache; saves are
//! optimistic or pessimistic per type or per call, and failed optimistic saves
//! roll back only their own change.

pub mod cache;
pub mod data;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod metadata;
pub mod pluralizer;
pub mod service;
pub mod url_generator;

pub use cache::{Entity, EntityCache, EntityCollection, EntityKey};
pub use dispatcher::{EntityDispatcher, KeyOrEntity, SaveOptions};
pub use error::{DataServiceError, Error, Result};
pub use metadata::{DispatcherOptions, EntityMetadata, EntityMetadataMap, EntityMetadataRegistry};
pub use pluralizer::Pluralizer;
pub use service::{EntityCollectionService, EntityServices};
pub use url_generator::{HttpResourceUrls, HttpUrlGenerator};

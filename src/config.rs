use color_eyre::{eyre::eyre, Result};
use entity_cache::data::DataServiceConfig;
use entity_cache::metadata::{
  id_field_selector, props_filter, sort_by_field, DispatcherOptions, EntityMetadata,
  EntityMetadataMap,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub data_service: DataServiceSection,
  /// Plural overrides, singular name to plural name
  pub plurals: BTreeMap<String, String>,
  pub entities: BTreeMap<String, EntityConfig>,
  /// Log file (default: entity-cache.log in the data directory)
  pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DataServiceSection {
  /// Absolute API root. Without one, the in-memory backend is used.
  pub root: Option<String>,
  pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EntityConfig {
  /// Primary key field (default: "id")
  pub id_field: Option<String>,
  /// Fields matched by the collection filter
  pub filter_props: Vec<String>,
  pub sort_field: Option<String>,
  pub optimistic_add: Option<bool>,
  pub optimistic_update: Option<bool>,
  pub optimistic_delete: Option<bool>,
  pub additional_state: Map<String, Value>,
}

impl EntityConfig {
  fn to_metadata(&self, entity_name: &str) -> EntityMetadata {
    let defaults = DispatcherOptions::default();
    let mut metadata = EntityMetadata::new(entity_name).with_dispatcher_options(DispatcherOptions {
      optimistic_add: self.optimistic_add.unwrap_or(defaults.optimistic_add),
      optimistic_update: self.optimistic_update.unwrap_or(defaults.optimistic_update),
      optimistic_delete: self.optimistic_delete.unwrap_or(defaults.optimistic_delete),
    });
    if let Some(field) = &self.id_field {
      metadata.select_id = id_field_selector(field);
    }
    if !self.filter_props.is_empty() {
      metadata = metadata.with_filter(props_filter(self.filter_props.clone()));
    }
    if let Some(field) = &self.sort_field {
      metadata = metadata.with_sort(sort_by_field(field));
    }
    for (field, initial) in &self.additional_state {
      metadata = metadata.with_additional_state(field.clone(), initial.clone());
    }
    metadata
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./entity-cache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/entity-cache/config.yaml
  ///
  /// Built-in defaults are used when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("entity-cache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("entity-cache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
    // An empty file is an empty mapping
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(contents)
  }

  /// HTTP settings, or `None` when no API root is configured.
  pub fn data_service_config(&self) -> Option<DataServiceConfig> {
    let root = self.data_service.root.clone()?;
    Some(DataServiceConfig {
      root,
      timeout: self.data_service.timeout_ms.map(Duration::from_millis),
    })
  }

  pub fn metadata_map(&self) -> EntityMetadataMap {
    self
      .entities
      .iter()
      .map(|(name, entity)| (name.clone(), entity.to_metadata(name)))
      .collect()
  }

  pub fn log_file(&self) -> PathBuf {
    self.log_file.clone().unwrap_or_else(|| {
      dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("entity-cache")
        .join("entity-cache.log")
    })
  }
}

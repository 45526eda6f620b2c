use crate::commands;
use crate::config::Config;
use crate::demo;
use color_eyre::{eyre::eyre, Result};
use entity_cache::cache::{select_filter, select_filtered, EntityKey};
use entity_cache::data::{
  EntityCollectionDataService, EntityDataService, HttpDataServiceFactory, InMemoryDataService,
};
use entity_cache::event::EntityErrors;
use entity_cache::{
  EntityDispatcher, EntityMetadataRegistry, EntityServices, HttpUrlGenerator, Pluralizer,
  SaveOptions,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// One CLI request against an entity collection
#[derive(Debug, Clone, clap::Subcommand)]
pub enum Command {
  /// Load every entity of a type and print the ones passing the filter
  List {
    entity: String,
    /// Case-insensitive filter pattern
    #[arg(short, long)]
    filter: Option<String>,
  },
  /// Save a new entity given as JSON
  Add {
    entity: String,
    json: String,
    /// Cache the entity before the server confirms it
    #[arg(long)]
    optimistic: bool,
  },
  /// Save changes to an entity given as JSON (must include its key)
  Update {
    entity: String,
    json: String,
    #[arg(long)]
    optimistic: bool,
  },
  /// Delete an entity by key
  Delete {
    entity: String,
    key: String,
    /// Remove from the cache only after the server confirms
    #[arg(long)]
    pessimistic: bool,
  },
  /// Print the REST endpoints used for an entity type
  Urls { entity: String },
}

/// Main application state
pub struct App {
  services: EntityServices,
  pluralizer: Arc<Pluralizer>,
  /// API root for URL display, even in memory mode
  root: String,
}

impl App {
  pub fn new(config: &Config, memory: bool) -> Result<Self> {
    let registry = Arc::new(EntityMetadataRegistry::new());
    registry.register_map(demo::metadata())?;
    registry.register_map(config.metadata_map())?;

    let pluralizer = Arc::new(Pluralizer::with_plural_names(demo::plural_names()));
    pluralizer.register_plural_names(config.plurals.clone());

    let http = config.data_service_config();
    let root = http.clone().unwrap_or_default().root;

    let data = match http {
      Some(http) if !memory => {
        info!(root = %http.root, "using HTTP data services");
        let factory = HttpDataServiceFactory::new(http, Arc::clone(&pluralizer));
        EntityDataService::new(move |name: &str| {
          Arc::new(factory.create(name)) as Arc<dyn EntityCollectionDataService>
        })
      }
      _ => {
        info!("using in-memory data services");
        let backend = demo::seeded_backend();
        EntityDataService::new(move |name: &str| {
          let service: Arc<dyn EntityCollectionDataService> =
            Arc::new(InMemoryDataService::new(name, backend.clone()));
          service
        })
      }
    };

    Ok(Self {
      services: EntityServices::new(registry, data),
      pluralizer,
      root,
    })
  }

  pub async fn run(&self, command: Command) -> Result<()> {
    match command {
      Command::List { entity, filter } => {
        let (dispatcher, mut errors) = self.dispatcher(&entity)?;
        let result = dispatcher.get_all().await;
        report_errors(&mut errors);
        result?;

        if let Some(filter) = filter {
          dispatcher.set_filter(filter);
        }
        let collection = dispatcher.collection();
        let shown = select_filtered(&collection, &dispatcher.metadata());
        for entity in &shown {
          println!("{}", entity);
        }
        println!(
          "{} of {} {}",
          shown.len(),
          collection.len(),
          self.pluralizer.pluralize(dispatcher.entity_name())
        );
      }
      Command::Add {
        entity,
        json,
        optimistic,
      } => {
        let (dispatcher, mut errors) = self.loaded_dispatcher(&entity).await?;
        let options = SaveOptions {
          is_optimistic: optimistic.then_some(true),
        };
        let result = dispatcher.add(parse_entity(&json)?, options).await;
        report_errors(&mut errors);
        println!("added {}", result?);
        println!("{} cached", dispatcher.collection().len());
      }
      Command::Update {
        entity,
        json,
        optimistic,
      } => {
        let (dispatcher, mut errors) = self.loaded_dispatcher(&entity).await?;
        let options = SaveOptions {
          is_optimistic: optimistic.then_some(true),
        };
        let result = dispatcher.update(parse_entity(&json)?, options).await;
        report_errors(&mut errors);
        println!("updated {}", result?);
      }
      Command::Delete {
        entity,
        key,
        pessimistic,
      } => {
        let (dispatcher, mut errors) = self.loaded_dispatcher(&entity).await?;
        let options = SaveOptions {
          is_optimistic: pessimistic.then_some(false),
        };
        let result = dispatcher.delete(EntityKey::parse(&key), options).await;
        report_errors(&mut errors);
        println!("deleted {}", result?);
        println!("{} cached", dispatcher.collection().len());
      }
      Command::Urls { entity } => {
        let name = self.entity_name(&entity)?;
        let urls =
          HttpUrlGenerator::new(Arc::clone(&self.pluralizer)).resource_urls(&self.root, &name)?;
        println!("entity:     {}", urls.entity_resource_url);
        println!("collection: {}", urls.collection_resource_url);
      }
    }
    Ok(())
  }

  fn entity_name(&self, input: &str) -> Result<String> {
    let names: Vec<(String, String)> = self
      .services
      .registry()
      .entity_names()
      .into_iter()
      .map(|name| {
        let plural = self.pluralizer.pluralize(&name);
        (name, plural)
      })
      .collect();
    commands::resolve_entity(input, &names)
      .map(str::to_string)
      .ok_or_else(|| eyre!("Unknown entity type: {}", input))
  }

  fn dispatcher(&self, input: &str) -> Result<(EntityDispatcher, EntityErrors)> {
    let dispatcher = self.services.dispatcher(&self.entity_name(input)?);
    let errors = dispatcher.errors();
    Ok((dispatcher, errors))
  }

  /// Dispatcher whose collection is loaded, so saves act on cached entities.
  async fn loaded_dispatcher(&self, input: &str) -> Result<(EntityDispatcher, EntityErrors)> {
    let (dispatcher, errors) = self.dispatcher(input)?;
    dispatcher.get_all().await?;
    Ok((dispatcher, errors))
  }
}

fn parse_entity(json: &str) -> Result<Value> {
  let value: Value = serde_json::from_str(json).map_err(|e| eyre!("Invalid entity JSON: {}", e))?;
  if !value.is_object() {
    return Err(eyre!("Entity must be a JSON object"));
  }
  Ok(value)
}

/// Print error actions already published on the cache's channel.
fn report_errors(errors: &mut EntityErrors) {
  while let Some(action) = errors.try_next() {
    eprintln!("{}", action);
  }
}

use std::sync::Arc;

use crate::{
    cache::{CacheBackend, MemoryCache},
    catalog::TypeCatalog,
    config::{ConfigStore, MemoryConfig},
    container::Container,
    errors::BuildError,
    resolver::{ParameterResolver, ResolverOptions},
    script::{EchoEngine, ScriptEngine},
    types::{Instance, TypeName, DEFAULT_CATEGORY},
};

/// Collects the catalog, collaborators and initial registrations of a [Container]
///
/// ```ignore
/// let container = ContainerBuilder::new(catalog)
///     .config(MemoryConfig::from_json(document)?)
///     .add_type("app.Mailer")
///     .add_instance_in(Instance::new("app.Clock", clock), "tests")
///     .build()?;
/// ```
pub struct ContainerBuilder {
    catalog: TypeCatalog,
    config: Option<Arc<dyn ConfigStore>>,
    cache: Option<Arc<dyn CacheBackend>>,
    engine: Option<Arc<dyn ScriptEngine>>,
    options: ResolverOptions,
    /// Registered types to be built on first use
    registered_types: Vec<(TypeName, String)>,
    /// Registered already created instances
    registered_instances: Vec<(Instance, String)>,
}

impl ContainerBuilder {
    pub fn new(catalog: TypeCatalog) -> Self {
        ContainerBuilder {
            catalog,
            config: None,
            cache: None,
            engine: None,
            options: ResolverOptions::default(),
            registered_types: Vec::new(),
            registered_instances: Vec::new(),
        }
    }
}

impl ContainerBuilder {
    pub fn config(mut self, config: impl ConfigStore + 'static) -> Self {
        self.config = Some(Arc::new(config));
        self
    }

    /// Shares `cache`, e.g. with other containers
    pub fn cache(mut self, cache: Arc<dyn CacheBackend>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn engine(mut self, engine: impl ScriptEngine + 'static) -> Self {
        self.engine = Some(Arc::new(engine));
        self
    }

    pub fn options(mut self, options: ResolverOptions) -> Self {
        self.options = options;
        self
    }

    pub fn add_type(self, type_name: impl Into<TypeName>) -> Self {
        self.add_type_in(type_name, DEFAULT_CATEGORY)
    }

    pub fn add_type_in(mut self, type_name: impl Into<TypeName>, category: impl Into<String>) -> Self {
        self.registered_types.push((type_name.into(), category.into()));
        self
    }

    pub fn add_instance(self, instance: Instance) -> Self {
        self.add_instance_in(instance, DEFAULT_CATEGORY)
    }

    pub fn add_instance_in(mut self, instance: Instance, category: impl Into<String>) -> Self {
        self.registered_instances.push((instance, category.into()));
        self
    }

    /// Validates the catalog and applies all registrations in order,
    /// types first
    pub fn build(self) -> Result<Container, BuildError> {
        self.catalog.check()?;

        tracing::debug!(
            "Building container with {} types and {} instances",
            self.registered_types.len(),
            self.registered_instances.len()
        );

        let engine = match self.engine {
            Some(engine) => engine,
            None => Arc::new(EchoEngine::with_delimiters(
                self.options.metadata_delimiters.clone(),
            )),
        };
        let resolver = ParameterResolver::new(Arc::new(self.catalog), engine, self.options);
        let mut container = Container::from_parts(
            Arc::new(resolver),
            self.config.unwrap_or_else(|| Arc::new(MemoryConfig::new())),
            self.cache.unwrap_or_else(|| Arc::new(MemoryCache::new())),
        );

        for (type_name, category) in &self.registered_types {
            container.register_type(type_name, category)?;
        }
        for (instance, category) in self.registered_instances {
            container.register_instance(instance, &category)?;
        }

        Ok(container)
    }
}

use std::{collections::HashMap, fmt::Debug, path::Path, sync::Arc};

use crate::{
    cache::{CacheBackend, MemoryCache},
    catalog::TypeCatalog,
    config::{ConfigStore, MemoryConfig},
    errors::{ContainerError, ResolveError},
    resolver::{ParameterResolver, ResolverOptions},
    script::EchoEngine,
    signature::Callable,
    types::{normalize_type_name, Injectable, Instance, TypeName, Value},
};

/// Type name of the [ParameterResolver], resolves to an `Arc<ParameterResolver>`
pub const RESOLVER_TYPE: &str = "wrapp.ParameterResolver";
/// Type name of the cache, resolves to an `Arc<dyn CacheBackend>`
pub const CACHE_TYPE: &str = "wrapp.CacheBackend";
/// Type name of the configuration, resolves to an `Arc<dyn ConfigStore>`
pub const CONFIG_TYPE: &str = "wrapp.ConfigStore";

/// Built in services, they are always present and can't be registered
pub fn is_builtin(type_name: &str) -> bool {
    matches!(type_name, RESOLVER_TYPE | CACHE_TYPE | CONFIG_TYPE)
}

type EntryKey = (String, TypeName);

/// Registry of types and their instances, partitioned by category
///
/// Registering a type makes it available under all of its supertypes.
/// Instances are built on first [Container::get] and shared afterwards.
pub struct Container {
    resolver: Arc<ParameterResolver>,
    config: Arc<dyn ConfigStore>,
    cache: Arc<dyn CacheBackend>,
    /// category -> requested type -> concrete type
    registrations: HashMap<String, HashMap<TypeName, TypeName>>,
    /// (category, requested type) -> instance of the concrete type
    built: HashMap<EntryKey, Instance>,
    /// (category, concrete type) currently being built, innermost last
    building: Vec<EntryKey>,
}

impl Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_struct("Container");
        let mut entries: Vec<_> = self
            .registrations
            .iter()
            .flat_map(|(category, types)| types.iter().map(move |(requested, _)| (category, requested)))
            .collect();
        entries.sort();
        for (category, requested) in entries {
            let key = (category.clone(), requested.clone());
            let val = if self.built.contains_key(&key) {
                "built"
            } else {
                "unbuilt"
            };
            map.field(&format!("{category}/{requested}"), &val);
        }
        map.finish()
    }
}

impl Container {
    /// A container with an in memory configuration and cache
    pub fn new(catalog: TypeCatalog) -> Self {
        let options = ResolverOptions::default();
        let engine = EchoEngine::with_delimiters(options.metadata_delimiters.clone());
        let resolver = ParameterResolver::new(Arc::new(catalog), Arc::new(engine), options);
        Self::from_parts(
            Arc::new(resolver),
            Arc::new(MemoryConfig::new()),
            Arc::new(MemoryCache::new()),
        )
    }

    pub(crate) fn from_parts(
        resolver: Arc<ParameterResolver>,
        config: Arc<dyn ConfigStore>,
        cache: Arc<dyn CacheBackend>,
    ) -> Self {
        Container {
            resolver,
            config,
            cache,
            registrations: HashMap::new(),
            built: HashMap::new(),
            building: Vec::new(),
        }
    }

    pub fn catalog(&self) -> &TypeCatalog {
        self.resolver.catalog()
    }

    pub fn resolver(&self) -> &Arc<ParameterResolver> {
        &self.resolver
    }

    pub fn config(&self) -> &dyn ConfigStore {
        self.config.as_ref()
    }

    pub fn cache(&self) -> &dyn CacheBackend {
        self.cache.as_ref()
    }

    /// Registers `type_name` to be built on first use
    ///
    /// Replaces whatever was registered or built for the type and its
    /// supertypes in `category`.
    pub fn register_type(&mut self, type_name: &str, category: &str) -> Result<(), ContainerError> {
        let type_name = normalize_type_name(type_name);
        if is_builtin(&type_name) {
            return Err(ContainerError::Reserved(type_name));
        }
        if !self.catalog().contains(&type_name) {
            return Err(ContainerError::UnknownType(type_name));
        }

        let aliases = self.resolver.alias_types(self.cache(), &type_name);
        let registrations = self.registrations.entry(category.to_string()).or_default();
        for alias in aliases.iter() {
            registrations.insert(alias.clone(), type_name.clone());
            self.built.remove(&(category.to_string(), alias.clone()));
        }

        tracing::debug!("Registered type '{type_name}' in '{category}' as {aliases:?}");
        Ok(())
    }

    /// Registers an already built instance under its type and all supertypes
    pub fn register_instance(&mut self, instance: Instance, category: &str) -> Result<(), ContainerError> {
        if is_builtin(&instance.type_name) {
            return Err(ContainerError::Reserved(instance.type_name));
        }

        let aliases = self.resolver.alias_types(self.cache(), &instance.type_name);
        let registrations = self.registrations.entry(category.to_string()).or_default();
        for alias in aliases.iter() {
            registrations.insert(alias.clone(), instance.type_name.clone());
            self.built
                .insert((category.to_string(), alias.clone()), instance.clone());
        }

        tracing::debug!(
            "Registered instance of '{}' in '{category}' as {aliases:?}",
            instance.type_name
        );
        Ok(())
    }

    /// Whether `type_name` can be requested from `category`
    pub fn has(&self, type_name: &str, category: &str) -> bool {
        let type_name = normalize_type_name(type_name);
        is_builtin(&type_name)
            || self
                .registrations
                .get(category)
                .is_some_and(|types| types.contains_key(&type_name))
    }

    /// The shared instance of `type_name` in `category`, built on first use
    pub fn get(&mut self, type_name: &str, category: &str) -> Result<Instance, ContainerError> {
        let type_name = normalize_type_name(type_name);
        if let Some(builtin) = self.builtin(&type_name) {
            return Ok(builtin);
        }

        let concrete = self
            .registrations
            .get(category)
            .and_then(|types| types.get(&type_name))
            .cloned()
            .ok_or_else(|| ContainerError::NotFound {
                type_name: type_name.clone(),
                category: category.to_string(),
            })?;

        let requested_key = (category.to_string(), type_name.clone());
        let concrete_key = (category.to_string(), concrete.clone());
        let existing = self
            .built
            .get(&requested_key)
            .or_else(|| self.built.get(&concrete_key));
        if let Some(instance) = existing {
            if instance.type_name != concrete {
                return Err(ContainerError::Inconsistent {
                    requested: type_name,
                    category: category.to_string(),
                    expected: concrete,
                    actual: instance.type_name.clone(),
                });
            }
            let instance = instance.clone();
            self.built.insert(requested_key, instance.clone());
            return Ok(instance);
        }

        let instance = self.build(&concrete, category)?;
        self.store_built(&instance, category);
        Ok(instance)
    }

    /// A new instance of `type_name`, never shared
    ///
    /// Uses the type registered in `category` and falls back to building
    /// `type_name` itself.
    pub fn make(&mut self, type_name: &str, category: &str) -> Result<Instance, ContainerError> {
        let type_name = normalize_type_name(type_name);
        if is_builtin(&type_name) {
            return Err(ContainerError::Reserved(type_name));
        }

        let concrete = self
            .registrations
            .get(category)
            .and_then(|types| types.get(&type_name))
            .cloned()
            .unwrap_or(type_name);
        if !self.catalog().contains(&concrete) {
            return Err(ContainerError::UnknownType(concrete));
        }

        self.build(&concrete, category)
    }

    /// [Container::get] in the default category, downcasted to `T`
    pub fn get_as<T: Injectable>(&mut self, type_name: &str) -> Result<Arc<T>, ContainerError> {
        self.get_in_as(type_name, crate::types::DEFAULT_CATEGORY)
    }

    /// [Container::get], downcasted to `T`
    pub fn get_in_as<T: Injectable>(
        &mut self,
        type_name: &str,
        category: &str,
    ) -> Result<Arc<T>, ContainerError> {
        self.get(type_name, category)?
            .downcast()
            .map_err(|actual_type| ContainerError::DowncastFailed {
                required_type: std::any::type_name::<T>(),
                actual_type,
            })
    }

    /// Resolves the parameters of `callable` from this container and calls it
    pub fn call(&mut self, callable: &Callable) -> Result<Value, ResolveError> {
        let resolver = self.resolver.clone();
        resolver.call(self, callable)
    }

    /// Runs the file at `path`, see [ParameterResolver::include]
    pub fn include(&mut self, path: impl AsRef<Path>) -> Result<Value, ResolveError> {
        let resolver = self.resolver.clone();
        resolver.include(self, path.as_ref())
    }

    /// A copy with its own configuration and resolver
    ///
    /// Every built instance is deep copied once, an instance stored under
    /// several types or categories stays shared between them in the copy.
    /// The cache is shared with this container.
    pub fn clone_scope(&self) -> Container {
        let mut copies: HashMap<usize, Instance> = HashMap::new();
        let built = self
            .built
            .iter()
            .map(|(key, instance)| {
                let copy = copies
                    .entry(instance.identity())
                    .or_insert_with(|| instance.deep_clone())
                    .clone();
                (key.clone(), copy)
            })
            .collect();

        tracing::debug!("Cloned scope with {} distinct instances", copies.len());
        Container {
            resolver: Arc::new(ParameterResolver::clone(&self.resolver)),
            config: self.config.clone_store(),
            cache: self.cache.clone(),
            registrations: self.registrations.clone(),
            built,
            building: Vec::new(),
        }
    }

    /// A container without registrations, sharing the catalog and cache
    pub fn empty_scope(&self) -> Container {
        Self::from_parts(
            Arc::new(ParameterResolver::clone(&self.resolver)),
            self.config.clone_store(),
            self.cache.clone(),
        )
    }

    fn builtin(&self, type_name: &str) -> Option<Instance> {
        match type_name {
            RESOLVER_TYPE => Some(Instance::new(RESOLVER_TYPE, self.resolver.clone())),
            CACHE_TYPE => Some(Instance::new(CACHE_TYPE, self.cache.clone())),
            CONFIG_TYPE => Some(Instance::new(CONFIG_TYPE, self.config.clone())),
            _ => None,
        }
    }

    /// Builds `concrete`, guarding against cycles
    fn build(&mut self, concrete: &str, category: &str) -> Result<Instance, ContainerError> {
        let key = (category.to_string(), concrete.to_string());
        if self.building.contains(&key) {
            // Every build in flight, whatever category it was requested in
            let mut chain: Vec<TypeName> = self
                .building
                .iter()
                .map(|(_, type_name)| type_name.clone())
                .collect();
            chain.push(concrete.to_string());
            return Err(ContainerError::CircularDependency {
                type_name: concrete.to_string(),
                chain,
            });
        }

        tracing::debug!("Building '{concrete}' in '{category}'");
        self.building.push(key);
        let resolver = self.resolver.clone();
        let result = resolver.instantiate(self, concrete);
        self.building.pop();

        match result {
            Ok(instance) => Ok(instance),
            Err(ResolveError::Container(circular @ ContainerError::CircularDependency { .. })) => {
                Err(circular)
            }
            Err(error) => {
                tracing::error!("Failed to build '{concrete}' in '{category}': {error}");
                Err(ContainerError::ConstructionFailed {
                    type_name: concrete.to_string(),
                    source: Box::new(error),
                })
            }
        }
    }

    /// Stores a freshly built instance under every alias still registered to it
    fn store_built(&mut self, instance: &Instance, category: &str) {
        let aliases = self.resolver.alias_types(self.cache(), &instance.type_name);
        let Some(registrations) = self.registrations.get(category) else {
            return;
        };
        for alias in aliases.iter() {
            if registrations.get(alias) == Some(&instance.type_name) {
                self.built
                    .insert((category.to_string(), alias.clone()), instance.clone());
            }
        }
    }
}

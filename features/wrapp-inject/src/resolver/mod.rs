use std::{fmt, sync::Arc, time::Duration};

use crate::{
    cache::CacheBackend,
    catalog::TypeCatalog,
    container::Container,
    errors::{ContainerError, ResolveError},
    header::Delimiters,
    placeholder::{ConfigPlaceholder, ObjectPlaceholder, Placeholder, Placeholders, TypeTag},
    script::ScriptEngine,
    signature::{Arguments, Callable, ParamSpec, SignatureProvider},
    types::{Instance, TypeName, Value, DEFAULT_CATEGORY},
};

pub mod config;
pub mod include;

/// Tuning of the [ParameterResolver]
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// Delimiters of the metadata block in included files
    pub metadata_delimiters: Delimiters,
    /// Lifetime of cached signatures and alias lists, `None` keeps them forever.
    /// Parsed headers are keyed by content and never expire.
    pub cache_ttl: Option<Duration>,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        ResolverOptions {
            metadata_delimiters: Delimiters::default(),
            cache_ttl: None,
        }
    }
}

/// Turns declared parameters into placeholders and placeholders into values
///
/// Object placeholders are taken from the [Container], which in turn calls
/// back into the resolver to build instances it does not hold yet.
#[derive(Clone)]
pub struct ParameterResolver {
    catalog: Arc<TypeCatalog>,
    engine: Arc<dyn ScriptEngine>,
    options: ResolverOptions,
}

impl fmt::Debug for ParameterResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterResolver")
            .field("catalog", &self.catalog.len())
            .field("options", &self.options)
            .finish()
    }
}

impl ParameterResolver {
    pub fn new(
        catalog: Arc<TypeCatalog>,
        engine: Arc<dyn ScriptEngine>,
        options: ResolverOptions,
    ) -> Self {
        ParameterResolver {
            catalog,
            engine,
            options,
        }
    }

    pub fn catalog(&self) -> &TypeCatalog {
        &self.catalog
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    /// Derives the placeholders of a signature
    ///
    /// Results are cached under the identity of the provider, anonymous
    /// providers are derived on every call.
    pub fn placeholders(
        &self,
        cache: &dyn CacheBackend,
        provider: &dyn SignatureProvider,
    ) -> Result<Arc<Placeholders>, ResolveError> {
        let Some(identity) = provider.identity() else {
            return derive_placeholders("{closure}", &provider.parameters()).map(Arc::new);
        };

        let key = format!("wrapp.signature.{}.{identity}", self.catalog.id());
        cache.get_or_compute(&key, self.options.cache_ttl, || {
            tracing::debug!("Deriving placeholders of '{identity}'");
            derive_placeholders(&identity, &provider.parameters()).map(Arc::new)
        })
    }

    /// The type itself and all types it can be requested as
    pub fn alias_types(&self, cache: &dyn CacheBackend, type_name: &str) -> Arc<Vec<TypeName>> {
        let key = format!("wrapp.aliases.{}.{type_name}", self.catalog.id());
        let computed = cache.get_or_compute(&key, self.options.cache_ttl, || {
            Ok::<_, std::convert::Infallible>(Arc::new(self.catalog.alias_types(type_name)))
        });
        match computed {
            Ok(aliases) => aliases,
            Err(never) => match never {},
        }
    }

    /// Resolves every placeholder, in declaration order
    pub fn resolve_arguments(
        &self,
        container: &mut Container,
        placeholders: &Placeholders,
    ) -> Result<Arguments, ResolveError> {
        let mut arguments = Arguments::new();
        for (name, placeholder) in placeholders {
            let value = match placeholder {
                Placeholder::Object(object) => Value::Object(self.resolve_object(container, object)?),
                Placeholder::Config(config) => self.resolve_config(container.config(), config)?,
            };
            arguments.insert(name.clone(), value);
        }
        Ok(arguments)
    }

    pub fn resolve_object(
        &self,
        container: &mut Container,
        placeholder: &ObjectPlaceholder,
    ) -> Result<Instance, ContainerError> {
        container.get(&placeholder.type_name, &placeholder.category)
    }

    /// Resolves the parameters of `callable` and invokes it
    pub fn call(&self, container: &mut Container, callable: &Callable) -> Result<Value, ResolveError> {
        let placeholders = self.placeholders(container.cache(), callable)?;
        let arguments = self.resolve_arguments(container, &placeholders)?;
        callable
            .invoke(&arguments)
            .map_err(|source| ResolveError::Call {
                callable: callable.display_name().to_string(),
                source,
            })
    }

    /// Builds a new instance of `type_name` through its constructor
    pub fn instantiate(
        &self,
        container: &mut Container,
        type_name: &str,
    ) -> Result<Instance, ResolveError> {
        let descriptor = self
            .catalog
            .get(type_name)
            .ok_or_else(|| ContainerError::UnknownType(type_name.to_string()))?;
        let constructor = descriptor
            .constructor
            .as_ref()
            .ok_or_else(|| ResolveError::NotInstantiable(type_name.to_string()))?;

        match self.call(container, constructor)? {
            Value::Object(instance) if self.catalog.is_subtype(&instance.type_name, type_name) => {
                Ok(instance)
            }
            Value::Object(instance) => Err(ResolveError::NotAnInstance {
                type_name: type_name.to_string(),
                returned: instance.rust_type,
            }),
            other => Err(ResolveError::NotAnInstance {
                type_name: type_name.to_string(),
                returned: other.kind(),
            }),
        }
    }
}

fn derive_placeholders(callable: &str, params: &[ParamSpec]) -> Result<Placeholders, ResolveError> {
    let mut placeholders = Placeholders::new();
    for param in params {
        placeholders.insert(param.name.clone(), derive_placeholder(callable, param)?);
    }
    Ok(placeholders)
}

fn derive_placeholder(callable: &str, param: &ParamSpec) -> Result<Placeholder, ResolveError> {
    let invalid = |reason: &str| ResolveError::Signature {
        callable: callable.to_string(),
        param: param.name.clone(),
        reason: reason.to_string(),
    };

    let category = param
        .category
        .clone()
        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

    if let Some(key) = &param.config_key {
        if param.types.is_empty() {
            return Err(invalid("configuration parameters need at least one type"));
        }
        return Ok(Placeholder::Config(ConfigPlaceholder {
            key: key.clone(),
            category,
            candidate_types: param.types.clone(),
            optional: param.optional,
            default: param.default.clone(),
            nullable: param.nullable,
        }));
    }

    match param.types.as_slice() {
        [TypeTag::Object(type_name)] => Ok(Placeholder::Object(ObjectPlaceholder {
            type_name: type_name.clone(),
            category,
        })),
        [] => Err(invalid("the parameter declares no type")),
        [_] => Err(invalid("scalar parameters need a configuration key")),
        _ => Err(invalid("objects are injected by a single type, not a union")),
    }
}

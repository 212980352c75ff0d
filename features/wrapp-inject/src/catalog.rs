use std::{
    collections::{BTreeMap, HashSet},
    sync::atomic::{AtomicU64, Ordering},
};

use thiserror::Error;

use crate::{
    placeholder::TypeTag,
    signature::{Arguments, Callable, ParamSpec, SignatureProvider},
    types::{normalize_type_name, DynError, Injectable, TypeName},
};

static NEXT_CATALOG_ID: AtomicU64 = AtomicU64::new(1);

/// Everything the container knows about a type: its supertypes and how to build it
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    pub name: TypeName,
    /// Direct parents and implemented interfaces
    pub supertypes: Vec<TypeName>,
    /// `None` for interfaces and abstract types
    pub constructor: Option<Callable>,
}

impl TypeDescriptor {
    /// A type which can not be built, only used as an alias
    pub fn interface(name: impl AsRef<str>) -> Self {
        TypeDescriptor {
            name: normalize_type_name(name.as_ref()),
            supertypes: Vec::new(),
            constructor: None,
        }
    }

    /// A type built from its constructor
    pub fn class<T, F>(name: impl AsRef<str>, params: Vec<ParamSpec>, build: F) -> Self
    where
        T: Injectable + Clone,
        F: Fn(&Arguments) -> Result<T, DynError> + Send + Sync + 'static,
    {
        let name = normalize_type_name(name.as_ref());
        TypeDescriptor {
            constructor: Some(Callable::constructor(&name, params, build)),
            supertypes: Vec::new(),
            name,
        }
    }

    /// A type without constructor parameters
    pub fn default_class<T: Injectable + Clone + Default>(name: impl AsRef<str>) -> Self {
        Self::class(name, Vec::new(), |_| Ok(T::default()))
    }

    pub fn with_constructor(mut self, constructor: Callable) -> Self {
        self.constructor = Some(constructor);
        self
    }

    pub fn extends(mut self, supertype: impl AsRef<str>) -> Self {
        self.supertypes.push(normalize_type_name(supertype.as_ref()));
        self
    }
}

/// Catalog of all known types
///
/// Stands in for runtime reflection: the container resolves names, supertypes
/// and constructor signatures through it.
#[derive(Debug)]
pub struct TypeCatalog {
    id: u64,
    map: BTreeMap<TypeName, TypeDescriptor>,
}

impl Default for TypeCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for TypeCatalog {
    fn clone(&self) -> Self {
        TypeCatalog {
            id: NEXT_CATALOG_ID.fetch_add(1, Ordering::Relaxed),
            map: self.map.clone(),
        }
    }
}

impl TypeCatalog {
    pub fn new() -> Self {
        TypeCatalog {
            id: NEXT_CATALOG_ID.fetch_add(1, Ordering::Relaxed),
            map: BTreeMap::new(),
        }
    }

    /// Unique per catalog, used to scope cache keys
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Adds a type, replacing an earlier descriptor of the same name
    pub fn add(&mut self, descriptor: TypeDescriptor) -> &mut Self {
        if let Some(existing) = self.map.insert(descriptor.name.clone(), descriptor) {
            tracing::debug!("Replaced type descriptor of '{}'", existing.name);
        }
        self
    }

    pub fn with(mut self, descriptor: TypeDescriptor) -> Self {
        self.add(descriptor);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&TypeDescriptor> {
        self.map.get(name)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// The type itself followed by all of its ancestors and interfaces,
    /// breadth first and without duplicates.
    ///
    /// Unknown types only alias themselves.
    pub fn alias_types(&self, name: &str) -> Vec<TypeName> {
        let mut aliases = vec![name.to_string()];
        let mut seen: HashSet<&str> = HashSet::from([name]);
        let mut next = 0;

        while next < aliases.len() {
            let Some(descriptor) = self.map.get(aliases[next].as_str()) else {
                next += 1;
                continue;
            };
            for supertype in &descriptor.supertypes {
                if seen.insert(supertype.as_str()) {
                    aliases.push(supertype.clone());
                }
            }
            next += 1;
        }

        aliases
    }

    /// True when `child` is `parent` or inherits from it
    pub fn is_subtype(&self, child: &str, parent: &str) -> bool {
        child == parent || self.alias_types(child).iter().any(|alias| alias == parent)
    }

    /// Validate the catalog
    ///
    /// Reports unknown supertypes, constructor parameters requiring unknown
    /// types and constructors which statically require themselves.
    /// Returns a list of all issues.
    pub fn check(&self) -> Result<(), CatalogErrors> {
        let mut checked = HashSet::new();
        let mut errors = Vec::new();

        for descriptor in self.map.values() {
            for supertype in &descriptor.supertypes {
                if !self.map.contains_key(supertype) {
                    errors.push(CatalogError::UnknownSupertype {
                        supertype: supertype.clone(),
                        of: descriptor.name.clone(),
                    });
                }
            }
        }

        for descriptor in self.map.values() {
            let mut chain = Vec::new();
            check_recurse(self, &mut checked, &mut errors, &mut chain, descriptor);
        }

        if !errors.is_empty() {
            return Err(CatalogErrors { errors });
        }

        return Ok(());

        fn check_recurse<'a>(
            catalog: &'a TypeCatalog,
            checked: &mut HashSet<&'a str>,
            errors: &mut Vec<CatalogError>,
            chain: &mut Vec<TypeName>,
            descriptor: &'a TypeDescriptor,
        ) {
            if chain.contains(&descriptor.name) {
                let mut chain = chain.clone();
                chain.push(descriptor.name.clone());
                errors.push(CatalogError::CircularConstructor { chain });
                return;
            }

            if !checked.insert(descriptor.name.as_str()) {
                return;
            }

            let Some(constructor) = &descriptor.constructor else {
                return;
            };

            chain.push(descriptor.name.clone());

            for param in constructor.parameters() {
                if param.config_key.is_some() {
                    continue;
                }
                for tag in &param.types {
                    let TypeTag::Object(required) = tag else {
                        continue;
                    };
                    match catalog.map.get(required) {
                        Some(next) => check_recurse(catalog, checked, errors, chain, next),
                        None if !param.optional => errors.push(CatalogError::MissingDependency {
                            dependency: required.clone(),
                            required_by: descriptor.name.clone(),
                        }),
                        None => {}
                    }
                }
            }

            chain.pop();
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CatalogError {
    #[error("'{supertype}' is declared as supertype of '{of}' but is unknown")]
    UnknownSupertype { supertype: TypeName, of: TypeName },
    #[error("'{required_by}' needs '{dependency}' but it is unknown")]
    MissingDependency {
        dependency: TypeName,
        required_by: TypeName,
    },
    #[error("Constructors require each other through {chain:?}")]
    CircularConstructor { chain: Vec<TypeName> },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub struct CatalogErrors {
    pub errors: Vec<CatalogError>,
}
impl std::fmt::Display for CatalogErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut display = Vec::new();
        display.push("The type catalog had one or more errors:".to_string());
        for error in &self.errors {
            display.push(format!("- {}", error));
        }
        f.write_str(&display.join("\n"))
    }
}

use std::path::PathBuf;

use thiserror::Error;

use crate::{
    catalog::CatalogErrors,
    placeholder::TypeTag,
    types::{DynError, TypeName},
};

/// Errors when trying to get something out of the [crate::container::Container]
#[derive(Error, Debug)]
pub enum ContainerError {
    /// Nothing is registered for the type in this category
    #[error("'{type_name}' is not registered in category '{category}'")]
    NotFound {
        type_name: TypeName,
        category: String,
    },
    /// The type is not part of the catalog, so it can't be registered or built
    #[error("'{0}' is not a known type")]
    UnknownType(TypeName),
    /// Built in services can not be replaced
    #[error("'{0}' is a built in service and can not be registered")]
    Reserved(TypeName),
    /// A type ended up requiring itself while being built
    #[error("Circular dependency while building '{type_name}': {}", .chain.join(" -> "))]
    CircularDependency {
        type_name: TypeName,
        chain: Vec<TypeName>,
    },
    /// Building the type failed, it stays unbuilt and may be retried
    #[error("Failed to construct '{type_name}'")]
    ConstructionFailed {
        type_name: TypeName,
        #[source]
        source: Box<ResolveError>,
    },
    #[error("Failed to downcast, required: '{required_type}' actual: '{actual_type}'")]
    DowncastFailed {
        required_type: &'static str,
        actual_type: &'static str,
    },
    /// The stored instance does not belong to the registered concrete type
    #[error("'{requested}' in category '{category}' holds a '{actual}' but '{expected}' is registered")]
    Inconsistent {
        requested: TypeName,
        category: String,
        expected: TypeName,
        actual: TypeName,
    },
}

/// Errors of the parameter resolver, one type for every public entry point
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error(transparent)]
    Container(#[from] ContainerError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    /// A declared parameter can not be turned into a placeholder
    #[error("Parameter '{param}' of '{callable}' is invalid: {reason}")]
    Signature {
        callable: String,
        param: String,
        reason: String,
    },
    /// The type has no constructor
    #[error("'{0}' can not be instantiated")]
    NotInstantiable(TypeName),
    /// The constructor returned something else than an instance of its type
    #[error("Constructor of '{type_name}' returned a {returned}")]
    NotAnInstance {
        type_name: TypeName,
        returned: &'static str,
    },
    #[error("Failed to read '{}'", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("'{}' is not a file", .0.display())]
    NotAFile(PathBuf),
    /// Invoking a callable failed
    #[error("Call to '{callable}' failed")]
    Call {
        callable: String,
        #[source]
        source: DynError,
    },
    /// Running an included file failed, `output` holds what was emitted until then
    #[error("Execution of '{}' failed", .path.display())]
    Execution {
        path: PathBuf,
        #[source]
        source: DynError,
        output: String,
    },
}

/// Errors when resolving configuration values
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Configuration key '{0}' is missing")]
    Missing(String),
    #[error("Configuration key '{key}' is not a valid {expected}")]
    WrongType { key: String, expected: &'static str },
    #[error("Configuration key '{key}' matches none of the types {}", join_tags(.candidates))]
    NoCandidateMatched {
        key: String,
        candidates: Vec<TypeTag>,
    },
    #[error("Invalid configuration document: {0}")]
    Document(String),
}

/// Errors while turning a metadata block into placeholders
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MetadataError {
    #[error("Unable to resolve type '{token}' of '${variable}'")]
    UnresolvedType { token: String, variable: String },
    #[error("'${variable}' declares the union '{}' but objects are injected by a single type", .types.join("|"))]
    UnionNotAllowed {
        variable: String,
        types: Vec<String>,
    },
    #[error("'${variable}' has the scalar type '{token}' but no @config binding")]
    ScalarWithoutConfig { token: String, variable: String },
    #[error("'${0}' has no type")]
    MissingType(String),
}

/// Errors when building a container from a [crate::builder::ContainerBuilder]
#[derive(Error, Debug)]
pub enum BuildError {
    /// There are issues with the type catalog
    #[error(transparent)]
    Catalog(#[from] CatalogErrors),
    /// An initial registration was rejected
    #[error(transparent)]
    Container(#[from] ContainerError),
}

/// Errors of the [crate::scope::ScopeStack]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScopeError {
    #[error("The root scope can not be left")]
    RootScope,
}

fn join_tags(tags: &[TypeTag]) -> String {
    tags.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("|")
}

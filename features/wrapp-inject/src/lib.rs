//! Runtime dependency resolution.
//!
//! A [Container] maps type names to lazily built singletons, building them
//! through constructors declared in a [TypeCatalog]. Parameters are resolved
//! from their declared signature: objects come from the container,
//! configuration bound parameters from the [ConfigStore]. Included files
//! declare their parameters in a metadata block of their header instead.

pub mod builder;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod container;
pub mod errors;
pub mod header;
mod lexer;
pub mod metadata;
pub mod placeholder;
pub mod resolver;
pub mod scope;
pub mod script;
pub mod signature;
pub mod types;

pub use builder::ContainerBuilder;
pub use cache::{CacheBackend, MemoryCache, NoCache};
pub use catalog::{TypeCatalog, TypeDescriptor};
pub use config::{ConfigStore, MemoryConfig};
pub use container::Container;
pub use errors::{BuildError, ConfigError, ContainerError, MetadataError, ResolveError, ScopeError};
pub use header::{parse_header, Delimiters, ParsedHeader};
pub use metadata::parse_metadata;
pub use placeholder::{ConfigPlaceholder, ObjectPlaceholder, Placeholder, Placeholders, TypeTag};
pub use resolver::{ParameterResolver, ResolverOptions};
pub use scope::ScopeStack;
pub use script::{EchoEngine, Script, ScriptEngine};
pub use signature::{Arguments, Callable, ParamSpec, SignatureProvider};
pub use types::{Injectable, Instance, TypeName, Value, DEFAULT_CATEGORY};

use std::{fmt, sync::Arc};

use indexmap::IndexMap;

use crate::{
    placeholder::TypeTag,
    types::{normalize_type_name, DynError, Injectable, Instance, Value},
};

/// A declared parameter of a callable
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSpec {
    pub name: String,
    /// Declared type, more than one for unions
    pub types: Vec<TypeTag>,
    /// Set when the parameter is bound to a configuration key
    pub config_key: Option<String>,
    /// Category an object parameter is taken from
    pub category: Option<String>,
    pub optional: bool,
    pub default: Option<Value>,
    pub nullable: bool,
}

impl ParamSpec {
    /// An object parameter injected from the container
    pub fn object(name: impl Into<String>, type_name: impl AsRef<str>) -> Self {
        ParamSpec {
            name: name.into(),
            types: vec![TypeTag::object(type_name)],
            config_key: None,
            category: None,
            optional: false,
            default: None,
            nullable: false,
        }
    }

    /// A parameter bound to a configuration key
    pub fn config(
        name: impl Into<String>,
        key: impl Into<String>,
        types: impl IntoIterator<Item = TypeTag>,
    ) -> Self {
        ParamSpec {
            name: name.into(),
            types: types.into_iter().collect(),
            config_key: Some(key.into()),
            category: None,
            optional: false,
            default: None,
            nullable: false,
        }
    }

    pub fn in_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.optional = true;
        self.default = Some(default.into());
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// Describes the parameters of something that can be invoked
pub trait SignatureProvider {
    /// Stable identity used to cache the derived placeholders,
    /// `None` for anonymous callables which are never cached
    fn identity(&self) -> Option<String>;

    fn parameters(&self) -> Vec<ParamSpec>;
}

type Body = Arc<dyn Fn(&Arguments) -> Result<Value, DynError> + Send + Sync>;

/// A function together with its declared signature
#[derive(Clone)]
pub struct Callable {
    identity: Option<String>,
    params: Vec<ParamSpec>,
    body: Body,
}

impl Callable {
    pub fn new<F>(identity: impl Into<String>, params: Vec<ParamSpec>, body: F) -> Self
    where
        F: Fn(&Arguments) -> Result<Value, DynError> + Send + Sync + 'static,
    {
        Callable {
            identity: Some(identity.into()),
            params,
            body: Arc::new(body),
        }
    }

    /// A callable which has no stable identity
    pub fn anonymous<F>(params: Vec<ParamSpec>, body: F) -> Self
    where
        F: Fn(&Arguments) -> Result<Value, DynError> + Send + Sync + 'static,
    {
        Callable {
            identity: None,
            params,
            body: Arc::new(body),
        }
    }

    /// Constructor producing instances which are deep copied into cloned scopes
    pub fn constructor<T, F>(type_name: impl AsRef<str>, params: Vec<ParamSpec>, build: F) -> Self
    where
        T: Injectable + Clone,
        F: Fn(&Arguments) -> Result<T, DynError> + Send + Sync + 'static,
    {
        let type_name = normalize_type_name(type_name.as_ref());
        let identity = format!("{type_name}::new");
        Callable::new(identity, params, move |args| {
            Ok(Value::Object(Instance::cloneable(&type_name, build(args)?)))
        })
    }

    /// Constructor producing instances which cloned scopes share by reference
    pub fn shared_constructor<T, F>(
        type_name: impl AsRef<str>,
        params: Vec<ParamSpec>,
        build: F,
    ) -> Self
    where
        T: Injectable,
        F: Fn(&Arguments) -> Result<T, DynError> + Send + Sync + 'static,
    {
        let type_name = normalize_type_name(type_name.as_ref());
        let identity = format!("{type_name}::new");
        Callable::new(identity, params, move |args| {
            Ok(Value::Object(Instance::new(&type_name, build(args)?)))
        })
    }

    pub fn invoke(&self, args: &Arguments) -> Result<Value, DynError> {
        (self.body)(args)
    }

    /// Name used in error messages
    pub fn display_name(&self) -> &str {
        self.identity.as_deref().unwrap_or("{closure}")
    }
}

impl SignatureProvider for Callable {
    fn identity(&self) -> Option<String> {
        self.identity.clone()
    }

    fn parameters(&self) -> Vec<ParamSpec> {
        self.params.clone()
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callable")
            .field("identity", &self.identity)
            .field("params", &self.params)
            .finish()
    }
}

/// Resolved values by parameter name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments(IndexMap<String, Value>);

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn value(&self, name: &str) -> Result<&Value, DynError> {
        self.get(name)
            .ok_or_else(|| format!("argument '{name}' was not resolved").into())
    }

    pub fn object<T: Injectable>(&self, name: &str) -> Result<Arc<T>, DynError> {
        match self.value(name)? {
            Value::Object(instance) => instance.downcast::<T>().map_err(|actual| {
                format!(
                    "argument '{name}' is a '{actual}', expected '{}'",
                    std::any::type_name::<T>()
                )
                .into()
            }),
            other => Err(format!("argument '{name}' is a {}, expected an object", other.kind()).into()),
        }
    }

    /// Optional object, `None` when the argument resolved to null
    pub fn maybe_object<T: Injectable>(&self, name: &str) -> Result<Option<Arc<T>>, DynError> {
        match self.value(name)? {
            Value::Null => Ok(None),
            _ => self.object(name).map(Some),
        }
    }

    pub fn string(&self, name: &str) -> Result<String, DynError> {
        self.typed(name, "string", Value::coerce_string)
    }

    pub fn int(&self, name: &str) -> Result<i64, DynError> {
        self.typed(name, "int", Value::coerce_int)
    }

    pub fn float(&self, name: &str) -> Result<f64, DynError> {
        self.typed(name, "float", Value::coerce_float)
    }

    pub fn bool(&self, name: &str) -> Result<bool, DynError> {
        self.typed(name, "bool", Value::coerce_bool)
    }

    fn typed<T>(
        &self,
        name: &str,
        expected: &str,
        coerce: impl Fn(&Value) -> Option<T>,
    ) -> Result<T, DynError> {
        let value = self.value(name)?;
        coerce(value)
            .ok_or_else(|| format!("argument '{name}' is a {}, expected {expected}", value.kind()).into())
    }
}

impl FromIterator<(String, Value)> for Arguments {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Arguments(iter.into_iter().collect())
    }
}

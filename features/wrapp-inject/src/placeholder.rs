use std::fmt;

use indexmap::IndexMap;

use crate::types::{normalize_type_name, TypeName, Value, DEFAULT_CATEGORY};

/// A type a configuration value may be resolved as
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeTag {
    String,
    Int,
    Float,
    Bool,
    Array,
    False,
    Object(TypeName),
}

impl TypeTag {
    /// Looks up the scalar vocabulary
    pub fn scalar(token: &str) -> Option<TypeTag> {
        match token {
            "string" => Some(TypeTag::String),
            "int" => Some(TypeTag::Int),
            "float" => Some(TypeTag::Float),
            "bool" => Some(TypeTag::Bool),
            "array" => Some(TypeTag::Array),
            "false" => Some(TypeTag::False),
            _ => None,
        }
    }

    pub fn object(type_name: impl AsRef<str>) -> TypeTag {
        TypeTag::Object(normalize_type_name(type_name.as_ref()))
    }

    pub fn is_scalar(&self) -> bool {
        !matches!(self, TypeTag::Object(_))
    }

    /// Order in which candidates are tried, object types first
    pub(crate) fn priority(&self) -> u8 {
        match self {
            TypeTag::Object(_) => 0,
            TypeTag::String => 1,
            TypeTag::Int => 2,
            TypeTag::Float => 3,
            TypeTag::Bool => 4,
            TypeTag::Array => 5,
            TypeTag::False => 6,
        }
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TypeTag::String => "string",
            TypeTag::Int => "int",
            TypeTag::Float => "float",
            TypeTag::Bool => "bool",
            TypeTag::Array => "array",
            TypeTag::False => "false",
            TypeTag::Object(name) => name,
        })
    }
}

/// Inject the container's instance of `type_name` within `category`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectPlaceholder {
    pub type_name: TypeName,
    pub category: String,
}

impl ObjectPlaceholder {
    pub fn new(type_name: impl AsRef<str>) -> Self {
        ObjectPlaceholder {
            type_name: normalize_type_name(type_name.as_ref()),
            category: DEFAULT_CATEGORY.to_string(),
        }
    }

    pub fn in_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }
}

/// Inject the configuration value stored under `key`
///
/// `category` is the one the declaration was made in. Configuration is shared
/// by all categories, so it does not take part in resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigPlaceholder {
    pub key: String,
    pub category: String,
    pub candidate_types: Vec<TypeTag>,
    pub optional: bool,
    pub default: Option<Value>,
    pub nullable: bool,
}

impl ConfigPlaceholder {
    /// A required, non nullable value
    pub fn new(key: impl Into<String>, candidate_types: Vec<TypeTag>) -> Self {
        ConfigPlaceholder {
            key: key.into(),
            category: DEFAULT_CATEGORY.to_string(),
            candidate_types,
            optional: false,
            default: None,
            nullable: false,
        }
    }

    pub fn in_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
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

/// An unresolved parameter, produced alike by signatures and metadata blocks
#[derive(Debug, Clone, PartialEq)]
pub enum Placeholder {
    Object(ObjectPlaceholder),
    Config(ConfigPlaceholder),
}

impl From<ObjectPlaceholder> for Placeholder {
    fn from(value: ObjectPlaceholder) -> Self {
        Placeholder::Object(value)
    }
}
impl From<ConfigPlaceholder> for Placeholder {
    fn from(value: ConfigPlaceholder) -> Self {
        Placeholder::Config(value)
    }
}

/// Parameter name to placeholder, in declaration order
pub type Placeholders = IndexMap<String, Placeholder>;

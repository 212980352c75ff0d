use std::{
    any::Any,
    collections::BTreeMap,
    fmt,
    sync::Arc,
};

/// All errors crossing a user supplied closure
pub type DynError = Box<dyn std::error::Error + Send + Sync>;

/// Anything stored in the container may be shared between scopes,
/// so it needs to be Send + Sync + 'static
pub trait Injectable: Send + Sync + 'static {}
impl<T: Send + Sync + 'static> Injectable for T {}

/// Dot qualified name of a type known to the [crate::catalog::TypeCatalog], e.g. `app.mail.Mailer`
pub type TypeName = String;

/// Category used when none is given
pub const DEFAULT_CATEGORY: &str = "default";

/// Normalizes `\`, `/` and `.` separated paths into the dot form and trims
/// leading/trailing separators.
pub fn normalize_type_name(raw: &str) -> TypeName {
    raw.trim()
        .split(&['.', '\\', '/'][..])
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join(".")
}

type AnyArc = Arc<dyn Any + Send + Sync + 'static>;
type CloneFn = fn(&(dyn Any + Send + Sync)) -> Option<AnyArc>;

/// A built object together with the catalog type it was built as
#[derive(Clone)]
pub struct Instance {
    pub type_name: TypeName,
    pub rust_type: &'static str,
    pub instance: AnyArc,
    cloner: Option<CloneFn>,
}

impl Instance {
    /// Wraps a value which is shared by reference when a scope is cloned
    pub fn new<T: Injectable>(type_name: impl AsRef<str>, instance: T) -> Self {
        Instance {
            type_name: normalize_type_name(type_name.as_ref()),
            rust_type: std::any::type_name::<T>(),
            instance: Arc::new(instance),
            cloner: None,
        }
    }

    /// Wraps a value which gets deep copied when a scope is cloned
    pub fn cloneable<T: Injectable + Clone>(type_name: impl AsRef<str>, instance: T) -> Self {
        Instance {
            cloner: Some(clone_erased::<T>),
            ..Instance::new(type_name, instance)
        }
    }

    pub fn downcast<T: Injectable>(&self) -> Result<Arc<T>, &'static str> {
        match Arc::downcast::<T>(self.instance.clone()) {
            Ok(downcasted) => Ok(downcasted),
            Err(_) => Err(self.rust_type),
        }
    }

    /// Address of the shared allocation, equal for all clones of this handle
    pub fn identity(&self) -> usize {
        Arc::as_ptr(&self.instance) as *const () as usize
    }

    pub fn ptr_eq(&self, other: &Instance) -> bool {
        self.identity() == other.identity()
    }

    /// Copies the underlying value when it was registered as cloneable,
    /// otherwise hands out another reference to the same value.
    pub fn deep_clone(&self) -> Instance {
        let copied = self
            .cloner
            .and_then(|copy| copy(self.instance.as_ref()));

        match copied {
            Some(instance) => Instance {
                instance,
                ..self.clone()
            },
            None => self.clone(),
        }
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("type_name", &self.type_name)
            .field("rust_type", &self.rust_type)
            .finish()
    }
}

fn clone_erased<T: Injectable + Clone>(value: &(dyn Any + Send + Sync)) -> Option<AnyArc> {
    value
        .downcast_ref::<T>()
        .map(|value| Arc::new(value.clone()) as AnyArc)
}

/// Dynamic value passed around as configuration, argument or script binding
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Object(Instance),
}

impl Value {
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Array(_) | Value::Map(_) => "array",
            Value::Object(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Instance> {
        match self {
            Value::Object(instance) => Some(instance),
            _ => None,
        }
    }

    /// Strings and numbers
    pub fn coerce_string(&self) -> Option<String> {
        match self {
            Value::String(value) => Some(value.clone()),
            Value::Int(value) => Some(value.to_string()),
            Value::Float(value) => Some(value.to_string()),
            _ => None,
        }
    }

    /// Integers, integral floats and numeric strings
    pub fn coerce_int(&self) -> Option<i64> {
        match self {
            Value::Int(value) => Some(*value),
            Value::Float(value)
                if value.fract() == 0.0 && *value >= i64::MIN as f64 && *value <= i64::MAX as f64 =>
            {
                Some(*value as i64)
            }
            Value::String(value) => value.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn coerce_float(&self) -> Option<f64> {
        match self {
            Value::Float(value) => Some(*value),
            Value::Int(value) => Some(*value as f64),
            Value::String(value) => value.trim().parse().ok(),
            _ => None,
        }
    }

    /// Booleans, `0`/`1` and the usual switch words
    pub fn coerce_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            Value::Int(0) => Some(false),
            Value::Int(1) => Some(true),
            Value::String(value) => match value.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Some(true),
                "false" | "0" | "no" | "off" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Int(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value}"),
            Value::String(value) => f.write_str(value),
            Value::Array(items) => {
                f.write_str("[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::Map(entries) => {
                f.write_str("{")?;
                for (index, (key, item)) in entries.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {item}")?;
                }
                f.write_str("}")
            }
            Value::Object(instance) => write!(f, "<{}>", instance.type_name),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}
impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}
impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}
impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}
impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}
impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}
impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::Array(value)
    }
}
impl From<Instance> for Value {
    fn from(value: Instance) -> Self {
        Value::Object(value)
    }
}
impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(value) => Value::Bool(value),
            serde_json::Value::Number(number) => match number.as_i64() {
                Some(value) => Value::Int(value),
                None => Value::Float(number.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(value) => Value::String(value),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(entries) => Value::Map(
                entries
                    .into_iter()
                    .map(|(key, value)| (key, Value::from(value)))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct Counter(u32);

    #[test]
    fn normalizes_separators() {
        assert_eq!(normalize_type_name("\\App\\Mail\\Mailer"), "App.Mail.Mailer");
        assert_eq!(normalize_type_name("app/mail/"), "app.mail");
        assert_eq!(normalize_type_name(".Foo."), "Foo");
    }

    #[test]
    fn cloneable_instances_are_copied() {
        let original = Instance::cloneable("app.Counter", Counter(3));
        let copy = original.deep_clone();
        assert!(!copy.ptr_eq(&original));
        assert_eq!(copy.downcast::<Counter>().unwrap().0, 3);

        let shared = Instance::new("app.Counter", Counter(4));
        assert!(shared.deep_clone().ptr_eq(&shared));
    }

    #[test]
    fn downcast_reports_actual_type() {
        let instance = Instance::new("app.Counter", Counter(1));
        assert!(instance.rust_type.ends_with("Counter"));
        assert!(instance.downcast::<String>().unwrap_err().ends_with("Counter"));
    }

    #[test]
    fn lenient_coercions() {
        assert_eq!(Value::from("42").coerce_int(), Some(42));
        assert_eq!(Value::Float(2.0).coerce_int(), Some(2));
        assert_eq!(Value::Float(2.5).coerce_int(), None);
        assert_eq!(Value::Int(7).coerce_string().as_deref(), Some("7"));
        assert_eq!(Value::from("off").coerce_bool(), Some(false));
        assert_eq!(Value::Int(2).coerce_bool(), None);
        assert_eq!(Value::from(" 1.5 ").coerce_float(), Some(1.5));
    }

    #[test]
    fn converts_json() {
        let value = Value::from(serde_json::json!({"a": [1, 2.5, "x", null]}));
        let Value::Map(entries) = value else {
            panic!("expected map");
        };
        assert_eq!(
            entries["a"],
            Value::Array(vec![
                Value::Int(1),
                Value::Float(2.5),
                Value::from("x"),
                Value::Null
            ])
        );
    }
}

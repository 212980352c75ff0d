use std::{collections::BTreeMap, sync::Arc};

use crate::{errors::ConfigError, types::Value};

/// Read access to configuration values by key
///
/// Typed getters coerce leniently, see [Value::coerce_int] and friends.
pub trait ConfigStore: Send + Sync {
    fn has(&self, key: &str) -> bool;

    fn get(&self, key: &str) -> Option<Value>;

    /// Independent copy, used when a scope is cloned
    fn clone_store(&self) -> Arc<dyn ConfigStore>;

    fn get_string(&self, key: &str) -> Result<String, ConfigError> {
        typed(self.get(key), key, "string", Value::coerce_string)
    }

    fn get_int(&self, key: &str) -> Result<i64, ConfigError> {
        typed(self.get(key), key, "int", Value::coerce_int)
    }

    fn get_float(&self, key: &str) -> Result<f64, ConfigError> {
        typed(self.get(key), key, "float", Value::coerce_float)
    }

    fn get_bool(&self, key: &str) -> Result<bool, ConfigError> {
        typed(self.get(key), key, "bool", Value::coerce_bool)
    }

    /// The value as stored, used for arrays
    fn get_raw(&self, key: &str) -> Result<Value, ConfigError> {
        self.get(key).ok_or_else(|| ConfigError::Missing(key.to_string()))
    }
}

fn typed<T>(
    value: Option<Value>,
    key: &str,
    expected: &'static str,
    coerce: impl Fn(&Value) -> Option<T>,
) -> Result<T, ConfigError> {
    let value = value.ok_or_else(|| ConfigError::Missing(key.to_string()))?;
    coerce(&value).ok_or_else(|| ConfigError::WrongType {
        key: key.to_string(),
        expected,
    })
}

/// Configuration held in memory
///
/// Nested maps loaded from JSON are reachable both as a whole and through
/// their dotted paths, `{"db": {"port": 1}}` answers `db` and `db.port`.
#[derive(Debug, Clone, Default)]
pub struct MemoryConfig {
    values: BTreeMap<String, Value>,
}

impl MemoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    /// Loads a JSON object, the document root must be an object
    pub fn from_json(document: serde_json::Value) -> Result<Self, ConfigError> {
        let serde_json::Value::Object(root) = document else {
            return Err(ConfigError::Document(
                "the root of a configuration document must be an object".to_string(),
            ));
        };

        let mut config = MemoryConfig::new();
        for (key, value) in root {
            config.insert_flattened(key, Value::from(value));
        }
        Ok(config)
    }

    pub fn from_json_str(document: &str) -> Result<Self, ConfigError> {
        let document =
            serde_json::from_str(document).map_err(|e| ConfigError::Document(e.to_string()))?;
        Self::from_json(document)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn insert_flattened(&mut self, key: String, value: Value) {
        if let Value::Map(entries) = &value {
            for (child, nested) in entries {
                self.insert_flattened(format!("{key}.{child}"), nested.clone());
            }
        }
        self.values.insert(key, value);
    }
}

impl ConfigStore for MemoryConfig {
    fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn clone_store(&self) -> Arc<dyn ConfigStore> {
        Arc::new(self.clone())
    }
}

use crate::{
    config::ConfigStore,
    errors::ConfigError,
    placeholder::{ConfigPlaceholder, TypeTag},
    resolver::ParameterResolver,
    types::Value,
};

impl ParameterResolver {
    /// Resolves a configuration placeholder to a value
    ///
    /// Candidates are tried objects first, then string, int, float, bool,
    /// array and false. The first candidate the value already is, or can be
    /// coerced to through the typed getters of the store, wins.
    pub fn resolve_config(
        &self,
        config: &dyn ConfigStore,
        placeholder: &ConfigPlaceholder,
    ) -> Result<Value, ConfigError> {
        let key = placeholder.key.as_str();
        if !config.has(key) {
            if placeholder.optional {
                return Ok(placeholder.default.clone().unwrap_or(Value::Null));
            }
            return Err(ConfigError::Missing(key.to_string()));
        }

        let value = config.get_raw(key)?;
        if value.is_null() && placeholder.nullable {
            return Ok(Value::Null);
        }

        let mut candidates: Vec<&TypeTag> = placeholder.candidate_types.iter().collect();
        candidates.sort_by_key(|tag| tag.priority());

        for tag in candidates {
            if self.matches_exactly(&value, tag) {
                return Ok(value);
            }
            if let Some(coerced) = coerce(config, key, tag) {
                tracing::trace!("Coerced configuration '{key}' to {tag}");
                return Ok(coerced);
            }
        }

        Err(ConfigError::NoCandidateMatched {
            key: key.to_string(),
            candidates: placeholder.candidate_types.clone(),
        })
    }

    fn matches_exactly(&self, value: &Value, tag: &TypeTag) -> bool {
        match (tag, value) {
            (TypeTag::Object(type_name), Value::Object(instance)) => {
                self.catalog().is_subtype(&instance.type_name, type_name)
            }
            (TypeTag::String, Value::String(_))
            | (TypeTag::Int, Value::Int(_))
            | (TypeTag::Float, Value::Float(_))
            | (TypeTag::Bool, Value::Bool(_))
            | (TypeTag::Array, Value::Array(_) | Value::Map(_))
            | (TypeTag::False, Value::Bool(false)) => true,
            _ => false,
        }
    }
}

fn coerce(config: &dyn ConfigStore, key: &str, tag: &TypeTag) -> Option<Value> {
    match tag {
        TypeTag::Object(_) | TypeTag::Array => None,
        TypeTag::String => config.get_string(key).ok().map(Value::String),
        TypeTag::Int => config.get_int(key).ok().map(Value::Int),
        TypeTag::Float => config.get_float(key).ok().map(Value::Float),
        TypeTag::Bool => config.get_bool(key).ok().map(Value::Bool),
        TypeTag::False => match config.get_bool(key) {
            Ok(false) => Some(Value::Bool(false)),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        catalog::{TypeCatalog, TypeDescriptor},
        config::MemoryConfig,
        resolver::ResolverOptions,
        script::EchoEngine,
        types::Instance,
    };

    #[derive(Clone)]
    struct Dsn;

    fn resolver() -> ParameterResolver {
        let catalog = TypeCatalog::new()
            .with(TypeDescriptor::interface("db.Source"))
            .with(TypeDescriptor::interface("db.Dsn").extends("db.Source"));
        ParameterResolver::new(
            Arc::new(catalog),
            Arc::new(EchoEngine::new()),
            ResolverOptions::default(),
        )
    }

    fn resolve(config: &MemoryConfig, placeholder: ConfigPlaceholder) -> Result<Value, ConfigError> {
        resolver().resolve_config(config, &placeholder)
    }

    #[test]
    fn missing_keys_use_defaults_when_optional() {
        let config = MemoryConfig::new();
        assert_eq!(
            resolve(&config, ConfigPlaceholder::new("a", vec![TypeTag::Int]).with_default(5)),
            Ok(Value::Int(5))
        );
        assert_eq!(
            resolve(&config, ConfigPlaceholder::new("a", vec![TypeTag::Int])),
            Err(ConfigError::Missing("a".into()))
        );
    }

    #[test]
    fn null_needs_nullable() {
        let config = MemoryConfig::new().with("a", Value::Null);
        assert_eq!(
            resolve(&config, ConfigPlaceholder::new("a", vec![TypeTag::String]).nullable()),
            Ok(Value::Null)
        );
        assert!(matches!(
            resolve(&config, ConfigPlaceholder::new("a", vec![TypeTag::String])),
            Err(ConfigError::NoCandidateMatched { .. })
        ));
    }

    #[test]
    fn object_candidates_only_match_instances() {
        let object_or_string = vec![TypeTag::object("db.Source"), TypeTag::String];

        let config = MemoryConfig::new().with("dsn", "mysql://localhost");
        assert_eq!(
            resolve(&config, ConfigPlaceholder::new("dsn", object_or_string.clone())),
            Ok(Value::from("mysql://localhost"))
        );

        let instance = Instance::cloneable("db.Dsn", Dsn);
        let config = MemoryConfig::new().with("dsn", instance.clone());
        assert_eq!(
            resolve(&config, ConfigPlaceholder::new("dsn", object_or_string)),
            Ok(Value::Object(instance))
        );
    }

    #[test]
    fn candidates_are_tried_in_priority_order() {
        let config = MemoryConfig::new().with("port", 8080).with("flag", "yes");
        assert_eq!(
            resolve(&config, ConfigPlaceholder::new("port", vec![TypeTag::Int, TypeTag::String])),
            Ok(Value::from("8080"))
        );
        assert_eq!(
            resolve(&config, ConfigPlaceholder::new("port", vec![TypeTag::Int, TypeTag::Bool])),
            Ok(Value::Int(8080))
        );
        assert_eq!(
            resolve(&config, ConfigPlaceholder::new("flag", vec![TypeTag::Int, TypeTag::Bool])),
            Ok(Value::Bool(true))
        );
        assert_eq!(
            resolve(&config, ConfigPlaceholder::new("port", vec![TypeTag::Float])),
            Ok(Value::Float(8080.0))
        );
    }

    #[test]
    fn reports_key_and_candidates() {
        let config = MemoryConfig::new().with("name", "abc");
        let error = resolve(
            &config,
            ConfigPlaceholder::new("name", vec![TypeTag::Int, TypeTag::False]),
        )
        .unwrap_err();
        assert_eq!(
            error.to_string(),
            "Configuration key 'name' matches none of the types int|false"
        );
    }
}

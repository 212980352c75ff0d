use std::{convert::Infallible, path::Path, sync::Arc};

use crate::{
    container::Container,
    errors::ResolveError,
    header::{content_hash, parse_header, ParsedHeader},
    metadata::parse_metadata,
    placeholder::Placeholders,
    resolver::ParameterResolver,
    script::Script,
    types::Value,
};

impl ParameterResolver {
    /// Runs the file at `path` with its declared dependencies bound by name
    ///
    /// Returns the explicit return value of the file. When there is none, or
    /// it is the integer `1`, the text emitted by the file is returned instead.
    pub fn include(&self, container: &mut Container, path: &Path) -> Result<Value, ResolveError> {
        let io_error = |source| ResolveError::Io {
            path: path.to_path_buf(),
            source,
        };
        if !std::fs::metadata(path).map_err(io_error)?.is_file() {
            return Err(ResolveError::NotAFile(path.to_path_buf()));
        }
        let source = std::fs::read_to_string(path).map_err(io_error)?;

        let placeholders = self.file_placeholders(container, &source)?;
        let bindings = self.resolve_arguments(container, &placeholders)?;
        tracing::debug!(
            "Including '{}' with {} bindings",
            path.display(),
            bindings.len()
        );

        let script = Script {
            path: path.to_path_buf(),
            source,
        };
        let mut output = String::new();
        match self.engine.execute(&script, &bindings, &mut output) {
            Ok(Some(Value::Int(1))) | Ok(None) => Ok(Value::String(output)),
            Ok(Some(value)) => Ok(value),
            Err(source) => Err(ResolveError::Execution {
                path: script.path,
                source,
                output,
            }),
        }
    }

    /// Placeholders declared by the header of `source`
    ///
    /// Both the header and the derived placeholders are cached by the hash
    /// of the content, editing a file invalidates them.
    pub fn file_placeholders(
        &self,
        container: &Container,
        source: &str,
    ) -> Result<Arc<Placeholders>, ResolveError> {
        let delimiters = &self.options.metadata_delimiters;
        let hash = content_hash(source, delimiters);
        let cache = container.cache();

        let header = match cache.get_or_compute(&format!("wrapp.header.{hash}"), None, || {
            Ok::<_, Infallible>(Arc::new(parse_header(source, delimiters)))
        }) {
            Ok(header) => header,
            Err(never) => match never {},
        };

        let key = format!("wrapp.metadata.{}.{hash}", self.catalog.id());
        cache.get_or_compute(&key, self.options.cache_ttl, || {
            self.metadata_placeholders(&header)
        })
    }

    fn metadata_placeholders(&self, header: &ParsedHeader) -> Result<Arc<Placeholders>, ResolveError> {
        let placeholders = parse_metadata(header, &self.catalog, &self.options.metadata_delimiters)?;
        Ok(Arc::new(placeholders))
    }
}

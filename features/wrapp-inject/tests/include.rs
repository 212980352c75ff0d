use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use tempfile::TempDir;
use wrapp_inject::{
    header::content_hash, Arguments, CacheBackend, Container, ContainerBuilder, Delimiters,
    MemoryCache, MemoryConfig, MetadataError, ResolveError, ResolverOptions, Script, ScriptEngine,
    TypeCatalog, TypeDescriptor, Value,
};
use wrapp_inject::types::DynError;

#[derive(Debug, Clone, Default)]
struct Baz;

fn catalog() -> TypeCatalog {
    TypeCatalog::new()
        .with(TypeDescriptor::default_class::<Baz>("Bar.Baz"))
        .with(TypeDescriptor::default_class::<Baz>("Bar.Other"))
}

fn container() -> Container {
    ContainerBuilder::new(catalog())
        .config(MemoryConfig::new().with("app.name", "wrapp"))
        .add_type("Bar.Baz")
        .add_type("Bar.Other")
        .build()
        .unwrap()
}

fn write(dir: &TempDir, name: &str, source: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, source).unwrap();
    path
}

#[test]
fn output_is_returned_without_explicit_value() {
    let dir = TempDir::new().unwrap();
    let mut container = container();

    let plain = write(&dir, "plain.php", "echo \"v\";");
    let sentinel = write(&dir, "sentinel.php", "echo \"v\"; return 1;");
    let explicit = write(&dir, "explicit.php", "echo \"v\"; return 'x';");

    assert_eq!(container.include(&plain).unwrap(), Value::from("v"));
    assert_eq!(container.include(&sentinel).unwrap(), Value::from("v"));
    assert_eq!(container.include(&explicit).unwrap(), Value::from("x"));
}

#[test]
fn header_declared_objects_are_bound() {
    let dir = TempDir::new().unwrap();
    let mut container = container();
    let path = write(
        &dir,
        "object.php",
        "namespace Foo; import Bar.Baz as Qux; /** Qux $x */ echo $x;",
    );

    assert_eq!(container.include(&path).unwrap(), Value::from("<Bar.Baz>"));
}

#[test]
fn header_declared_configuration_is_bound() {
    let dir = TempDir::new().unwrap();
    let mut container = container();
    let path = write(
        &dir,
        "config.php",
        "<?php\n/**\n * @config('app.name')\n * string $name\n */\n?>\nHello <?php echo $name . \"!\"; ?>",
    );

    assert_eq!(container.include(&path).unwrap(), Value::from("Hello wrapp!"));
}

#[test]
fn failures_keep_partial_output() {
    let dir = TempDir::new().unwrap();
    let mut container = container();
    let path = write(&dir, "broken.php", "echo 'partial'; throw 'broken';");

    let error = container.include(&path).unwrap_err();
    let ResolveError::Execution {
        path: failed,
        source,
        output,
    } = error
    else {
        panic!("expected an execution failure");
    };
    assert_eq!(failed, path);
    assert_eq!(output, "partial");
    assert_eq!(source.to_string(), "broken");
}

#[test]
fn only_files_can_be_included() {
    let dir = TempDir::new().unwrap();
    let mut container = container();

    assert!(matches!(
        container.include(dir.path().join("missing.php")),
        Err(ResolveError::Io { .. })
    ));
    assert!(matches!(
        container.include(dir.path()),
        Err(ResolveError::NotAFile(ref path)) if path == dir.path()
    ));
}

#[test]
fn unions_are_rejected_for_objects() {
    let dir = TempDir::new().unwrap();
    let mut container = container();
    let path = write(&dir, "union.php", "/** Bar.Baz|Bar.Other $x */ echo $x;");

    assert!(matches!(
        container.include(&path),
        Err(ResolveError::Metadata(MetadataError::UnionNotAllowed { ref variable, .. }))
            if variable == "x"
    ));
}

#[test]
fn parsed_headers_are_cached_by_content() {
    let dir = TempDir::new().unwrap();
    let cache = Arc::new(MemoryCache::new());
    let mut container = ContainerBuilder::new(catalog())
        .cache(cache.clone())
        .add_type("Bar.Baz")
        .build()
        .unwrap();
    let source = "/** Bar.Baz $x */ echo $x;";
    let path = write(&dir, "cached.php", source);

    container.include(&path).unwrap();
    let key = format!("wrapp.header.{}", content_hash(source, &Delimiters::default()));
    assert!(cache.get(&key).is_some());

    // Editing the file changes its hash, the old entry is not reused
    std::fs::write(&path, "echo 'edited';").unwrap();
    assert_eq!(container.include(&path).unwrap(), Value::from("edited"));
}

#[test]
fn custom_delimiters_apply_to_the_body() {
    let dir = TempDir::new().unwrap();
    let options = ResolverOptions {
        metadata_delimiters: Delimiters {
            open: "<!--".to_string(),
            close: "-->".to_string(),
        },
        ..ResolverOptions::default()
    };
    let mut container = ContainerBuilder::new(catalog())
        .options(options)
        .config(MemoryConfig::new().with("user.name", "ada"))
        .build()
        .unwrap();
    let path = write(
        &dir,
        "delimited.php",
        "<!--\n@config('user.name')\nstring $name\n-->\necho $name;",
    );

    assert_eq!(container.include(&path).unwrap(), Value::from("ada"));
}

struct Recorder;

impl ScriptEngine for Recorder {
    fn execute(
        &self,
        script: &Script,
        bindings: &Arguments,
        output: &mut String,
    ) -> Result<Option<Value>, DynError> {
        let name = script.path.file_name().map(Path::new).unwrap_or(Path::new(""));
        output.push_str(&format!("{}:{}", name.display(), bindings.len()));
        Ok(None)
    }
}

#[test]
fn custom_engines_run_included_files() {
    let dir = TempDir::new().unwrap();
    let mut container = ContainerBuilder::new(catalog())
        .engine(Recorder)
        .add_type("Bar.Baz")
        .build()
        .unwrap();
    let path = write(&dir, "custom.php", "/** Bar.Baz $x */");

    assert_eq!(container.include(&path).unwrap(), Value::from("custom.php:1"));
}

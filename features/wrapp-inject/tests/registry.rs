use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use wrapp_inject::{
    container::{CACHE_TYPE, CONFIG_TYPE, RESOLVER_TYPE},
    Callable, Container, ContainerBuilder, ContainerError, Instance, MemoryConfig, ParamSpec,
    ResolveError, TypeCatalog, TypeDescriptor, TypeTag, Value, DEFAULT_CATEGORY,
};

#[derive(Debug, Clone, Default)]
struct Mailer {
    sent: u32,
}

#[derive(Debug, Clone)]
struct Remote;

fn services() -> TypeCatalog {
    TypeCatalog::new()
        .with(TypeDescriptor::interface("app.Service"))
        .with(TypeDescriptor::interface("app.Sender"))
        .with(TypeDescriptor::default_class::<Mailer>("app.Base").extends("app.Service"))
        .with(
            TypeDescriptor::default_class::<Mailer>("app.Mailer")
                .extends("app.Base")
                .extends("app.Sender"),
        )
}

fn catalog() -> TypeCatalog {
    services()
        .with(TypeDescriptor::class(
            "cycle.A",
            vec![ParamSpec::object("b", "cycle.B")],
            |_| Ok(Remote),
        ))
        .with(TypeDescriptor::class(
            "cycle.B",
            vec![ParamSpec::object("a", "cycle.A")],
            |_| Ok(Remote),
        ))
}

fn container() -> Container {
    Container::new(catalog())
}

#[test]
fn get_returns_the_same_instance() {
    let mut container = container();
    container.register_type("app.Mailer", DEFAULT_CATEGORY).unwrap();

    let first = container.get("app.Mailer", DEFAULT_CATEGORY).unwrap();
    let second = container.get("app.Mailer", DEFAULT_CATEGORY).unwrap();
    assert!(first.ptr_eq(&second));
}

#[test]
fn instances_are_available_under_all_supertypes() {
    let mut container = container();
    let instance = Instance::cloneable("app.Mailer", Mailer { sent: 3 });
    container
        .register_instance(instance.clone(), DEFAULT_CATEGORY)
        .unwrap();

    for type_name in ["app.Mailer", "app.Base", "app.Service", "app.Sender"] {
        let resolved = container.get(type_name, DEFAULT_CATEGORY).unwrap();
        assert!(resolved.ptr_eq(&instance), "{type_name} resolved another instance");
    }
    assert_eq!(container.get_as::<Mailer>("app.Service").unwrap().sent, 3);
}

#[test]
fn categories_are_isolated() {
    let mut container = container();
    container.register_type("app.Mailer", "a").unwrap();

    assert!(container.has("app.Mailer", "a"));
    assert!(container.has("app.Service", "a"));
    assert!(!container.has("app.Mailer", "b"));
    assert!(matches!(
        container.get("app.Mailer", "b"),
        Err(ContainerError::NotFound { ref type_name, ref category })
            if type_name == "app.Mailer" && category == "b"
    ));
}

#[test]
fn builtins_are_always_present() {
    let mut container = container();
    for builtin in [RESOLVER_TYPE, CACHE_TYPE, CONFIG_TYPE] {
        assert!(container.has(builtin, "any"));
        assert!(container.get(builtin, "any").is_ok());
        assert!(matches!(
            container.register_type(builtin, DEFAULT_CATEGORY),
            Err(ContainerError::Reserved(_))
        ));
    }
}

#[test]
fn cycles_are_detected() {
    let mut container = container();
    container.register_type("cycle.A", DEFAULT_CATEGORY).unwrap();
    container.register_type("cycle.B", DEFAULT_CATEGORY).unwrap();

    for _ in 0..2 {
        let error = container.get("cycle.A", DEFAULT_CATEGORY).unwrap_err();
        let ContainerError::CircularDependency { type_name, chain } = error else {
            panic!("expected a circular dependency");
        };
        assert_eq!(type_name, "cycle.A");
        assert_eq!(chain, vec!["cycle.A", "cycle.B", "cycle.A"]);
    }

    // Unrelated builds are not affected by the failed ones
    container.register_type("app.Mailer", DEFAULT_CATEGORY).unwrap();
    assert!(container.get("app.Mailer", DEFAULT_CATEGORY).is_ok());
}

#[test]
fn cycles_across_categories_name_every_type() {
    let catalog = TypeCatalog::new()
        .with(TypeDescriptor::class(
            "c.A",
            vec![ParamSpec::object("b", "c.B")],
            |_| Ok(Remote),
        ))
        .with(TypeDescriptor::class(
            "c.B",
            vec![ParamSpec::object("a", "c.A").in_category("x")],
            |_| Ok(Remote),
        ));
    let mut container = Container::new(catalog);
    container.register_type("c.A", "x").unwrap();
    container.register_type("c.B", DEFAULT_CATEGORY).unwrap();

    let error = container.get("c.A", "x").unwrap_err();
    let ContainerError::CircularDependency { chain, .. } = error else {
        panic!("expected a circular dependency");
    };
    assert_eq!(chain, vec!["c.A", "c.B", "c.A"]);
}

#[test]
fn cloned_scopes_are_independent() {
    let mut original = container();
    let cloneable = Instance::cloneable("app.Mailer", Mailer { sent: 1 });
    let shared = Instance::new("app.Base", Mailer { sent: 2 });
    original.register_instance(cloneable.clone(), "a").unwrap();
    original.register_instance(cloneable.clone(), "b").unwrap();
    original.register_instance(shared.clone(), "c").unwrap();

    let mut scope = original.clone_scope();
    let in_a = scope.get("app.Mailer", "a").unwrap();
    let in_b = scope.get("app.Sender", "b").unwrap();
    assert!(in_a.ptr_eq(&in_b), "shared instances must stay shared in the clone");
    assert!(!in_a.ptr_eq(&cloneable), "cloneable instances must be copied");
    assert_eq!(in_a.downcast::<Mailer>().unwrap().sent, 1);
    assert!(scope.get("app.Base", "c").unwrap().ptr_eq(&shared));

    scope
        .register_instance(Instance::cloneable("app.Mailer", Mailer { sent: 9 }), "a")
        .unwrap();
    assert_eq!(scope.get_in_as::<Mailer>("app.Mailer", "a").unwrap().sent, 9);
    assert!(original.get("app.Mailer", "a").unwrap().ptr_eq(&cloneable));
    assert!(original.get("app.Mailer", "b").unwrap().ptr_eq(&cloneable));
}

#[test]
fn empty_scopes_start_without_registrations() {
    let mut original = container();
    original.register_type("app.Mailer", DEFAULT_CATEGORY).unwrap();

    let mut empty = original.empty_scope();
    assert!(!empty.has("app.Mailer", DEFAULT_CATEGORY));
    empty.register_type("app.Base", DEFAULT_CATEGORY).unwrap();
    assert!(!original.has("app.Base", "other"));
    assert_eq!(
        original.get("app.Service", DEFAULT_CATEGORY).unwrap().type_name,
        "app.Mailer"
    );
}

#[test]
fn failed_constructions_can_be_retried() {
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = attempts.clone();
    let catalog = TypeCatalog::new().with(TypeDescriptor::class("net.Remote", vec![], move |_| {
        if counter.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err("connection refused".into());
        }
        Ok(Remote)
    }));
    let mut container = Container::new(catalog);
    container.register_type("net.Remote", DEFAULT_CATEGORY).unwrap();

    let error = container.get("net.Remote", DEFAULT_CATEGORY).unwrap_err();
    let ContainerError::ConstructionFailed { type_name, source } = error else {
        panic!("expected a construction failure");
    };
    assert_eq!(type_name, "net.Remote");
    assert!(matches!(*source, ResolveError::Call { .. }));

    let instance = container.get("net.Remote", DEFAULT_CATEGORY).unwrap();
    assert!(container.get("net.Remote", DEFAULT_CATEGORY).unwrap().ptr_eq(&instance));
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[test]
fn calls_resolve_objects_and_configuration() {
    let config = MemoryConfig::new().with("greeting", "hello").with("times", "2");
    let mut container = ContainerBuilder::new(services())
        .config(config)
        .add_type("app.Mailer")
        .build()
        .unwrap();

    let callable = Callable::new(
        "test.greet",
        vec![
            ParamSpec::object("sender", "app.Sender"),
            ParamSpec::config("greeting", "greeting", [TypeTag::String]),
            ParamSpec::config("times", "times", [TypeTag::Int]),
            ParamSpec::config("suffix", "suffix", [TypeTag::String]).with_default("!"),
        ],
        |args| {
            let sender = args.object::<Mailer>("sender")?;
            let greeting = args.string("greeting")?.repeat(args.int("times")? as usize);
            Ok(Value::from(format!("{greeting}{}{}", args.string("suffix")?, sender.sent)))
        },
    );

    assert_eq!(
        container.call(&callable).unwrap(),
        Value::from("hellohello!0")
    );
}

#[test]
fn missing_configuration_fails_the_call() {
    let mut container = container();
    let callable = Callable::anonymous(
        vec![ParamSpec::config("port", "app.port", [TypeTag::Int])],
        |_| Ok(Value::Null),
    );
    assert!(matches!(
        container.call(&callable),
        Err(ResolveError::Config(_))
    ));
}

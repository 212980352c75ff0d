use std::error::Error;

use serde_json::json;
use wrapp_inject::{
    Callable, ContainerBuilder, MemoryConfig, ParamSpec, TypeCatalog, TypeDescriptor, TypeTag,
    Value, DEFAULT_CATEGORY,
};

#[derive(Debug, Clone)]
struct SmtpTransport {
    host: String,
    port: i64,
}

#[derive(Debug, Clone)]
struct Mailer {
    from: String,
    transport: std::sync::Arc<SmtpTransport>,
}

fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let catalog = TypeCatalog::new()
        .with(TypeDescriptor::interface("mail.Transport"))
        .with(
            TypeDescriptor::class(
                "mail.SmtpTransport",
                vec![
                    ParamSpec::config("host", "mail.smtp.host", [TypeTag::String]),
                    ParamSpec::config("port", "mail.smtp.port", [TypeTag::Int]).with_default(25),
                ],
                |args| {
                    Ok(SmtpTransport {
                        host: args.string("host")?,
                        port: args.int("port")?,
                    })
                },
            )
            .extends("mail.Transport"),
        )
        .with(TypeDescriptor::class(
            "mail.Mailer",
            vec![
                ParamSpec::config("from", "mail.from", [TypeTag::String]),
                ParamSpec::object("transport", "mail.Transport"),
            ],
            |args| {
                Ok(Mailer {
                    from: args.string("from")?,
                    transport: args.object("transport")?,
                })
            },
        ));

    let config = MemoryConfig::from_json(json!({
        "mail": {"from": "noreply@example.com", "smtp": {"host": "localhost"}}
    }))?;

    let mut container = ContainerBuilder::new(catalog)
        .config(config)
        .add_type("mail.SmtpTransport")
        .add_type("mail.Mailer")
        .build()?;

    let mailer = container.get_as::<Mailer>("mail.Mailer")?;
    println!("{mailer:?}");
    println!(
        "transport shared: {}",
        std::sync::Arc::ptr_eq(
            &mailer.transport,
            &container.get_as::<SmtpTransport>("mail.Transport")?
        )
    );

    let greet = Callable::new(
        "demo.greet",
        vec![ParamSpec::object("mailer", "mail.Mailer")],
        |args| {
            let mailer = args.object::<Mailer>("mailer")?;
            Ok(Value::from(format!(
                "sending as {} via {}:{}",
                mailer.from, mailer.transport.host, mailer.transport.port
            )))
        },
    );
    println!("{}", container.call(&greet)?);

    let path = std::env::temp_dir().join("wrapp-inject-demo.php");
    std::fs::write(
        &path,
        "<?php\n/**\n * @config(\"mail.from\")\n * string $from\n * @var \\mail\\Mailer $mailer\n */\nnamespace demo;\n?>\nHello from <?php echo $from; ?>\n",
    )?;
    println!("{}", container.include(&path)?);
    std::fs::remove_file(&path)?;

    let mut scope = container.clone_scope();
    let copy = scope.get("mail.Mailer", DEFAULT_CATEGORY)?;
    println!("scope copy: {copy:?}");
    println!("{container:?}");

    Ok(())
}

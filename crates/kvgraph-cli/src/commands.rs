use colored::Colorize;
use kvgraph_mapper::MapperConfig;
use kvgraph_store::Value;
use kvgraph_types::KeyDescriptor;
use serde_json::json;

use crate::cli::*;
use crate::demo;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    match cli.command {
        Command::Key(args) => cmd_key(args, format),
        Command::Config(args) => cmd_config(args, format),
        Command::Demo(args) => cmd_demo(args, format),
    }
}

fn cmd_key(args: KeyArgs, format: OutputFormat) -> anyhow::Result<()> {
    let key = match args.action {
        KeyAction::Parse { raw } => KeyDescriptor::parse(&raw)?,
        KeyAction::Format { id, prefix, suffix } => {
            KeyDescriptor::new(prefix.as_deref(), &id, suffix.as_deref())?
        }
        KeyAction::Counter { raw } => {
            let key = KeyDescriptor::parse(&raw)?;
            match format {
                OutputFormat::Json => println!("{}", json!({ "counter": key.counter_key() })),
                OutputFormat::Text => println!("{}", key.counter_key().yellow()),
            }
            return Ok(());
        }
    };
    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({
                "key": key.formatted(),
                "prefix": key.prefix(),
                "id": key.id(),
                "suffix": key.suffix(),
                "counter": key.counter_key(),
            })
        ),
        OutputFormat::Text => {
            println!("{}", key.formatted().yellow().bold());
            println!("  Prefix:  {}", key.prefix().unwrap_or("-"));
            println!("  Id:      {}", key.id().cyan());
            println!("  Suffix:  {}", key.suffix().unwrap_or("-"));
            println!("  Counter: {}", key.counter_key());
        }
    }
    Ok(())
}

fn cmd_config(args: ConfigArgs, format: OutputFormat) -> anyhow::Result<()> {
    let config = match &args.path {
        Some(path) => MapperConfig::load(path)?,
        None => MapperConfig::default(),
    };
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
        OutputFormat::Text => {
            let source = args
                .path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "defaults".into());
            println!("Configuration ({})", source.dimmed());
            print!("{}", config.to_toml_string()?);
        }
    }
    Ok(())
}

fn cmd_demo(args: DemoArgs, format: OutputFormat) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => MapperConfig::load(path)?,
        None => MapperConfig::default(),
    };
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let report = runtime.block_on(demo::run(args.books, &args.namespace, config))?;

    match format {
        OutputFormat::Json => {
            let keys: serde_json::Map<String, serde_json::Value> = report
                .keys
                .iter()
                .map(|(key, value)| (key.clone(), value_json(value)))
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "library": report.library,
                    "keys": keys,
                    "writes": report.writes,
                }))?
            );
        }
        OutputFormat::Text => {
            println!("{} Stored library {}", "✓".green().bold(), report.library.yellow());
            for (key, value) in &report.keys {
                println!("  {} {}", key.bold(), value_text(value));
            }
            println!("{} store writes issued", report.writes.to_string().cyan());
        }
    }
    Ok(())
}

fn value_json(value: &Value) -> serde_json::Value {
    match value {
        Value::String(s) => json!(s),
        Value::Hash(fields) => json!(fields),
        Value::List(items) => json!(items),
        Value::SortedSet(members) => members
            .iter()
            .map(|(member, score)| json!({ "member": member, "score": score }))
            .collect(),
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Hash(fields) => {
            let pairs: Vec<String> = fields.iter().map(|(k, v)| format!("{k}={v}")).collect();
            format!("{{{}}}", pairs.join(", "))
        }
        Value::List(items) => {
            format!("[{}]", items.iter().cloned().collect::<Vec<_>>().join(", "))
        }
        Value::SortedSet(members) => {
            let pairs: Vec<String> = members.iter().map(|(m, s)| format!("{m}@{s}")).collect();
            format!("<{}>", pairs.join(", "))
        }
    }
}

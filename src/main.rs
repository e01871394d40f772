use anyhow::{anyhow, Context, Result};
use clap::Parser;
use indexmap::IndexSet;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use persist_enhance::command_backend::registry_from_config;
use persist_enhance::config::{load_config, load_config_or_default, write_config, EnhancerConfig};
use persist_enhance::environment::host_entries;
use persist_enhance::locate::{SharedIndexLock, UnitRecords};
use persist_enhance::project::{load_project, Project};
use persist_enhance::report::ProjectBuildContext;
use persist_enhance::scan::{SourceAnnotationScanner, XmlDescriptorParser};
use persist_enhance::task::{Collaborators, EnhancerService, EnhancerTask};

mod cli;
use cli::{
    BackendsArgs, Command, EnhanceArgs, InitArgs, ListArgs, ProjectArgs, RootArgs, ToggleArgs,
};

const LOG_ENV: &str = "PENHANCE_LOG";

fn main() -> Result<()> {
    init_tracing();
    let args = RootArgs::parse();
    match args.command {
        Command::Init(args) => cmd_init(args),
        Command::Enhance(args) => cmd_enhance(args),
        Command::List(args) => cmd_list(args),
        Command::Toggle(args) => cmd_toggle(args),
        Command::Backends(args) => cmd_backends(args),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_enhancer_config(args: &ProjectArgs) -> Result<EnhancerConfig> {
    match &args.config {
        Some(path) => load_config(path),
        None => load_config_or_default(&args.project),
    }
}

fn load_manifest(args: &ProjectArgs) -> Result<Project> {
    let path = args.manifest_path();
    load_project(&path).with_context(|| format!("load project manifest {}", path.display()))
}

fn cmd_init(args: InitArgs) -> Result<()> {
    let path = args.project.config_path();
    if path.exists() && !args.force {
        return Err(anyhow!(
            "{} already exists (use --force to overwrite)",
            path.display()
        ));
    }
    let manifest = args.project.manifest_path();
    let mut config = EnhancerConfig::default();
    if manifest.is_file() {
        let project = load_manifest(&args.project)?;
        config.enabled_units = project.units().map(|unit| unit.name.clone()).collect();
        config.enabled_classes = discovered_classes(&config, &project)?;
    } else {
        tracing::warn!(path = %manifest.display(), "no project manifest, no units enabled");
    }
    write_config(&path, &config)?;
    println!(
        "wrote {} ({} units, {} classes enabled)",
        path.display(),
        config.enabled_units.len(),
        config.enabled_classes.len()
    );
    Ok(())
}

/// Every class the listings find for the enabled units, so a fresh config
/// enhances everything it can see.
fn discovered_classes(config: &EnhancerConfig, project: &Project) -> Result<IndexSet<String>> {
    let parser = XmlDescriptorParser::new()?;
    let scanner = SourceAnnotationScanner::new()?;
    let index = SharedIndexLock::new();
    let service = EnhancerService::new(
        config,
        Collaborators {
            parser: &parser,
            annotations: &scanner,
            index: &index,
        },
    );
    let descriptors = service.metadata_files(project).context("list metadata files")?;
    let annotated = service
        .annotated_class_files(project)
        .context("list annotated class files")?;
    Ok(descriptors
        .values()
        .chain(annotated.values())
        .flatten()
        .flat_map(|record| record.class_names())
        .map(str::to_string)
        .collect())
}

fn cmd_enhance(args: EnhanceArgs) -> Result<()> {
    let config = load_enhancer_config(&args.project)?;
    let project = load_manifest(&args.project)?;
    let registry = registry_from_config(&config);
    let parser = XmlDescriptorParser::new()?;
    let scanner = SourceAnnotationScanner::new()?;
    let index = SharedIndexLock::new();
    let collaborators = Collaborators {
        parser: &parser,
        annotations: &scanner,
        index: &index,
    };

    let context = if args.units.is_empty() {
        ProjectBuildContext::new(project)
    } else {
        ProjectBuildContext::with_units(project, &args.units)?
    };
    let task = EnhancerTask::new(&config, &registry, collaborators)
        .with_host_entries(host_entries().context("resolve host entries")?);
    let outcome = task.execute(&context).context("discover persistence metadata")?;

    let messages = context.messages();
    if args.json {
        let messages: Vec<_> = messages
            .iter()
            .map(|(severity, text)| json!({ "severity": severity.to_string(), "text": text }))
            .collect();
        let summary = json!({
            "discovered": outcome.discovered,
            "processed": outcome.processed.len(),
            "messages": messages,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("serialize enhance summary")?
        );
    } else {
        for (severity, text) in &messages {
            println!("{severity}: {text}");
        }
    }

    if context.has_errors() {
        return Err(anyhow!("enhancement finished with errors"));
    }
    Ok(())
}

fn records_json(records: &UnitRecords) -> serde_json::Value {
    records
        .iter()
        .map(|(unit, records)| {
            let entries: Vec<_> = records
                .iter()
                .map(|record| {
                    json!({
                        "path": record.display_path(),
                        "filename": record.display_filename(),
                        "location": record.location(),
                        "classes": record.class_names(),
                    })
                })
                .collect();
            (unit.clone(), serde_json::Value::Array(entries))
        })
        .collect::<serde_json::Map<_, _>>()
        .into()
}

fn print_records(title: &str, records: &UnitRecords) {
    for (unit, records) in records {
        println!("{unit} {title}:");
        for record in records {
            let path = record.display_path();
            if path.is_empty() {
                println!("  {}", record.display_filename());
            } else {
                println!("  {}/{}", path, record.display_filename());
            }
            for class in record.class_names() {
                println!("    {class}");
            }
        }
    }
}

fn cmd_list(args: ListArgs) -> Result<()> {
    let config = load_enhancer_config(&args.project)?;
    let project = load_manifest(&args.project)?;
    let parser = XmlDescriptorParser::new()?;
    let scanner = SourceAnnotationScanner::new()?;
    let index = SharedIndexLock::new();
    let service = EnhancerService::new(
        &config,
        Collaborators {
            parser: &parser,
            annotations: &scanner,
            index: &index,
        },
    );

    let descriptors = service.metadata_files(&project).context("list metadata files")?;
    let annotated = service
        .annotated_class_files(&project)
        .context("list annotated class files")?;

    if args.json {
        let listing = json!({
            "metadata_files": records_json(&descriptors),
            "annotated_classes": records_json(&annotated),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&listing).context("serialize listing")?
        );
        return Ok(());
    }
    if descriptors.is_empty() && annotated.is_empty() {
        if !config.is_active() {
            println!("enhancer is disabled or has no enabled units");
        }
        println!("no metadata files or annotated classes found");
        return Ok(());
    }
    print_records("metadata files", &descriptors);
    print_records("annotated classes", &annotated);
    Ok(())
}

fn cmd_toggle(args: ToggleArgs) -> Result<()> {
    let path = args.project.config_path();
    let mut config = if path.is_file() {
        load_config(&path)?
    } else {
        EnhancerConfig::default()
    };
    config.enabled = if args.on {
        true
    } else if args.off {
        false
    } else {
        !config.enabled
    };
    write_config(&path, &config)?;
    let state = if config.enabled { "enabled" } else { "disabled" };
    println!("enhancer {state} ({})", path.display());
    Ok(())
}

fn cmd_backends(args: BackendsArgs) -> Result<()> {
    let config = load_enhancer_config(&args.project)?;
    let registry = registry_from_config(&config);
    let selected = registry.resolve(&config);
    for backend in registry.all() {
        let marker = if backend.id() == selected.id() { "*" } else { " " };
        println!("{marker} {} ({})", backend.id(), backend.name());
    }
    Ok(())
}

use std::path::Path;

use anyhow::Context;
use colored::Colorize;
use serde_json::json;

use folio_session::{Document, SaveReport, SessionConfig};
use folio_xref::{encode_payload, SaveMode};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => SessionConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => SessionConfig::default(),
    };
    let format = cli.format;
    match cli.command {
        Command::Info(args) => cmd_info(args, config, format),
        Command::Show(args) => cmd_show(args, config, format),
        Command::Rewrite(args) => cmd_rewrite(args, config, format),
        Command::Remove(args) => cmd_remove(args, config, format),
        Command::Graft(args) => cmd_graft(args, config, format),
        Command::Prune(args) => cmd_prune(args, config, format),
    }
}

fn open(path: &Path, config: &SessionConfig) -> anyhow::Result<Document> {
    Document::open(path, config.clone()).with_context(|| format!("opening {}", path.display()))
}

fn mode_or_default(mode: &ModeArgs, config: &SessionConfig) -> SaveMode {
    mode.mode.unwrap_or(config.default_mode)
}

fn cmd_info(args: InfoArgs, config: SessionConfig, format: OutputFormat) -> anyhow::Result<()> {
    let doc = open(&args.path, &config)?;
    let registry = doc.registry();
    let info = doc.info()?.unwrap_or_default();

    if format == OutputFormat::Json {
        let info: serde_json::Map<String, serde_json::Value> = info
            .iter()
            .map(|(key, value)| {
                let text = String::from_utf8_lossy(&encode_payload(value)).into_owned();
                (key.clone(), json!(text))
            })
            .collect();
        let out = json!({
            "path": args.path.display().to_string(),
            "version": doc.version().to_string(),
            "high_water": registry.high_water(),
            "live_objects": registry.live_count(),
            "root": doc.root().map(|r| r.to_string()),
            "revision": doc.revision_id().map(|id| json!({
                "base": id.base.to_hex(),
                "version": id.version.to_hex(),
            })),
            "info": info,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("{} {}", "Document".bold(), args.path.display());
    println!("  Version:    {}", doc.version().to_string().cyan());
    println!(
        "  Objects:    {} live, high-water {}",
        registry.live_count().to_string().bold(),
        registry.high_water()
    );
    match doc.root() {
        Some(root) => println!("  Root:       {}", root.to_string().yellow()),
        None => println!("  Root:       {}", "(none)".dimmed()),
    }
    match doc.revision_id() {
        Some(id) => {
            println!("  Base id:    {}", id.base.to_hex().dimmed());
            println!("  Version id: {}", id.version.to_hex().dimmed());
        }
        None => println!("  Revision:   {}", "(none)".dimmed()),
    }
    for (key, value) in info.iter() {
        println!(
            "  {:<11} {}",
            format!("{key}:"),
            String::from_utf8_lossy(&encode_payload(value))
        );
    }
    Ok(())
}

fn cmd_show(args: ShowArgs, config: SessionConfig, format: OutputFormat) -> anyhow::Result<()> {
    let doc = open(&args.path, &config)?;
    let handle = doc.registry().get(args.number)?;
    let payload = handle.payload_cloned();

    if format == OutputFormat::Json {
        let out = json!({
            "number": handle.number(),
            "generation": handle.generation(),
            "usage": handle.usage().to_string(),
            "payload": payload,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    match payload {
        Some(payload) if handle.is_in_use() => {
            println!("{} {}", handle.object_ref().to_string().yellow().bold(), "obj".dimmed());
            println!("{}", String::from_utf8_lossy(&encode_payload(&payload)));
        }
        _ => println!(
            "{} is {} (generation {})",
            args.number.to_string().yellow(),
            handle.usage().to_string().red(),
            handle.generation()
        ),
    }
    Ok(())
}

fn cmd_rewrite(args: RewriteArgs, config: SessionConfig, format: OutputFormat) -> anyhow::Result<()> {
    let mode = mode_or_default(&args.mode, &config);
    let mut doc = open(&args.path, &config)?;
    let report = match &args.output {
        Some(output) => doc.save_to(output, mode)?,
        None => doc.save(mode)?,
    };
    doc.close()?;
    let target = args.output.as_deref().unwrap_or(&args.path);
    print_saved(target, &report, format, json!({}))
}

fn cmd_remove(args: RemoveArgs, config: SessionConfig, format: OutputFormat) -> anyhow::Result<()> {
    let mode = mode_or_default(&args.mode, &config);
    let mut doc = open(&args.path, &config)?;
    let freed = doc.registry_mut()?.remove(args.number)?;
    let report = doc.save(mode)?;
    doc.close()?;
    if format == OutputFormat::Text {
        println!(
            "{} Freed object {} (generation now {})",
            "✓".green(),
            args.number.to_string().yellow(),
            freed.generation()
        );
    }
    print_saved(
        &args.path,
        &report,
        format,
        json!({ "removed": args.number, "generation": freed.generation() }),
    )
}

fn cmd_graft(args: GraftArgs, config: SessionConfig, format: OutputFormat) -> anyhow::Result<()> {
    let mode = mode_or_default(&args.mode, &config);
    let source = open(&args.source, &config)?;
    let mut target = open(&args.target, &config)?;
    let before = target.registry().high_water();
    let handle = target
        .import(&source, args.number)
        .with_context(|| format!("importing object {} from {}", args.number, args.source.display()))?;
    let added = target.registry().high_water() - before;
    let report = target.save(mode)?;
    target.close()?;
    if format == OutputFormat::Text {
        println!(
            "{} Grafted {} from {} as {} ({} objects added)",
            "✓".green(),
            args.number.to_string().yellow(),
            args.source.display(),
            handle.object_ref().to_string().yellow().bold(),
            added
        );
    }
    print_saved(
        &args.target,
        &report,
        format,
        json!({ "grafted": handle.object_ref().to_string(), "added": added }),
    )
}

fn cmd_prune(args: PruneArgs, config: SessionConfig, format: OutputFormat) -> anyhow::Result<()> {
    let mode = mode_or_default(&args.mode, &config);
    let mut doc = open(&args.path, &config)?;
    let freed = doc.prune_unreachable()?;
    if freed.is_empty() {
        doc.close()?;
        if format == OutputFormat::Json {
            println!("{}", json!({ "pruned": freed }));
        } else {
            println!("{} Nothing to prune.", "✓".green());
        }
        return Ok(());
    }
    let report = doc.save(mode)?;
    doc.close()?;
    if format == OutputFormat::Text {
        println!("{} Pruned {} unreachable objects", "✓".green(), freed.len().to_string().bold());
    }
    print_saved(&args.path, &report, format, json!({ "pruned": freed }))
}

fn print_saved(
    path: &Path,
    report: &SaveReport,
    format: OutputFormat,
    mut extra: serde_json::Value,
) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        if let Some(fields) = extra.as_object_mut() {
            fields.insert("path".into(), json!(path.display().to_string()));
            fields.insert("mode".into(), json!(report.mode));
            fields.insert("bytes".into(), json!(report.bytes));
            fields.insert("objects_written".into(), json!(report.objects_written));
            fields.insert("revision".into(), json!(report.revision.version.to_hex()));
        }
        println!("{}", serde_json::to_string_pretty(&extra)?);
        return Ok(());
    }
    println!(
        "{} Saved {} ({}, {} objects, {} bytes)",
        "✓".green().bold(),
        path.display().to_string().bold(),
        report.mode.to_string().cyan(),
        report.objects_written,
        report.bytes
    );
    println!("  Revision: {}", report.revision.version.to_hex().dimmed());
    Ok(())
}

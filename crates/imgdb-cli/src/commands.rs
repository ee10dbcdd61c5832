use std::fs;
use std::io::{self, Write};
use std::path::Path;

use anyhow::Context;
use colored::Colorize;
use imgdb_store::{CatalogFilter, ExportMode, ImageDatabase, ImageStore, PutRequest};
use imgdb_types::{Identity, ImageRecord};
use serde_json::json;

use crate::cli::*;
use crate::config;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = config::load(cli.config.as_deref(), cli.db.as_deref())?;
    let db = ImageDatabase::open(config);
    tracing::debug!(path = %db.path().display(), "opened image database");
    let stdout = io::stdout();
    execute(&db, cli.command, cli.format, &mut stdout.lock())
}

/// Run one command against `db`, writing its report to `out`.
pub fn execute(
    db: &ImageDatabase,
    command: Command,
    format: OutputFormat,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    match command {
        Command::Put(args) => cmd_put(db, args, format, out),
        Command::Get(args) => cmd_get(db, args, format, out),
        Command::Delete(args) => cmd_delete(db, args.identity, format, out),
        Command::Label(args) => cmd_label(db, args, format, out),
        Command::List(args) => cmd_list(db, args, format, out),
        Command::Tags => cmd_tags(db, format, out),
        Command::Export(args) => cmd_export(db, args, format, out),
        Command::Verify => cmd_verify(db, format, out),
    }
}

fn read_image(path: &Path) -> anyhow::Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("reading image {}", path.display()))
}

fn cmd_put(db: &ImageDatabase, args: PutArgs, format: OutputFormat, out: &mut dyn Write) -> anyhow::Result<()> {
    let image = args.image.as_deref().map(read_image).transpose()?;
    let updating = args.update;
    let identity = if args.training {
        let image = image.context("--image is required for a training image")?;
        let width = args.width.context("--width is required for a training image")?;
        let height = args.height.context("--height is required for a training image")?;
        db.insert_training_image(image, width, height)?
    } else {
        let request = PutRequest {
            image,
            seed: args.seed,
            prompt: args.prompt,
            negative_prompt: args.negative_prompt,
            width: args.width,
            height: args.height,
            steps: args.steps,
            guidance_scale: args.guidance_scale,
            labeled: args.labeled,
            label: args.label,
        };
        db.put(updating.as_ref(), request)?
    };

    match format {
        OutputFormat::Json => {
            let rotated = updating.is_some_and(|old| old != identity);
            writeln!(out, "{}", json!({ "identity": identity, "rotated": rotated }))?;
        }
        OutputFormat::Text => match updating {
            Some(old) if old != identity => writeln!(
                out,
                "{} Updated {} (identity rotated to {})",
                "✓".green().bold(),
                old.short_id(),
                identity.to_string().yellow()
            )?,
            Some(_) => writeln!(out, "{} Updated {}", "✓".green().bold(), identity.to_string().yellow())?,
            None => writeln!(out, "{} Stored {}", "✓".green().bold(), identity.to_string().yellow())?,
        },
    }
    Ok(())
}

fn cmd_get(db: &ImageDatabase, args: GetArgs, format: OutputFormat, out: &mut dyn Write) -> anyhow::Result<()> {
    let image = db.fetch(&args.identity)?;
    let Some(path) = args.output else {
        out.write_all(&image)?;
        return Ok(());
    };
    fs::write(&path, &image).with_context(|| format!("writing {}", path.display()))?;
    match format {
        OutputFormat::Json => writeln!(
            out,
            "{}",
            json!({ "identity": args.identity, "bytes": image.len(), "output": path })
        )?,
        OutputFormat::Text => writeln!(
            out,
            "{} Wrote {} bytes to {}",
            "✓".green().bold(),
            image.len(),
            path.display()
        )?,
    }
    Ok(())
}

fn cmd_delete(db: &ImageDatabase, identity: Identity, format: OutputFormat, out: &mut dyn Write) -> anyhow::Result<()> {
    let deleted = db.delete(&identity)?;
    match format {
        OutputFormat::Json => writeln!(out, "{}", json!({ "identity": identity, "deleted": deleted }))?,
        OutputFormat::Text if deleted => {
            writeln!(out, "{} Deleted {}", "✓".green().bold(), identity.short_id().yellow())?
        }
        OutputFormat::Text => writeln!(out, "{} No image {}", "!".yellow().bold(), identity.short_id())?,
    }
    Ok(())
}

fn cmd_label(db: &ImageDatabase, args: LabelArgs, format: OutputFormat, out: &mut dyn Write) -> anyhow::Result<()> {
    db.update_label(&args.identity, &args.label)?;
    match format {
        OutputFormat::Json => writeln!(out, "{}", json!({ "identity": args.identity, "label": args.label }))?,
        OutputFormat::Text => writeln!(
            out,
            "{} Labeled {}: {}",
            "✓".green().bold(),
            args.identity.short_id().yellow(),
            args.label
        )?,
    }
    Ok(())
}

fn cmd_list(db: &ImageDatabase, args: ListArgs, format: OutputFormat, out: &mut dyn Write) -> anyhow::Result<()> {
    let filter = CatalogFilter {
        include_prompt: args.include_prompt,
        include_negative_prompt: args.include_negative_prompt,
        exclude_prompt: args.exclude_prompt,
        exclude_negative_prompt: args.exclude_negative_prompt,
        labeled: args.labeled,
    };
    let records = if args.positions.is_empty() {
        db.list_metadata()?
    } else {
        db.records_by_position(&args.positions)?
    };
    let rows = filter.apply(&records);

    match format {
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(&rows)?)?,
        OutputFormat::Text => {
            for row in &rows {
                print_row(out, row)?;
            }
            writeln!(out, "{} of {} images", rows.len().to_string().bold(), records.len())?;
        }
    }
    Ok(())
}

fn print_row(out: &mut dyn Write, row: &ImageRecord) -> io::Result<()> {
    let status = if row.labeled {
        "labeled".green()
    } else {
        "unlabeled".dimmed()
    };
    writeln!(out, "{}  {}", row.identity.to_string().yellow(), status)?;
    writeln!(out, "  prompt: {}", row.prompt)?;
    if !row.negative_prompt.is_empty() {
        writeln!(out, "  negative: {}", row.negative_prompt)?;
    }
    writeln!(
        out,
        "  {}x{}  seed {}  steps {}  guidance {}",
        row.width, row.height, row.seed, row.steps, row.guidance_scale
    )?;
    if let Some(label) = row.label.as_deref().filter(|_| row.labeled) {
        writeln!(out, "  label: {}", label.cyan())?;
    }
    Ok(())
}

fn cmd_tags(db: &ImageDatabase, format: OutputFormat, out: &mut dyn Write) -> anyhow::Result<()> {
    let tags = db.tags()?;
    match format {
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string(&tags)?)?,
        OutputFormat::Text => {
            for tag in &tags {
                writeln!(out, "{tag}")?;
            }
        }
    }
    Ok(())
}

fn cmd_export(db: &ImageDatabase, args: ExportArgs, format: OutputFormat, out: &mut dyn Write) -> anyhow::Result<()> {
    let mode = if args.training {
        ExportMode::TrainingData
    } else {
        ExportMode::Images
    };
    let identities = (!args.identities.is_empty()).then_some(args.identities.as_slice());
    let report = db.export(&args.dir, identities, mode)?;
    match format {
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?,
        OutputFormat::Text => {
            writeln!(
                out,
                "{} Exported {} images to {}",
                "✓".green().bold(),
                report.exported.len(),
                report.directory.display()
            )?;
            if report.missing > 0 {
                writeln!(out, "  {} not found", report.missing.to_string().yellow())?;
            }
            if report.unlabeled > 0 {
                writeln!(out, "  {} unlabeled, skipped", report.unlabeled)?;
            }
        }
    }
    Ok(())
}

fn cmd_verify(db: &ImageDatabase, format: OutputFormat, out: &mut dyn Write) -> anyhow::Result<()> {
    let report = db.verify()?;
    match format {
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?,
        OutputFormat::Text => {
            writeln!(out, "{} {} is consistent", "✓".green().bold(), db.path().display())?;
            writeln!(out, "  images:  {}", report.images)?;
            writeln!(out, "  blobs:   {} bytes", report.blob_bytes)?;
            writeln!(out, "  mapper:  {} bytes", report.mapper_bytes)?;
            writeln!(out, "  catalog: {} bytes", report.catalog_bytes)?;
        }
    }
    Ok(())
}

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use romscope_core::db::{ProjectContext, ProjectLayout};
use romscope_core::model::{Address, Severity};
use romscope_core::project::ProjectModel;
use romscope_core::services::{AnalysisPipeline, AnalysisRunner};

use crate::canonicalize_or_current;
use crate::commands::{image_path, load_profile, open_project_db, profile_hash, resolve_rom};

/// Options shared by commands that run the analysis pipeline.
#[derive(Debug, Clone, Default)]
pub struct AnalyzeArgs {
    pub root: String,
    pub path: Option<String>,
    pub rom: Option<String>,
    pub profile: Option<String>,
    pub mode: Option<String>,
}

/// Analyse a file or a registered ROM. Registered ROMs get their run recorded.
pub fn analyze_command(args: &AnalyzeArgs, json: bool, out: Option<&str>) -> Result<()> {
    let model = match args.rom.as_deref() {
        Some(name) => {
            if args.path.is_some() {
                return Err(anyhow!("Pass either --path or --rom, not both"));
            }
            let ctx = ProjectContext::from_root(canonicalize_or_current(&args.root)?)?;
            let (_record, rom_path) = resolve_rom(&ctx.db, &ctx.layout, name)?;
            let profile =
                load_profile(args.profile.as_deref(), Some(&ctx.layout), Some(&ctx.config), args.mode.as_deref())?;
            let hash = profile_hash(&profile)?;
            let pipeline = AnalysisPipeline::new(profile).context("Invalid analysis profile")?;
            let runner = AnalysisRunner { ctx: &ctx, pipeline: &pipeline };
            let (run_id, model) = runner
                .run(name, &rom_path, &hash)
                .with_context(|| format!("Analysis of '{name}' failed"))?;
            let model_path = write_run_model(&ctx.layout, name, run_id, &model)?;
            if !json {
                println!("Run {} recorded for '{}'", run_id, name);
                println!("Model written to {}", model_path.display());
            }
            model
        }
        None => {
            let path = image_path(&args.root, args.path.as_deref(), None)?;
            analyze_file(&path, args)?
        }
    };

    if let Some(out) = out {
        let serialized = serde_json::to_string_pretty(&model).context("Failed to serialize project model")?;
        fs::write(out, serialized).with_context(|| format!("Failed to write model to {out}"))?;
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&model).context("Failed to serialize project model")?);
    } else {
        print_summary(&model);
    }
    Ok(())
}

/// Keep a JSON copy of every recorded run under `outputs/roms/<name>/`.
fn write_run_model(layout: &ProjectLayout, rom: &str, run_id: i64, model: &ProjectModel) -> Result<PathBuf> {
    let dir = layout.rom_output_root(rom);
    fs::create_dir_all(&dir).with_context(|| format!("Failed to create output dir {}", dir.display()))?;
    let path = dir.join(format!("run-{run_id}.json"));
    let serialized = serde_json::to_string_pretty(model).context("Failed to serialize project model")?;
    fs::write(&path, serialized).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

fn analyze_file(path: &Path, args: &AnalyzeArgs) -> Result<ProjectModel> {
    let profile = load_profile(args.profile.as_deref(), None, None, args.mode.as_deref())?;
    let pipeline = AnalysisPipeline::new(profile).context("Invalid analysis profile")?;
    let (_rom, model) =
        pipeline.analyze_path(path).with_context(|| format!("Failed to analyse {}", path.display()))?;
    Ok(model)
}

fn run_pipeline(args: &AnalyzeArgs) -> Result<ProjectModel> {
    match args.rom.as_deref() {
        Some(name) => {
            let ctx = ProjectContext::from_root(canonicalize_or_current(&args.root)?)?;
            let (_record, rom_path) = resolve_rom(&ctx.db, &ctx.layout, name)?;
            let profile =
                load_profile(args.profile.as_deref(), Some(&ctx.layout), Some(&ctx.config), args.mode.as_deref())?;
            let pipeline = AnalysisPipeline::new(profile).context("Invalid analysis profile")?;
            Ok(pipeline.analyze_path(&rom_path).with_context(|| format!("Failed to analyse '{name}'"))?.1)
        }
        None => {
            let path = image_path(&args.root, args.path.as_deref(), None)?;
            analyze_file(&path, args)
        }
    }
}

fn print_summary(model: &ProjectModel) {
    let image = model.image();
    println!("Image: {:#X} bytes, {} (confidence {:.2})", image.size, image.mode, image.mapping_confidence);
    if let Some(title) = &image.title {
        println!("Title: {title}");
    }

    let coverage = model.coverage();
    println!("Regions ({}):", model.regions().len());
    for (kind, bytes) in &coverage.by_kind {
        let share = if coverage.total == 0 { 0.0 } else { *bytes as f64 * 100.0 / coverage.total as f64 };
        println!("  - {:<14} {:>8} bytes ({:5.1}%)", kind, bytes, share);
    }

    let partial = model.functions().iter().filter(|f| f.partial).count();
    println!("Functions: {} ({} partial)", model.functions().len(), partial);
    println!("Labels: {}", model.label_table().len());
    let indirect = model.xrefs().iter().filter(|x| x.is_indirect()).count();
    println!("Cross-references: {} ({} indirect)", model.xrefs().len(), indirect);

    let recursive = model.recursive_functions();
    if !recursive.is_empty() {
        println!("Recursive functions: {}", recursive.len());
    }

    let notable: Vec<_> = model.diagnostics().iter().filter(|d| d.severity >= Severity::Warning).collect();
    if !notable.is_empty() {
        println!("Diagnostics ({}):", notable.len());
        for d in notable {
            match d.offset {
                Some(offset) => println!("  - [{}] {} @ {:#X}: {}", d.severity.as_str(), d.source, offset, d.message),
                None => println!("  - [{}] {}: {}", d.severity.as_str(), d.source, d.message),
            }
        }
    }
}

/// Print assembly listings, for every function or the one named by `function`.
pub fn disasm_command(args: &AnalyzeArgs, function: Option<&str>) -> Result<()> {
    let model = run_pipeline(args)?;

    let selected: Vec<_> = match function {
        None => model.functions().iter().collect(),
        Some(wanted) => {
            let entry = match model.label_table().by_name(wanted) {
                Some(label) => label.offset,
                None => {
                    let address: Address =
                        wanted.parse().map_err(|e| anyhow!("'{wanted}' is neither a label nor an address: {e}"))?;
                    model
                        .functions()
                        .iter()
                        .find(|f| f.entry_address == address)
                        .map(|f| f.entry)
                        .ok_or_else(|| anyhow!("No function starts at {address}"))?
                }
            };
            let f = model.function_by_entry(entry).ok_or_else(|| anyhow!("No function starts at '{wanted}'"))?;
            vec![f]
        }
    };

    for (i, f) in selected.iter().enumerate() {
        if i > 0 {
            println!();
        }
        if let Some(reason) = &f.partial_reason {
            println!("; partial: {reason}");
        }
        for line in model.disassemble(f) {
            println!("{line}");
        }
    }
    Ok(())
}

/// List recorded analysis runs.
pub fn list_runs_command(root: &str, rom: Option<&str>, json: bool) -> Result<()> {
    let layout = ProjectLayout::new(canonicalize_or_current(root)?);
    let (_config, _db_path, db) = open_project_db(&layout)?;
    let runs = db.list_runs(rom).context("Failed to list analysis runs")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&runs).context("Failed to serialize runs to JSON")?);
        return Ok(());
    }

    println!("Analysis runs ({}):", runs.len());
    if runs.is_empty() {
        println!("  (none)");
        return Ok(());
    }
    for run in runs {
        let r = &run.record;
        println!(
            "  - #{} {} [{}] mapping={} regions={} functions={} finished={}",
            run.id,
            r.rom,
            r.status.as_str(),
            r.mapping.as_deref().unwrap_or("-"),
            r.region_count,
            r.function_count,
            r.finished_at
        );
    }
    Ok(())
}

/// Show the stored regions of the latest successful run of a ROM.
pub fn regions_command(root: &str, rom: &str, json: bool) -> Result<()> {
    let layout = ProjectLayout::new(canonicalize_or_current(root)?);
    let (_config, _db_path, db) = open_project_db(&layout)?;
    let run_id = db
        .latest_run_id(rom)
        .context("Failed to query analysis runs")?
        .ok_or_else(|| anyhow!("No successful analysis run recorded for '{rom}'"))?;
    let regions = db.load_run_regions(run_id).context("Failed to load regions")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&regions).context("Failed to serialize regions")?);
        return Ok(());
    }

    println!("Regions of run #{} ({}):", run_id, regions.len());
    for r in regions {
        println!(
            "  {:06X}-{:06X} {:<14} conf={:.2} entropy={:.2} [{}]",
            r.start,
            r.end,
            r.kind.name(),
            r.confidence,
            r.entropy,
            r.evidence.join(",")
        );
    }
    Ok(())
}

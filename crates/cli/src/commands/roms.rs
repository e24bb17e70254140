use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use romscope_core::db::{ProjectLayout, RomRecord};
use romscope_core::image::{LoadOptions, RomImage};
use serde::Serialize;

use crate::commands::{open_project_db, parse_mode, resolve_rom};
use crate::{canonicalize_or_current, sha256_file};

/// Register a ROM image in the project database.
pub fn add_rom_command(root: &str, path: &str, name: Option<String>, skip_hash: bool) -> Result<()> {
    let root_path = canonicalize_or_current(root)?;
    let layout = ProjectLayout::new(&root_path);
    let (_config, db_path, db) = open_project_db(&layout)?;

    let input_path = Path::new(path);
    let abs_path = if input_path.is_absolute() {
        input_path.to_path_buf()
    } else {
        root_path.join(input_path)
    };

    if !abs_path.exists() {
        return Err(anyhow!("ROM file does not exist: {}", abs_path.display()));
    }

    // Store path relative to project root when possible.
    let rel_path = abs_path
        .canonicalize()
        .ok()
        .and_then(|abs_canon| {
            root_path.canonicalize().ok().and_then(|root_canon| {
                abs_canon.strip_prefix(&root_canon).ok().map(|p| p.to_path_buf())
            })
        })
        .or_else(|| abs_path.strip_prefix(&root_path).ok().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| abs_path.clone());

    let rom = RomImage::load(&abs_path, &LoadOptions::default())
        .with_context(|| format!("Failed to load ROM image {}", abs_path.display()))?;

    let rom_name = name.unwrap_or_else(|| {
        input_path.file_stem().and_then(|os| os.to_str()).unwrap_or(path).to_string()
    });
    if db.rom_by_name(&rom_name).context("Failed to query ROMs")?.is_some() {
        return Err(anyhow!("A ROM named '{rom_name}' is already registered"));
    }

    let sha256 = if skip_hash { None } else { Some(sha256_file(&abs_path)?) };
    let size = std::fs::metadata(&abs_path).map(|m| m.len()).ok();

    let record = RomRecord {
        name: rom_name,
        path: rel_path.to_string_lossy().to_string(),
        sha256,
        size,
        mapping: Some(rom.mode().to_string()),
        title: rom.header().map(|h| h.title.clone()).filter(|t| !t.is_empty()),
    };

    let id = db.insert_rom(&record).context("Failed to insert ROM record")?;

    println!("Added ROM:");
    println!("  Id: {}", id);
    println!("  Name: {}", record.name);
    println!("  Path (relative): {}", record.path);
    println!("  Mapping: {} (confidence {:.2})", rom.mode(), rom.mapping_confidence());
    println!("  DB: {}", db_path.display());

    Ok(())
}

/// List all ROMs registered in the project database.
pub fn list_roms_command(root: &str, json: bool) -> Result<()> {
    let root_path = canonicalize_or_current(root)?;
    let layout = ProjectLayout::new(&root_path);
    let (_config, _db_path, db) = open_project_db(&layout)?;

    let roms = db.list_roms().context("Failed to list ROMs")?;

    if json {
        let serialized = serde_json::to_string_pretty(&roms).context("Failed to serialize ROMs to JSON")?;
        println!("{}", serialized);
        return Ok(());
    }

    println!("ROMs ({}):", roms.len());
    if roms.is_empty() {
        println!("  (none)");
        return Ok(());
    }
    for rom in roms {
        println!(
            "  - {} [{}] path={} sha256={}",
            rom.name,
            rom.mapping.as_deref().unwrap_or("-"),
            rom.path,
            rom.sha256.as_deref().unwrap_or("-")
        );
    }

    Ok(())
}

#[derive(Serialize)]
struct HeaderReport<'a> {
    size: usize,
    copier_header: Option<usize>,
    mode: String,
    mapping_confidence: f64,
    mapping_error: Option<String>,
    header: Option<&'a romscope_core::image::RomHeader>,
    vectors: Vec<VectorReport>,
}

#[derive(Serialize)]
struct VectorReport {
    label: String,
    target: String,
    offset: usize,
}

/// Which image a command works on: a file, or a ROM registered in a project.
pub fn image_path(root: &str, path: Option<&str>, rom: Option<&str>) -> Result<PathBuf> {
    match (path, rom) {
        (Some(path), None) => Ok(PathBuf::from(path)),
        (None, Some(name)) => {
            let layout = ProjectLayout::new(canonicalize_or_current(root)?);
            let (_config, _db_path, db) = open_project_db(&layout)?;
            Ok(resolve_rom(&db, &layout, name)?.1)
        }
        (Some(_), Some(_)) => Err(anyhow!("Pass either --path or --rom, not both")),
        (None, None) => Err(anyhow!("Pass --path <file> or --rom <name>")),
    }
}

/// Print the mapping decision, internal header and interrupt vectors.
pub fn header_command(
    root: &str,
    path: Option<&str>,
    rom_name: Option<&str>,
    mode: Option<&str>,
    json: bool,
) -> Result<()> {
    let path = image_path(root, path, rom_name)?;
    let options = LoadOptions { mode: mode.map(parse_mode).transpose()? };
    let rom = RomImage::load(&path, &options).with_context(|| format!("Failed to load ROM image {}", path.display()))?;

    let vectors: Vec<VectorReport> = rom
        .vectors()
        .iter()
        .map(|v| VectorReport { label: v.label(), target: v.target.to_string(), offset: v.offset })
        .collect();

    if json {
        let report = HeaderReport {
            size: rom.len(),
            copier_header: rom.copier_header(),
            mode: rom.mode().to_string(),
            mapping_confidence: rom.mapping_confidence(),
            mapping_error: rom.mapping_error().map(|e| e.to_string()),
            header: rom.header(),
            vectors,
        };
        println!("{}", serde_json::to_string_pretty(&report).context("Failed to serialize header report")?);
        return Ok(());
    }

    println!("Image: {}", path.display());
    println!("  Size: {:#X} bytes", rom.len());
    if let Some(skipped) = rom.copier_header() {
        println!("  Copier header: {} bytes stripped", skipped);
    }
    println!("  Mapping: {} (confidence {:.2})", rom.mode(), rom.mapping_confidence());
    if let Some(err) = rom.mapping_error() {
        println!("  Mapping warning: {err}");
    }
    match rom.header() {
        Some(h) => {
            println!("  Title: {}", h.title);
            println!("  Map mode: ${:02X}  Cartridge: ${:02X}  ROM size: ${:02X}", h.map_mode, h.cartridge_type, h.rom_size);
            println!(
                "  Checksum: ${:04X}  Complement: ${:04X} ({})",
                h.checksum,
                h.complement,
                if h.checksum_pair_valid() { "valid" } else { "invalid" }
            );
        }
        None => println!("  Header: (none)"),
    }
    println!("Vectors ({}):", vectors.len());
    for v in vectors {
        println!("  - {:<12} {}", v.label, v.target);
    }
    Ok(())
}

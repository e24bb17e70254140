use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use romscope_core::db::{ProjectConfig, ProjectDb, ProjectLayout, RomRecord};
use romscope_core::mapping::MappingMode;
use romscope_core::services::AnalysisProfile;

use crate::sha256_bytes;

/// Resolve the DB path (respecting relative/absolute config) and open a ProjectDb (delegates to core helper).
pub fn open_project_db(layout: &ProjectLayout) -> Result<(ProjectConfig, PathBuf, ProjectDb)> {
    romscope_core::db::open_project_db(layout)
}

/// Helper to print whether a directory exists.
pub fn print_dir_status(label: &str, path: &Path) {
    let exists = path.is_dir();
    println!("- {label}: {} ({})", if exists { "OK" } else { "MISSING" }, path.display());
}

/// Load the profile to analyse with: `--profile` first, then the project
/// default, then the built-in defaults. `--mode` overrides the profile.
pub fn load_profile(
    explicit: Option<&str>,
    layout: Option<&ProjectLayout>,
    config: Option<&ProjectConfig>,
    mode: Option<&str>,
) -> Result<AnalysisProfile> {
    let path = match (explicit, layout, config.and_then(|c| c.default_profile.as_deref())) {
        (Some(p), _, _) => Some(PathBuf::from(p)),
        (None, Some(layout), Some(default)) => Some(layout.resolve(default)),
        _ => None,
    };
    let mut profile = match path {
        Some(path) => AnalysisProfile::load(&path)
            .with_context(|| format!("Failed to load analysis profile {}", path.display()))?,
        None => AnalysisProfile::default(),
    };
    if let Some(mode) = mode {
        profile.mapping = Some(parse_mode(mode)?);
    }
    Ok(profile)
}

pub fn parse_mode(mode: &str) -> Result<MappingMode> {
    mode.parse::<MappingMode>().map_err(|e| anyhow!("Invalid --mode '{mode}': {e}"))
}

/// Stable hash of a profile, recorded with each run.
pub fn profile_hash(profile: &AnalysisProfile) -> Result<String> {
    let yaml = profile.to_yaml().context("Failed to serialize analysis profile")?;
    Ok(sha256_bytes(yaml.as_bytes()))
}

/// Look up a registered ROM and resolve its path against the project root.
pub fn resolve_rom(db: &ProjectDb, layout: &ProjectLayout, name: &str) -> Result<(RomRecord, PathBuf)> {
    let record = db
        .rom_by_name(name)
        .context("Failed to query ROMs")?
        .ok_or_else(|| anyhow!("ROM '{name}' is not registered in this project"))?;
    let path = layout.resolve(&record.path);
    Ok((record, path))
}

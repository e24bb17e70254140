use std::fs;

use anyhow::{Context, Result};
use romscope_core::db::{write_project_config, ProjectConfig, ProjectContext, ProjectDb, ProjectLayout, ProjectSnapshot};
use romscope_core::services::AnalysisProfile;
use serde::Serialize;

use crate::commands::print_dir_status;
use crate::{canonicalize_or_current, infer_project_name};

#[derive(Serialize)]
pub struct ProjectInfoSnapshot {
    pub root: String,
    pub config_file: String,
    pub db_path: String,
    pub layout: ProjectInfoLayout,
    #[serde(flatten)]
    pub snapshot: ProjectSnapshot,
}

#[derive(Serialize)]
pub struct ProjectInfoLayout {
    pub meta_dir: String,
    pub profiles_dir: String,
    pub outputs_dir: String,
}

const DEFAULT_PROFILE_FILE: &str = "default.yaml";

/// Initialize a new project at `root`.
pub fn init_project_command(root: &str, name: Option<String>) -> Result<()> {
    let root_path = canonicalize_or_current(root)?;
    let layout = ProjectLayout::new(&root_path);

    let project_name = match name {
        Some(n) => n,
        None => infer_project_name(&root_path),
    };

    fs::create_dir_all(&layout.meta_dir)
        .with_context(|| format!("Failed to create meta dir: {}", layout.meta_dir.display()))?;
    fs::create_dir_all(&layout.profiles_dir)
        .with_context(|| format!("Failed to create profiles dir: {}", layout.profiles_dir.display()))?;
    fs::create_dir_all(&layout.outputs_roms_dir).with_context(|| {
        format!("Failed to create per-ROM outputs dir: {}", layout.outputs_roms_dir.display())
    })?;

    // Starter profile with every default spelled out, ready for editing.
    let profile_path = layout.profiles_dir.join(DEFAULT_PROFILE_FILE);
    if !profile_path.exists() {
        let yaml = AnalysisProfile::default().to_yaml().context("Failed to serialize default profile")?;
        fs::write(&profile_path, yaml)
            .with_context(|| format!("Failed to write default profile: {}", profile_path.display()))?;
    }

    let config = ProjectConfig::new(&project_name, layout.db_path_relative_string())
        .with_default_profile(format!("profiles/{DEFAULT_PROFILE_FILE}"));
    write_project_config(&layout, &config)?;

    // Create the database now so later commands can rely on it.
    ProjectDb::open(&layout.db_path).with_context(|| {
        format!("Failed to initialize project database at {}", layout.db_path.display())
    })?;

    println!("Initialized romscope project:");
    println!("  Name: {}", project_name);
    println!("  Root: {}", layout.root.display());
    println!("  Config: {}", layout.project_config_path.display());
    println!("  DB path (relative): {}", config.db.path);
    println!("  Profiles dir: {}", layout.profiles_dir.display());
    println!("  Default profile: {}", profile_path.display());
    println!("  Outputs dir: {}", layout.outputs_dir.display());

    Ok(())
}

/// Show basic information about an existing project.
pub fn project_info_command(root: &str, json: bool) -> Result<()> {
    let root_path = canonicalize_or_current(root)?;
    let ctx = ProjectContext::from_root(&root_path)?;
    let snapshot = ctx.snapshot()?;
    let layout = &ctx.layout;

    if json {
        let info = ProjectInfoSnapshot {
            root: layout.root.display().to_string(),
            config_file: layout.project_config_path.display().to_string(),
            db_path: ctx.db_path.display().to_string(),
            layout: ProjectInfoLayout {
                meta_dir: layout.meta_dir.display().to_string(),
                profiles_dir: layout.profiles_dir.display().to_string(),
                outputs_dir: layout.outputs_dir.display().to_string(),
            },
            snapshot,
        };
        println!("{}", serde_json::to_string_pretty(&info).context("Failed to serialize project info")?);
        return Ok(());
    }

    println!("romscope Project Info");
    println!("=====================");
    let config = &snapshot.config;
    println!("Name: {}", config.name);
    println!("Root: {}", layout.root.display());
    println!("Config file: {}", layout.project_config_path.display());
    println!("Config version: {}", config.config_version);
    println!("Core version: {}", romscope_core::version());
    println!("DB path (config): {}", config.db.path);
    println!("Default profile: {}", config.default_profile.as_deref().unwrap_or("(built-in)"));
    println!("ROMs: {}", snapshot.roms.len());
    println!("Analysis runs: {}", snapshot.run_count);
    println!();

    println!("Directories:");
    print_dir_status("Meta dir (.romscope)", &layout.meta_dir);
    print_dir_status("Profiles dir", &layout.profiles_dir);
    print_dir_status("Outputs dir", &layout.outputs_dir);

    Ok(())
}

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::db::{ProjectConfig, ProjectDb, ProjectLayout};

pub fn load_project_config(layout: &ProjectLayout) -> Result<ProjectConfig> {
    let text = std::fs::read_to_string(&layout.project_config_path).with_context(|| {
        format!(
            "Failed to read project config at {} (run `romscope init-project` first)",
            layout.project_config_path.display()
        )
    })?;
    serde_json::from_str(&text).context("Failed to parse project config JSON")
}

pub fn write_project_config(layout: &ProjectLayout, config: &ProjectConfig) -> Result<()> {
    let json = serde_json::to_string_pretty(config).context("Failed to serialize project config")?;
    std::fs::write(&layout.project_config_path, json).with_context(|| {
        format!("Failed to write project config: {}", layout.project_config_path.display())
    })
}

/// Open the database the config points at; relative paths are taken from the project root.
pub fn open_project_db(layout: &ProjectLayout) -> Result<(ProjectConfig, PathBuf, ProjectDb)> {
    let config = load_project_config(layout)?;
    let db_path = layout.resolve(&config.db.path);
    let db = ProjectDb::open(&db_path)
        .with_context(|| format!("Failed to open project database at {}", db_path.display()))?;
    Ok((config, db_path, db))
}

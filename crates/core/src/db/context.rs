use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::db::{open_project_db, ProjectConfig, ProjectDb, ProjectLayout, ProjectSnapshot};

/// An opened project: where it lives, how it is configured and its database.
#[derive(Debug)]
pub struct ProjectContext {
    pub layout: ProjectLayout,
    pub config: ProjectConfig,
    pub db_path: PathBuf,
    pub db: ProjectDb,
}

impl ProjectContext {
    pub fn from_root(root: impl AsRef<Path>) -> Result<Self> {
        let layout = ProjectLayout::new(root);
        let (config, db_path, db) = open_project_db(&layout)?;
        Ok(Self { layout, config, db_path, db })
    }

    /// Config, registered ROMs and the number of recorded runs.
    pub fn snapshot(&self) -> Result<ProjectSnapshot> {
        let roms = self.db.list_roms().context("Failed to list ROMs")?;
        let run_count = self.db.list_runs(None).context("Failed to list analysis runs")?.len();
        Ok(ProjectSnapshot { config: self.config.clone(), roms, run_count })
    }
}

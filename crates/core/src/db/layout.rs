use std::path::{Path, PathBuf};

/// Logical layout of a project on disk.
///
/// Derived from a root path. It does *not* perform any IO itself; frontends
/// create the directories and files.
#[derive(Debug, Clone)]
pub struct ProjectLayout {
    pub root: PathBuf,
    /// Internal metadata (.romscope).
    pub meta_dir: PathBuf,
    /// Project config file (JSON).
    pub project_config_path: PathBuf,
    pub db_path: PathBuf,
    /// Analysis profiles (profiles).
    pub profiles_dir: PathBuf,
    /// Exported models and listings (outputs).
    pub outputs_dir: PathBuf,
    /// Per-ROM output artifacts (outputs/roms).
    pub outputs_roms_dir: PathBuf,
}

impl ProjectLayout {
    /// Compute the default layout for a project rooted at `root`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let meta_dir = root.join(".romscope");
        let project_config_path = meta_dir.join("project.json");
        let db_path = meta_dir.join("project.db");
        let profiles_dir = root.join("profiles");
        let outputs_dir = root.join("outputs");
        let outputs_roms_dir = outputs_dir.join("roms");

        Self { root, meta_dir, project_config_path, db_path, profiles_dir, outputs_dir, outputs_roms_dir }
    }

    /// Database path as stored in `ProjectConfig`: relative to `root` when possible.
    pub fn db_path_relative_string(&self) -> String {
        match self.db_path.strip_prefix(&self.root) {
            Ok(rel) => rel.to_string_lossy().to_string(),
            Err(_) => self.db_path.to_string_lossy().to_string(),
        }
    }

    pub fn rom_output_root(&self, rom_name: &str) -> PathBuf {
        self.outputs_roms_dir.join(rom_name)
    }

    /// Resolve a path recorded relative to the project root.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

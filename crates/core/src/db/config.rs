use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    /// SQLite file, relative to the project root unless absolute.
    pub path: String,
}

impl DbConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// Contents of `.romscope/project.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    pub description: Option<String>,
    /// Version of this file's format.
    pub config_version: String,
    pub db: DbConfig,
    /// Profile `analyze` uses when none is passed, relative to the project root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_profile: Option<String>,
}

impl ProjectConfig {
    pub fn new(name: impl Into<String>, db_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            config_version: "0.1.0".to_string(),
            db: DbConfig::new(db_path),
            default_profile: None,
        }
    }

    pub fn with_default_profile(mut self, path: impl Into<String>) -> Self {
        self.default_profile = Some(path.into());
        self
    }
}

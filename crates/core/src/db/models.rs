use serde::{Deserialize, Serialize};

/// A ROM image known to the project.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RomRecord {
    /// Project-unique name (e.g. "smw-us").
    pub name: String,
    /// Path to the image, relative to the project root if possible.
    pub path: String,
    /// SHA-256 of the file as added, hex encoded.
    pub sha256: Option<String>,
    /// Image size in bytes, copier header included.
    pub size: Option<u64>,
    /// Mapping mode detected when the ROM was added.
    pub mapping: Option<String>,
    /// Internal header title, if the header was readable.
    pub title: Option<String>,
}

impl RomRecord {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self { name: name.into(), path: path.into(), sha256: None, size: None, mapping: None, title: None }
    }
}

/// A high-level snapshot of project metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    pub config: crate::db::ProjectConfig,
    pub roms: Vec<RomRecord>,
    pub run_count: usize,
}

/// Allowed status values for analysis runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "running" => Ok(RunStatus::Running),
            "succeeded" => Ok(RunStatus::Succeeded),
            "failed" => Ok(RunStatus::Failed),
            "cancelled" | "canceled" => Ok(RunStatus::Cancelled),
            other => Err(format!("unknown run status '{other}'")),
        }
    }
}

/// Bookkeeping for one analysis of one ROM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisRunRecord {
    pub rom: String,
    /// Hash of the serialized profile the run used.
    pub profile_hash: String,
    pub mapping: Option<String>,
    pub mapping_confidence: Option<f64>,
    pub status: RunStatus,
    pub region_count: usize,
    pub function_count: usize,
    pub started_at: String,
    pub finished_at: String,
}

/// A run as read back from the database.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredRun {
    pub id: i64,
    #[serde(flatten)]
    pub record: AnalysisRunRecord,
}

/// Persisted summary of a discovered function; instructions are not stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FunctionSummary {
    pub entry: usize,
    pub address: String,
    pub end: usize,
    pub instruction_count: usize,
    pub stack_delta: i32,
    pub partial: bool,
    pub partial_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_status_round_trips_through_text() {
        for status in [RunStatus::Running, RunStatus::Succeeded, RunStatus::Failed, RunStatus::Cancelled] {
            assert_eq!(status.as_str().parse::<RunStatus>(), Ok(status));
        }
        assert_eq!("CANCELED".parse::<RunStatus>(), Ok(RunStatus::Cancelled));
        assert!("stubbed".parse::<RunStatus>().is_err());
    }
}

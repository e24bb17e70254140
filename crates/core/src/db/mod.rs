//! Project database integration and project layout definitions.
//!
//! A project is a directory holding `.romscope/project.json` and a SQLite
//! database that records:
//! - ROM images added to the project
//! - Analysis runs and their outcome
//! - Regions, function summaries, labels and xrefs of successful runs

mod config;
mod context;
mod layout;
mod models;
mod project_db;
mod util;

pub use config::{DbConfig, ProjectConfig};
pub use context::ProjectContext;
pub use layout::ProjectLayout;
pub use models::{AnalysisRunRecord, FunctionSummary, ProjectSnapshot, RomRecord, RunStatus, StoredRun};
pub use project_db::{DbError, DbResult, ProjectDb, CURRENT_SCHEMA_VERSION};
pub use util::{load_project_config, open_project_db, write_project_config};

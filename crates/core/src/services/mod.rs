//! Services that tie the analysis stages to profiles and projects.

pub mod analysis;
pub mod profile;

pub use analysis::{AnalysisPipeline, AnalysisRunner};
pub use profile::{AnalysisProfile, LabelLocation, ManualLabel};

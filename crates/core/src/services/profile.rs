//! Analysis profiles: every tunable of the pipeline in one serializable value.
//!
//! Profiles live in `.yaml`/`.yml` or `.json` files. Missing fields take
//! their defaults, so an empty file is a valid profile.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::analysis::detectors::{PointerConfig, StrideConfig, TextConfig};
use crate::analysis::{EntropyConfig, WalkerConfig};
use crate::error::AnalysisError;
use crate::mapping::MappingMode;
use crate::model::Address;

/// Where a manual label goes: a console address or a linear offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LabelLocation {
    Offset(usize),
    Address(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualLabel {
    #[serde(rename = "address")]
    pub location: LabelLocation,
    pub name: String,
}

impl ManualLabel {
    pub fn parsed_address(&self) -> Result<Option<Address>, AnalysisError> {
        match &self.location {
            LabelLocation::Offset(_) => Ok(None),
            LabelLocation::Address(text) => text
                .parse::<Address>()
                .map(Some)
                .map_err(|e| AnalysisError::Profile(format!("label '{}': {e}", self.name))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisProfile {
    /// Forced mapping mode; detected from the header when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mapping: Option<MappingMode>,
    pub entropy: EntropyConfig,
    pub stride_table: StrideConfig,
    pub pointers: PointerConfig,
    pub text: TextConfig,
    pub walker: WalkerConfig,
    /// Enabled detectors. A detector missing from this list does not run.
    pub detectors: Vec<String>,
    pub labels: Vec<ManualLabel>,
}

impl Default for AnalysisProfile {
    fn default() -> Self {
        Self {
            mapping: None,
            entropy: EntropyConfig::default(),
            stride_table: StrideConfig::default(),
            pointers: PointerConfig::default(),
            text: TextConfig::default(),
            walker: WalkerConfig::default(),
            detectors: vec!["pointer_table".into(), "stride_table".into(), "text_run".into()],
            labels: Vec::new(),
        }
    }
}

impl AnalysisProfile {
    /// Load from a YAML or JSON file, chosen by extension.
    pub fn load(path: &Path) -> Result<Self, AnalysisError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| AnalysisError::Profile(format!("cannot read {}: {e}", path.display())))?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase();
        let profile = match ext.as_str() {
            "yaml" | "yml" => Self::from_yaml(&text)?,
            "json" => Self::from_json(&text)?,
            other => {
                return Err(AnalysisError::Profile(format!(
                    "unsupported profile extension '{other}' (expected yaml, yml or json)"
                )))
            }
        };
        Ok(profile)
    }

    pub fn from_yaml(text: &str) -> Result<Self, AnalysisError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let profile: Self = serde_yaml::from_str(text).map_err(|e| AnalysisError::Profile(e.to_string()))?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn from_json(text: &str) -> Result<Self, AnalysisError> {
        let profile: Self = serde_json::from_str(text).map_err(|e| AnalysisError::Profile(e.to_string()))?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn to_yaml(&self) -> Result<String, AnalysisError> {
        serde_yaml::to_string(self).map_err(|e| AnalysisError::Profile(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        let fail = |msg: &str| Err(AnalysisError::Profile(msg.to_string()));
        if self.entropy.window == 0 {
            return fail("entropy.window must be positive");
        }
        if self.entropy.stride == Some(0) {
            return fail("entropy.stride must be positive");
        }
        if self.entropy.low_threshold >= self.entropy.high_threshold {
            return fail("entropy.low_threshold must be below entropy.high_threshold");
        }
        if self.stride_table.strides.iter().any(|&s| s < 2) {
            return fail("stride_table.strides must all be at least 2");
        }
        if !(0.0..=1.0).contains(&self.pointers.min_plausible) {
            return fail("pointers.min_plausible must be within 0..=1");
        }
        if self.text.min_run == 0 {
            return fail("text.min_run must be positive");
        }
        if self.walker.max_function_bytes == 0 || self.walker.max_instructions == 0 || self.walker.max_blocks == 0 {
            return fail("walker limits must be positive");
        }
        for label in &self.labels {
            label.parsed_address()?;
        }
        Ok(())
    }
}

use std::path::Path;

use chrono::Utc;
use log::{debug, info, warn};

use crate::analysis::detectors::{default_detector_registry, DetectorRegistry, PatternDetector, PatternOutput};
use crate::analysis::entropy::shannon_entropy;
use crate::analysis::{CancellationFlag, ControlFlowWalker, EntropyClassifier, RegionMap};
use crate::db::{AnalysisRunRecord, ProjectContext, RunStatus};
use crate::error::AnalysisError;
use crate::image::{LoadOptions, RomImage};
use crate::model::{Diagnostic, Function, LabelOrigin, Region, RegionKind, Severity};
use crate::project::{ImageInfo, LabelTable, ProjectModel};
use crate::services::profile::{AnalysisProfile, LabelLocation};

pub const CODE_EVIDENCE: &str = "control_flow";
const CODE_CONFIDENCE: f64 = 0.95;
const PARTIAL_CODE_CONFIDENCE: f64 = 0.6;

/// Runs the stages in dependency order over one image.
pub struct AnalysisPipeline {
    profile: AnalysisProfile,
    registry: DetectorRegistry,
    cancel: CancellationFlag,
}

impl AnalysisPipeline {
    /// Pipeline with the built-in detectors the profile enables.
    pub fn new(profile: AnalysisProfile) -> Result<Self, AnalysisError> {
        profile.validate()?;
        let mut registry = default_detector_registry(
            profile.stride_table.clone(),
            profile.pointers.clone(),
            profile.text.clone(),
        );
        for name in &profile.detectors {
            if registry.get(name).is_none() {
                return Err(AnalysisError::Profile(format!(
                    "Unknown detector '{name}'. Available: {}",
                    registry.names().join(", ")
                )));
            }
        }
        registry.retain_names(&profile.detectors);
        Ok(Self { profile, registry, cancel: CancellationFlag::new() })
    }

    /// Pipeline with a caller-supplied detector set.
    pub fn with_registry(profile: AnalysisProfile, registry: DetectorRegistry) -> Self {
        Self { profile, registry, cancel: CancellationFlag::new() }
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Handle that stops the run before its next unit of work.
    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    pub fn profile(&self) -> &AnalysisProfile {
        &self.profile
    }

    pub fn detector_names(&self) -> Vec<String> {
        self.registry.names()
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions { mode: self.profile.mapping }
    }

    /// Load `path` and analyse it.
    pub fn analyze_path(&self, path: &Path) -> Result<(RomImage, ProjectModel), AnalysisError> {
        let rom = RomImage::load(path, &self.load_options())?;
        let model = self.run(&rom)?;
        Ok((rom, model))
    }

    pub fn run(&self, rom: &RomImage) -> Result<ProjectModel, AnalysisError> {
        info!("analysing {:#X}-byte {} image", rom.len(), rom.mode());
        let mut diagnostics: Vec<Diagnostic> = rom.diagnostics().to_vec();

        self.cancel.check("entropy")?;
        let provisional = EntropyClassifier::new(self.profile.entropy.clone()).classify(rom, &self.cancel)?;

        self.cancel.check("patterns")?;
        let patterns = if self.registry.is_empty() {
            PatternOutput { map: provisional, xrefs: Vec::new(), entries: Vec::new(), accepted: 0, rejected: 0 }
        } else {
            PatternDetector::new(&self.registry).refine(rom, provisional, &self.cancel)?
        };

        self.cancel.check("walker")?;
        let manual = self.manual_labels(rom, &mut diagnostics);
        let mut walker = ControlFlowWalker::new(rom, &self.profile.walker).with_labels(manual);
        walker.seed_vectors(&rom.vectors());
        if self.profile.walker.seed_pointer_targets {
            walker.seed_entries(&patterns.entries);
        }
        let walk = walker.run(&self.cancel)?;
        diagnostics.extend(walk.diagnostics);

        let mut map = patterns.map;
        overlay_code(&mut map, rom, &walk.functions);
        map.merge_adjacent();
        if let Err(problem) = map.validate() {
            warn!("region partition is inconsistent: {problem}");
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                source: "partition".into(),
                offset: None,
                message: problem,
            });
        }
        let mapping_confidence = rom.mapping_confidence();
        let mut regions = map.into_regions();
        for region in &mut regions {
            if matches!(region.kind, RegionKind::PointerTable { .. }) {
                region.confidence *= mapping_confidence;
            }
        }

        let mut xrefs = patterns.xrefs;
        xrefs.extend(walk.xrefs);

        let image = ImageInfo {
            size: rom.len(),
            mode: rom.mode(),
            mapping_confidence,
            copier_header: rom.copier_header(),
            title: rom.header().map(|h| h.title.clone()).filter(|t| !t.is_empty()),
        };
        let model = ProjectModel::new(image, regions, walk.functions, walk.labels, xrefs, diagnostics);
        info!(
            "analysis complete: {} regions, {} functions, {} labels, {} xrefs",
            model.regions().len(),
            model.functions().len(),
            model.label_table().len(),
            model.xrefs().len()
        );
        Ok(model)
    }

    fn manual_labels(&self, rom: &RomImage, diagnostics: &mut Vec<Diagnostic>) -> LabelTable {
        let mut table = LabelTable::new();
        for label in &self.profile.labels {
            let resolved = match &label.location {
                LabelLocation::Offset(offset) => rom.address_of(*offset).map(|a| (*offset, a)),
                LabelLocation::Address(_) => label
                    .parsed_address()
                    .ok()
                    .flatten()
                    .and_then(|a| rom.offset_of(a).map(|o| (o, a))),
            };
            match resolved {
                Some((offset, address)) => {
                    table.insert(offset, address, &label.name, LabelOrigin::Manual);
                }
                None => diagnostics.push(Diagnostic::warning(
                    "labels",
                    None,
                    format!("manual label '{}' does not map into the image", label.name),
                )),
            }
        }
        table
    }
}

/// Turn every contiguous run of a function's instructions into a code region.
fn overlay_code(map: &mut RegionMap, rom: &RomImage, functions: &[Function]) {
    for function in functions {
        let base = if function.partial { PARTIAL_CODE_CONFIDENCE } else { CODE_CONFIDENCE };
        let mut runs: Vec<(usize, usize, bool)> = Vec::new();
        for insn in &function.instructions {
            match runs.last_mut() {
                Some((_, end, raw)) if *end == insn.offset => {
                    *end = insn.end();
                    *raw |= insn.is_raw();
                }
                _ => runs.push((insn.offset, insn.end(), insn.is_raw())),
            }
        }
        for (start, end, raw) in runs {
            let mut evidence: Vec<String> = map.region_at(start).map(|r| r.evidence.clone()).unwrap_or_default();
            let mut confidence = base * rom.mapping_confidence();
            if raw {
                confidence *= 0.5;
                evidence.push("decoder:raw".into());
            }
            let mut region = Region::new(start, end, RegionKind::Code, confidence)
                .with_entropy(shannon_entropy(rom.slice(start..end)));
            for name in evidence.into_iter().chain([CODE_EVIDENCE.to_string()]) {
                if !region.evidence.contains(&name) {
                    region.evidence.push(name);
                }
            }
            debug!("code {:#X}..{:#X} from function {}", start, end, function.entry_address);
            map.overlay(region);
        }
    }
}

/// Runs the pipeline for a ROM registered in a project and records the run.
pub struct AnalysisRunner<'a> {
    pub ctx: &'a ProjectContext,
    pub pipeline: &'a AnalysisPipeline,
}

impl<'a> AnalysisRunner<'a> {
    /// Analyse the named ROM. The run is recorded whether it succeeds or
    /// not; per-region details are stored only for successful runs.
    pub fn run(&self, rom_name: &str, rom_path: &Path, profile_hash: &str) -> anyhow::Result<(i64, ProjectModel)> {
        let started_at = Utc::now().to_rfc3339();
        let outcome = self.pipeline.analyze_path(rom_path);
        let finished_at = Utc::now().to_rfc3339();

        let mut record = AnalysisRunRecord {
            rom: rom_name.to_string(),
            profile_hash: profile_hash.to_string(),
            mapping: None,
            mapping_confidence: None,
            status: RunStatus::Failed,
            region_count: 0,
            function_count: 0,
            started_at,
            finished_at,
        };

        match outcome {
            Ok((rom, model)) => {
                record.status = RunStatus::Succeeded;
                record.mapping = Some(rom.mode().to_string());
                record.mapping_confidence = Some(rom.mapping_confidence());
                record.region_count = model.regions().len();
                record.function_count = model.functions().len();
                let run_id = self.ctx.db.insert_run_with_model(&record, &model)?;
                Ok((run_id, model))
            }
            Err(err) => {
                if matches!(err, AnalysisError::Cancelled { .. }) {
                    record.status = RunStatus::Cancelled;
                }
                // Best-effort bookkeeping; the analysis error is what the caller needs.
                let _ = self.ctx.db.insert_analysis_run(&record);
                Err(err.into())
            }
        }
    }
}

//! Pattern detectors that refine provisional entropy regions.
//!
//! Every detector implements [`RegionDetector`]. A detector that is not
//! registered simply does not run; there is no fallback. Findings from all
//! detectors are ranked by confidence, then detector priority, then address,
//! and accepted greedily so that no two accepted findings overlap. Accepted
//! findings are overlaid onto the region they came from, which can only
//! narrow or re-type it: the partition never gains a gap.

mod pointers;
mod stride;
mod text;

use std::cmp::Ordering;

use log::{debug, info};
use rayon::prelude::*;

use super::partition::RegionMap;
use super::CancellationFlag;
use crate::error::AnalysisError;
use crate::image::RomImage;
use crate::model::{CrossReference, Region};

pub use pointers::{PointerConfig, PointerTableDetector};
pub use stride::{StrideConfig, StrideTableDetector};
pub use text::{TextConfig, TextRunDetector};

/// What a detector sees: the image, the provisional map and one region of it.
pub struct DetectionInput<'a> {
    pub rom: &'a RomImage,
    pub map: &'a RegionMap,
    pub region: &'a Region,
}

/// A typed sub-range proposed by a detector.
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub region: Region,
    pub detector: &'static str,
    pub priority: u8,
    /// Edges discovered while detecting (pointer table entries).
    pub xrefs: Vec<CrossReference>,
    /// Offsets that look like code entry points.
    pub entries: Vec<usize>,
}

impl Finding {
    pub fn new(detector: &dyn RegionDetector, region: Region) -> Self {
        Self { region, detector: detector.name(), priority: detector.priority(), xrefs: Vec::new(), entries: Vec::new() }
    }

    fn rank(&self, other: &Self) -> Ordering {
        other
            .region
            .confidence
            .total_cmp(&self.region.confidence)
            .then(other.priority.cmp(&self.priority))
            .then(self.region.start.cmp(&other.region.start))
            .then(self.region.end.cmp(&other.region.end))
    }
}

/// Capability interface for a region detector.
pub trait RegionDetector: Send + Sync {
    fn name(&self) -> &'static str;
    /// Tie-break order when confidences are equal; higher wins.
    fn priority(&self) -> u8;
    /// Findings inside `input.region`. Must not extend past it.
    fn detect(&self, input: &DetectionInput<'_>) -> Vec<Finding>;
}

/// Ordered set of detectors, selected by name.
#[derive(Default)]
pub struct DetectorRegistry {
    detectors: Vec<Box<dyn RegionDetector>>,
}

impl DetectorRegistry {
    pub fn new() -> Self {
        Self { detectors: Vec::new() }
    }

    /// Register a detector, replacing any detector with the same name.
    pub fn register<D: RegionDetector + 'static>(&mut self, detector: D) -> &mut Self {
        self.detectors.retain(|d| d.name() != detector.name());
        self.detectors.push(Box::new(detector));
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn RegionDetector> {
        self.detectors.iter().find(|d| d.name() == name).map(|d| &**d)
    }

    /// Keep only the named detectors.
    pub fn retain_names(&mut self, names: &[String]) {
        self.detectors.retain(|d| names.iter().any(|n| n == d.name()));
    }

    /// Sorted names for help and error messages.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.detectors.iter().map(|d| d.name().to_string()).collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn RegionDetector> {
        self.detectors.iter().map(|d| &**d)
    }
}

/// Registry with the built-in detectors.
pub fn default_detector_registry(
    stride: StrideConfig,
    pointers: PointerConfig,
    text: TextConfig,
) -> DetectorRegistry {
    let mut registry = DetectorRegistry::new();
    registry
        .register(PointerTableDetector::new(pointers))
        .register(StrideTableDetector::new(stride))
        .register(TextRunDetector::new(text));
    registry
}

/// Result of the pattern pass.
#[derive(Debug, Clone)]
pub struct PatternOutput {
    pub map: RegionMap,
    pub xrefs: Vec<CrossReference>,
    /// Likely code entry points, ascending.
    pub entries: Vec<usize>,
    pub accepted: usize,
    pub rejected: usize,
}

pub struct PatternDetector<'r> {
    registry: &'r DetectorRegistry,
}

impl<'r> PatternDetector<'r> {
    pub fn new(registry: &'r DetectorRegistry) -> Self {
        Self { registry }
    }

    pub fn refine(
        &self,
        rom: &RomImage,
        map: RegionMap,
        cancel: &CancellationFlag,
    ) -> Result<PatternOutput, AnalysisError> {
        let candidates: Vec<&Region> = map.regions().iter().filter(|r| r.kind.is_refinable()).collect();

        let per_region: Vec<Vec<Finding>> = candidates
            .par_iter()
            .map(|region| {
                if cancel.is_cancelled() {
                    return Vec::new();
                }
                let input = DetectionInput { rom, map: &map, region };
                self.registry
                    .iter()
                    .flat_map(|detector| detector.detect(&input))
                    .filter(|f| f.region.start >= region.start && f.region.end <= region.end && !f.region.is_empty())
                    .collect()
            })
            .collect();
        cancel.check("patterns")?;

        let mut findings: Vec<Finding> = per_region.into_iter().flatten().collect();
        findings.sort_by(Finding::rank);

        let mut accepted: Vec<Finding> = Vec::new();
        let mut rejected = 0;
        for finding in findings {
            let overlaps = accepted
                .iter()
                .any(|a| finding.region.start < a.region.end && a.region.start < finding.region.end);
            if overlaps {
                rejected += 1;
                continue;
            }
            accepted.push(finding);
        }
        accepted.sort_by_key(|f| f.region.start);

        let mut refined = map.clone();
        let mut xrefs = Vec::new();
        let mut entries = Vec::new();
        for finding in &accepted {
            let mut region = finding.region.clone();
            let mut evidence = map.region_at(region.start).map(|s| s.evidence.clone()).unwrap_or_default();
            for name in region.evidence.drain(..).chain([finding.detector.to_string()]) {
                if !evidence.contains(&name) {
                    evidence.push(name);
                }
            }
            region.evidence = evidence;
            debug!(
                "{} accepted {:#X}..{:#X} as {} ({:.2})",
                finding.detector,
                region.start,
                region.end,
                region.kind.name(),
                region.confidence
            );
            refined.overlay(region);
            xrefs.extend(finding.xrefs.iter().cloned());
            entries.extend(finding.entries.iter().copied());
        }
        entries.sort_unstable();
        entries.dedup();
        xrefs.sort();

        info!("patterns: {} findings accepted, {} rejected", accepted.len(), rejected);
        Ok(PatternOutput { map: refined, xrefs, entries, accepted: accepted.len(), rejected })
    }
}

/// Ratio of `a` to `b`, `0.0` when `b` is zero.
pub(crate) fn ratio(a: usize, b: usize) -> f64 {
    if b == 0 {
        0.0
    } else {
        a as f64 / b as f64
    }
}

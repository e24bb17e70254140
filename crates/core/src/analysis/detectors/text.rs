use serde::{Deserialize, Serialize};

use super::{ratio, DetectionInput, Finding, RegionDetector};
use crate::analysis::entropy::shannon_entropy;
use crate::model::{Region, RegionKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextConfig {
    /// Inclusive byte ranges of the character set.
    pub alphabet: Vec<(u8, u8)>,
    /// Bytes that end a string; a trailing terminator is included in the region.
    pub terminators: Vec<u8>,
    pub min_run: usize,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self { alphabet: vec![(0x20, 0x7E)], terminators: vec![0x00], min_run: 16 }
    }
}

impl TextConfig {
    fn in_alphabet(&self, byte: u8) -> bool {
        self.alphabet.iter().any(|&(lo, hi)| (lo..=hi).contains(&byte))
    }
}

/// Runs of characters from a configured alphabet.
#[derive(Debug, Clone, Default)]
pub struct TextRunDetector {
    config: TextConfig,
}

impl TextRunDetector {
    pub fn new(config: TextConfig) -> Self {
        Self { config }
    }

    /// Longer runs and runs made mostly of letters, digits and spaces score higher.
    fn confidence(&self, run: &[u8]) -> f64 {
        let core = run.iter().filter(|b| b.is_ascii_alphanumeric() || **b == b' ').count();
        0.4 * (run.len() as f64 / 64.0).min(1.0) + 0.5 * ratio(core, run.len())
    }
}

impl RegionDetector for TextRunDetector {
    fn name(&self) -> &'static str {
        "text_run"
    }

    fn priority(&self) -> u8 {
        1
    }

    fn detect(&self, input: &DetectionInput<'_>) -> Vec<Finding> {
        let bytes = input.rom.bytes();
        let (start, end) = (input.region.start, input.region.end.min(bytes.len()));
        let mut findings = Vec::new();
        let mut cursor = start;
        while cursor < end {
            if !self.config.in_alphabet(bytes[cursor]) {
                cursor += 1;
                continue;
            }
            let run_start = cursor;
            while cursor < end && self.config.in_alphabet(bytes[cursor]) {
                cursor += 1;
            }
            let run = &bytes[run_start..cursor];
            // A single repeated character is fill.
            if run.len() < self.config.min_run || run.windows(2).all(|w| w[0] == w[1]) {
                continue;
            }
            let mut run_end = cursor;
            if run_end < end && self.config.terminators.contains(&bytes[run_end]) {
                run_end += 1;
            }
            let region = Region::new(run_start, run_end, RegionKind::Text, self.confidence(run))
                .with_entropy(shannon_entropy(&bytes[run_start..run_end]));
            findings.push(Finding::new(self, region));
            cursor = run_end;
        }
        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_grows_with_length_and_letters() {
        let detector = TextRunDetector::default();
        let words = detector.confidence(b"THE QUICK BROWN FOX JUMPS OVER THE LAZY DOG");
        let symbols = detector.confidence(b"!#%&()*+,-./:;<=>?@[]^_");
        assert!(words > symbols);
        assert!(words <= 0.9);
    }

    #[test]
    fn alphabet_ranges_are_inclusive() {
        let config = TextConfig { alphabet: vec![(0x80, 0x9F)], ..TextConfig::default() };
        assert!(config.in_alphabet(0x80));
        assert!(config.in_alphabet(0x9F));
        assert!(!config.in_alphabet(b'A'));
    }
}

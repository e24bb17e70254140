//! Sliding-window Shannon entropy classification.
//!
//! Each window gets a provisional kind from its entropy band. Windows are
//! independent, so they are measured on the rayon pool in fixed-size batches
//! and collected back in address order before merging.

use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::partition::{absorb, RegionMap};
use super::CancellationFlag;
use crate::error::AnalysisError;
use crate::image::RomImage;
use crate::model::{Region, RegionKind};

pub const EVIDENCE: &str = "entropy";

/// Windows measured between cancellation checks.
const BATCH_WINDOWS: usize = 512;
/// Share of the most common byte above which a low-entropy window is padding.
const PADDING_DOMINANCE: f64 = 0.9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntropyConfig {
    pub window: usize,
    /// Distance between window starts; defaults to `window`.
    pub stride: Option<usize>,
    /// Bits per byte, for a 256-byte window.
    pub low_threshold: f64,
    /// Bits per byte, for a 256-byte window.
    pub high_threshold: f64,
}

impl Default for EntropyConfig {
    fn default() -> Self {
        Self { window: 256, stride: None, low_threshold: 1.0, high_threshold: 7.0 }
    }
}

impl EntropyConfig {
    pub fn stride(&self) -> usize {
        self.stride.unwrap_or(self.window).max(1)
    }

    /// A window of `n < 256` bytes cannot exceed `log2(n)` bits, so both
    /// thresholds shrink with it.
    fn scale(&self) -> f64 {
        let effective = self.window.clamp(2, 256) as f64;
        effective.log2() / 8.0
    }

    pub fn low(&self) -> f64 {
        self.low_threshold * self.scale()
    }

    pub fn high(&self) -> f64 {
        self.high_threshold * self.scale()
    }
}

/// Histogram features of one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    pub start: usize,
    pub end: usize,
    pub entropy: f64,
    pub dominant_byte: u8,
    pub dominant_ratio: f64,
    pub distinct: usize,
    pub zero_ratio: f64,
}

impl WindowStats {
    pub fn measure(bytes: &[u8], start: usize) -> Self {
        let mut histogram = [0usize; 256];
        for &b in bytes {
            histogram[b as usize] += 1;
        }
        let len = bytes.len().max(1) as f64;
        let (dominant_byte, dominant) = histogram
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(&a.0)))
            .map(|(value, count)| (value as u8, *count))
            .unwrap_or((0, 0));
        Self {
            start,
            end: start + bytes.len(),
            entropy: entropy_of(&histogram, bytes.len()),
            dominant_byte,
            dominant_ratio: dominant as f64 / len,
            distinct: histogram.iter().filter(|&&c| c > 0).count(),
            zero_ratio: histogram[0] as f64 / len,
        }
    }
}

/// Shannon entropy in bits per byte, `0.0` for an empty slice.
pub fn shannon_entropy(bytes: &[u8]) -> f64 {
    let mut histogram = [0usize; 256];
    for &b in bytes {
        histogram[b as usize] += 1;
    }
    entropy_of(&histogram, bytes.len())
}

fn entropy_of(histogram: &[usize; 256], total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    histogram
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / total;
            -p * p.log2()
        })
        .sum()
}

#[derive(Debug, Clone, Default)]
pub struct EntropyClassifier {
    config: EntropyConfig,
}

impl EntropyClassifier {
    pub fn new(config: EntropyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EntropyConfig {
        &self.config
    }

    /// Measure every window of the image, in address order.
    ///
    /// Window `i` is classified by the bytes `[i*stride, i*stride + window)`
    /// and owns `[i*stride, (i+1)*stride)`, so the output always tiles the image.
    pub fn measure(&self, rom: &RomImage, cancel: &CancellationFlag) -> Result<Vec<WindowStats>, AnalysisError> {
        let bytes = rom.bytes();
        let stride = self.config.stride();
        let window = self.config.window.max(1);
        let starts: Vec<usize> = (0..bytes.len()).step_by(stride).collect();

        let mut stats = Vec::with_capacity(starts.len());
        for batch in starts.chunks(BATCH_WINDOWS) {
            cancel.check("entropy")?;
            let measured: Vec<WindowStats> = batch
                .par_iter()
                .map(|&start| {
                    let end = (start + window).min(bytes.len());
                    let mut s = WindowStats::measure(&bytes[start..end], start);
                    s.end = (start + stride).min(bytes.len());
                    s
                })
                .collect();
            stats.extend(measured);
        }
        Ok(stats)
    }

    /// Provisional partition of the image.
    pub fn classify(&self, rom: &RomImage, cancel: &CancellationFlag) -> Result<RegionMap, AnalysisError> {
        let stats = self.measure(rom, cancel)?;
        let bytes = rom.bytes();

        let mut regions: Vec<Region> = Vec::new();
        for s in &stats {
            let window_end = (s.start + self.config.window).min(bytes.len());
            let region = self.classify_window(s, &bytes[s.start..window_end]);
            match regions.last_mut() {
                Some(prev) if prev.kind == region.kind => absorb(prev, region),
                _ => regions.push(region),
            }
        }
        for region in &regions {
            debug!(
                "entropy region {:#X}..{:#X} {} ({:.2} bits, confidence {:.2})",
                region.start,
                region.end,
                region.kind.name(),
                region.entropy,
                region.confidence
            );
        }
        info!("entropy: {} windows merged into {} regions", stats.len(), regions.len());
        Ok(RegionMap::from_regions(rom.len(), regions))
    }

    fn classify_window(&self, stats: &WindowStats, bytes: &[u8]) -> Region {
        let (kind, confidence, rule) = if stats.entropy < self.config.low() {
            if stats.dominant_ratio >= PADDING_DOMINANCE {
                (RegionKind::Padding, stats.dominant_ratio, "dominant_byte")
            } else {
                (RegionKind::Data, 0.5, "low_entropy")
            }
        } else if stats.entropy > self.config.high() {
            if looks_like_brr(bytes) {
                (RegionKind::Audio, 0.6, "brr_blocks")
            } else if looks_like_planar_tiles(bytes) {
                (RegionKind::Graphics, 0.5, "planar_tiles")
            } else {
                (RegionKind::Compressed, 0.4, "high_entropy")
            }
        } else {
            (RegionKind::Unknown, 0.0, "mid_entropy")
        };
        Region::new(stats.start, stats.end, kind, confidence)
            .with_entropy(stats.entropy)
            .with_evidence(EVIDENCE)
            .with_evidence(format!("{EVIDENCE}:{rule}"))
    }
}

/// BRR sample data: 9-byte blocks whose header has a shift of at most 12
/// and the end flag clear on all but the last block.
fn looks_like_brr(bytes: &[u8]) -> bool {
    let blocks = bytes.len() / 9;
    if blocks < 8 {
        return false;
    }
    (0..9).any(|phase| {
        let headers: Vec<u8> = bytes[phase..].chunks_exact(9).map(|block| block[0]).collect();
        let good = headers.iter().filter(|&&h| h >> 4 <= 12 && h & 0x01 == 0).count();
        good * 10 >= headers.len() * 9
    })
}

/// Planar tile data: bit-plane pairs of a row (bytes `2r` and `2r+1`) tend
/// to share most of their bits.
fn looks_like_planar_tiles(bytes: &[u8]) -> bool {
    let rows: Vec<(u8, u8)> = bytes.chunks_exact(2).map(|p| (p[0], p[1])).collect();
    if rows.len() < 16 {
        return false;
    }
    let correlated = rows.iter().filter(|(a, b)| (a ^ b).count_ones() <= 2).count();
    correlated * 5 >= rows.len() * 2
}

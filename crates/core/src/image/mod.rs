//! Loading a ROM image: copier-header stripping, header detection and the
//! mapping decision every later stage relies on.

mod header;

use std::fs;
use std::ops::Range;
use std::path::Path;

use log::{debug, warn};

use crate::error::{ImageError, MappingError};
use crate::mapping::{AddressMapper, MappingMode};
use crate::model::{Address, Diagnostic};

pub use header::{compute_checksum, read_vectors, score_candidate, RomHeader, Vector, VectorKind};

/// Smallest stripped image that can carry an internal header.
pub const MIN_IMAGE_SIZE: usize = 0x8000;
pub const COPIER_HEADER_SIZE: usize = 0x200;
/// Header candidates scoring below this are not trusted.
const MIN_HEADER_SCORE: i32 = 4;
const FALLBACK_CONFIDENCE: f64 = 0.3;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadOptions {
    /// Skip detection and use this mode.
    pub mode: Option<MappingMode>,
}

/// An immutable, header-stripped ROM image together with its mapping.
#[derive(Debug, Clone)]
pub struct RomImage {
    bytes: Vec<u8>,
    copier_header: Option<usize>,
    mapper: AddressMapper,
    header: Option<RomHeader>,
    mapping_confidence: f64,
    mapping_error: Option<MappingError>,
    diagnostics: Vec<Diagnostic>,
}

impl RomImage {
    pub fn load(path: &Path, options: &LoadOptions) -> Result<Self, ImageError> {
        let raw = fs::read(path).map_err(|source| ImageError::Io { path: path.to_path_buf(), source })?;
        debug!("read {} bytes from {}", raw.len(), path.display());
        Self::from_bytes(raw, options)
    }

    pub fn from_bytes(mut raw: Vec<u8>, options: &LoadOptions) -> Result<Self, ImageError> {
        let copier_header = if raw.len() % 1024 == COPIER_HEADER_SIZE {
            raw.drain(..COPIER_HEADER_SIZE);
            Some(COPIER_HEADER_SIZE)
        } else {
            None
        };
        if raw.len() < MIN_IMAGE_SIZE {
            return Err(ImageError::CorruptImage { size: raw.len(), minimum: MIN_IMAGE_SIZE });
        }

        let mut diagnostics = Vec::new();
        let (mode, mut confidence, mut mapping_error) = match options.mode {
            Some(mode) => (mode, 1.0, None),
            None => detect_mode(&raw),
        };
        if let Some(err) = &mapping_error {
            warn!("{err}; continuing with {mode} at low confidence");
        }

        let mapper = AddressMapper::new(mode, raw.len());
        if let Err(err) = mapper.validate() {
            warn!("{err}");
            confidence *= 0.5;
            mapping_error.get_or_insert(err);
        }
        if let Some(err) = &mapping_error {
            diagnostics.push(Diagnostic::warning("mapping", None, err.to_string()));
        }

        let header = RomHeader::read(&raw, mode);
        if let Some(header) = &header {
            let actual = compute_checksum(&raw);
            if header.checksum_pair_valid() && actual != header.checksum {
                diagnostics.push(Diagnostic::warning(
                    "header",
                    Some(header.offset),
                    format!("checksum mismatch: header says {:#06X}, image sums to {actual:#06X}", header.checksum),
                ));
            }
        }

        debug!(
            "image: {} bytes, mode {mode}, confidence {confidence:.2}, copier header {}",
            raw.len(),
            copier_header.is_some()
        );
        Ok(Self {
            bytes: raw,
            copier_header,
            mapper,
            header,
            mapping_confidence: confidence,
            mapping_error,
            diagnostics,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn slice(&self, range: Range<usize>) -> &[u8] {
        let end = range.end.min(self.bytes.len());
        &self.bytes[range.start.min(end)..end]
    }

    pub fn mapper(&self) -> &AddressMapper {
        &self.mapper
    }

    pub fn mode(&self) -> MappingMode {
        self.mapper.mode()
    }

    /// Size of the stripped copier header, if one was present.
    pub fn copier_header(&self) -> Option<usize> {
        self.copier_header
    }

    pub fn header(&self) -> Option<&RomHeader> {
        self.header.as_ref()
    }

    /// How much the mapping decision can be trusted, in `[0, 1]`.
    pub fn mapping_confidence(&self) -> f64 {
        self.mapping_confidence
    }

    pub fn mapping_error(&self) -> Option<&MappingError> {
        self.mapping_error.as_ref()
    }

    /// Problems found while loading.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn vectors(&self) -> Vec<Vector> {
        read_vectors(&self.bytes, &self.mapper)
    }

    pub fn read_u8(&self, offset: usize) -> Option<u8> {
        self.bytes.get(offset).copied()
    }

    pub fn read_u16(&self, offset: usize) -> Option<u16> {
        let bytes = self.bytes.get(offset..offset + 2)?;
        Some(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u24(&self, offset: usize) -> Option<u32> {
        let bytes = self.bytes.get(offset..offset + 3)?;
        Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]))
    }

    pub fn address_of(&self, offset: usize) -> Option<Address> {
        self.mapper.to_address(offset).ok()
    }

    pub fn offset_of(&self, address: Address) -> Option<usize> {
        self.mapper.resolve(address)
    }
}

fn detect_mode(bytes: &[u8]) -> (MappingMode, f64, Option<MappingError>) {
    let mut scored: Vec<(MappingMode, i32)> = MappingMode::ALL
        .iter()
        .filter(|&&mode| mode != MappingMode::ExHiRom || bytes.len() > 0x40_0000)
        .filter_map(|&mode| score_candidate(bytes, mode).map(|score| (mode, score)))
        .collect();
    for (mode, score) in &scored {
        debug!("header candidate {mode}: score {score}");
    }
    // Stable sort keeps LoROM ahead of HiROM on equal scores.
    scored.sort_by(|a, b| b.1.cmp(&a.1));

    let fallback = |reason: &str| {
        let err = MappingError::InvalidMapping {
            mode: MappingMode::LoRom,
            size: bytes.len(),
            reason: reason.to_string(),
        };
        (MappingMode::LoRom, FALLBACK_CONFIDENCE, Some(err))
    };

    match scored.as_slice() {
        [(mode, best), rest @ ..] if *best >= MIN_HEADER_SCORE => {
            if rest.first().is_some_and(|(_, second)| second == best) {
                return fallback("header candidates are ambiguous");
            }
            let confidence = (f64::from(*best) / 10.0).clamp(0.5, 1.0);
            (*mode, confidence, None)
        }
        _ => fallback("no plausible internal header"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_image_is_corrupt() {
        let err = RomImage::from_bytes(vec![0; 0x4000], &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, ImageError::CorruptImage { size: 0x4000, .. }));
    }

    #[test]
    fn copier_header_is_stripped_before_size_check() {
        let err = RomImage::from_bytes(vec![0; 0x7E00 + COPIER_HEADER_SIZE], &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, ImageError::CorruptImage { size: 0x7E00, .. }));
    }

    #[test]
    fn blank_image_falls_back_to_lorom() {
        let rom = RomImage::from_bytes(vec![0; 0x8000], &LoadOptions::default()).unwrap();
        assert_eq!(rom.mode(), MappingMode::LoRom);
        assert!(rom.mapping_confidence() < 0.5);
        assert!(rom.mapping_error().is_some());
        assert!(rom.vectors().is_empty());
    }

    #[test]
    fn forced_mode_is_used_and_validated() {
        let rom = RomImage::from_bytes(
            vec![0; 0x18000],
            &LoadOptions { mode: Some(MappingMode::HiRom) },
        )
        .unwrap();
        assert_eq!(rom.mode(), MappingMode::HiRom);
        assert!(matches!(rom.mapping_error(), Some(MappingError::InvalidMapping { .. })));
        assert_eq!(rom.mapping_confidence(), 0.5);
    }
}

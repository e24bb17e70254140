use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{ratio, DetectionInput, Finding, RegionDetector};
use crate::analysis::entropy::shannon_entropy;
use crate::model::{Address, CrossReference, Region, RegionKind, XrefKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointerConfig {
    pub min_entries_16: usize,
    pub min_entries_24: usize,
    /// Share of entries that must resolve to plausible targets.
    pub min_plausible: f64,
}

impl Default for PointerConfig {
    fn default() -> Self {
        Self { min_entries_16: 6, min_entries_24: 4, min_plausible: 0.75 }
    }
}

/// Arrays of 16-bit (same bank) or 24-bit addresses into the image.
#[derive(Debug, Clone, Default)]
pub struct PointerTableDetector {
    config: PointerConfig,
}

struct Candidate {
    width: usize,
    entries: Vec<Option<(Address, usize)>>,
    plausible: usize,
}

/// First bytes of typical subroutine prologues.
const CODE_STARTS: [u8; 16] =
    [0x08, 0x0B, 0x8B, 0x48, 0xDA, 0x5A, 0xC2, 0xE2, 0xA9, 0xAD, 0xA2, 0xA0, 0x20, 0x22, 0x9C, 0x64];

impl PointerTableDetector {
    pub fn new(config: PointerConfig) -> Self {
        Self { config }
    }

    fn min_entries(&self, width: usize) -> usize {
        if width == 3 {
            self.config.min_entries_24
        } else {
            self.config.min_entries_16
        }
    }

    /// Resolve one table entry to a target that is worth pointing at.
    /// Targets may sit anywhere in the region except inside the table itself.
    fn plausible_target(
        &self,
        input: &DetectionInput<'_>,
        table_start: usize,
        entry_at: usize,
        width: usize,
    ) -> Option<(Address, usize)> {
        let rom = input.rom;
        let address = if width == 3 {
            Address::from_u24(rom.read_u24(entry_at)?)
        } else {
            let bank = rom.address_of(entry_at)?.bank;
            Address::new(bank, rom.read_u16(entry_at)?)
        };
        let offset = rom.offset_of(address)?;
        if (table_start..entry_at + width).contains(&offset) {
            return None;
        }
        if matches!(rom.read_u8(offset), None | Some(0x00) | Some(0xFF)) {
            return None;
        }
        if input.map.region_at(offset).is_some_and(|r| r.kind == RegionKind::Padding) {
            return None;
        }
        Some((address, offset))
    }

    fn run_at(&self, input: &DetectionInput<'_>, start: usize, end: usize, width: usize) -> Option<Candidate> {
        let mut entries = Vec::new();
        let mut plausible = 0;
        let mut at = start;
        while at + width <= end {
            let target = self.plausible_target(input, start, at, width);
            if target.is_some() {
                plausible += 1;
            } else if ratio(plausible, entries.len() + 1) < self.config.min_plausible {
                break;
            }
            entries.push(target);
            at += width;
        }
        // Entries that point forward into later entries of the same table.
        let table_end = start + entries.len() * width;
        for entry in entries.iter_mut() {
            if entry.is_some_and(|(_, offset)| (start..table_end).contains(&offset)) {
                *entry = None;
                plausible -= 1;
            }
        }
        while matches!(entries.last(), Some(None)) {
            entries.pop();
        }
        if entries.len() < self.min_entries(width) || ratio(plausible, entries.len()) < self.config.min_plausible {
            return None;
        }

        let targets: BTreeSet<usize> = entries.iter().flatten().map(|(_, offset)| *offset).collect();
        if targets.len() * 2 < entries.len() {
            return None;
        }
        if width == 3 {
            let banks: BTreeSet<u8> = entries.iter().flatten().map(|(a, _)| a.bank).collect();
            if banks.len() > 4 {
                return None;
            }
        }
        Some(Candidate { width, entries, plausible })
    }
}

impl RegionDetector for PointerTableDetector {
    fn name(&self) -> &'static str {
        "pointer_table"
    }

    fn priority(&self) -> u8 {
        3
    }

    fn detect(&self, input: &DetectionInput<'_>) -> Vec<Finding> {
        let rom = input.rom;
        let (start, end) = (input.region.start, input.region.end.min(rom.len()));
        let mut findings = Vec::new();
        let mut cursor = start;
        while cursor < end {
            let candidate = [3, 2].into_iter().filter_map(|w| self.run_at(input, cursor, end, w)).max_by(|a, b| {
                (a.entries.len() * a.width).cmp(&(b.entries.len() * b.width)).then(b.width.cmp(&a.width))
            });
            let Some(table) = candidate else {
                cursor += 1;
                continue;
            };

            let table_end = cursor + table.entries.len() * table.width;
            let confidence = 0.5
                + 0.45 * ratio(table.plausible, table.entries.len()) * (table.entries.len() as f64 / 16.0).min(1.0);
            let kind = RegionKind::PointerTable { entry_width: table.width, entry_count: table.entries.len() };
            let region = Region::new(cursor, table_end, kind, confidence)
                .with_entropy(shannon_entropy(&rom.bytes()[cursor..table_end]));
            let mut finding = Finding::new(self, region);
            for (i, entry) in table.entries.iter().enumerate() {
                let Some((address, offset)) = entry else { continue };
                let from = cursor + i * table.width;
                let Some(from_address) = rom.address_of(from) else { continue };
                finding.xrefs.push(CrossReference {
                    from,
                    from_address,
                    to: Some(*address),
                    to_offset: Some(*offset),
                    kind: XrefKind::PointerTable,
                });
                if rom.read_u8(*offset).is_some_and(|b| CODE_STARTS.contains(&b)) {
                    finding.entries.push(*offset);
                }
            }
            findings.push(finding);
            cursor = table_end;
        }
        findings
    }
}

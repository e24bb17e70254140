//! Internal cartridge header and vector table.

use serde::{Deserialize, Serialize};

use crate::mapping::{AddressMapper, MappingMode};
use crate::model::Address;

pub const HEADER_LEN: usize = 0x40;
pub const TITLE_LEN: usize = 21;

/// Decoded internal header found at the mode's header offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RomHeader {
    /// Mode whose header location this was read from.
    pub mode: MappingMode,
    pub offset: usize,
    pub title: String,
    pub map_mode: u8,
    pub cartridge_type: u8,
    /// `1 << rom_size` KiB.
    pub rom_size: u8,
    pub sram_size: u8,
    pub region: u8,
    pub developer: u8,
    pub version: u8,
    pub complement: u16,
    pub checksum: u16,
}

impl RomHeader {
    /// Parse the header located where `mode` expects it. `None` if the image is too short.
    pub fn read(bytes: &[u8], mode: MappingMode) -> Option<Self> {
        let offset = mode.header_offset();
        let raw = bytes.get(offset..offset + HEADER_LEN)?;
        let word = |at: usize| u16::from_le_bytes([raw[at], raw[at + 1]]);
        let title = raw[..TITLE_LEN]
            .iter()
            .map(|&b| if (0x20..0x7F).contains(&b) { b as char } else { '.' })
            .collect::<String>()
            .trim_end()
            .to_string();
        Some(Self {
            mode,
            offset,
            title,
            map_mode: raw[0x15],
            cartridge_type: raw[0x16],
            rom_size: raw[0x17],
            sram_size: raw[0x18],
            region: raw[0x19],
            developer: raw[0x1A],
            version: raw[0x1B],
            complement: word(0x1C),
            checksum: word(0x1E),
        })
    }

    pub fn checksum_pair_valid(&self) -> bool {
        self.checksum ^ self.complement == 0xFFFF
    }

    /// Declared ROM size in bytes, when the exponent is sane.
    pub fn declared_size(&self) -> Option<usize> {
        (0x07..=0x0D).contains(&self.rom_size).then(|| 0x400usize << self.rom_size)
    }

    /// Mode the map-mode byte claims, if the byte looks like one.
    pub fn declared_mode(&self) -> Option<MappingMode> {
        if self.map_mode & 0xE0 != 0x20 {
            return None;
        }
        MappingMode::from_map_mode_byte(self.map_mode)
    }
}

/// Plausibility score of the header candidate for `mode`.
///
/// Positive evidence: consistent checksum pair, agreeing map-mode byte,
/// printable title, sane size exponent, a reset vector into ROM whose first
/// opcode looks like boot code.
pub fn score_candidate(bytes: &[u8], mode: MappingMode) -> Option<i32> {
    let header = RomHeader::read(bytes, mode)?;
    let mut score = 0;
    if header.checksum_pair_valid() {
        score += 4;
    }
    match header.declared_mode() {
        Some(declared) if declared == mode => score += 3,
        Some(_) => score -= 1,
        None => {}
    }
    let title = &bytes[header.offset..header.offset + TITLE_LEN];
    if title.iter().all(|b| (0x20..0x7F).contains(b)) && title.iter().any(|&b| b != b' ') {
        score += 1;
    }
    if header.declared_size().is_some() {
        score += 1;
    }

    let mapper = AddressMapper::new(mode, bytes.len());
    let reset = read_word(bytes, &mapper, Address::new(0x00, 0xFFFC)).unwrap_or(0);
    if reset >= 0x8000 {
        score += 2;
        if let Some(first) = mapper.resolve(Address::new(0x00, reset)).and_then(|o| bytes.get(o)) {
            match first {
                0x78 | 0x18 | 0xE2 | 0xC2 | 0x4C | 0x5C | 0x9C | 0xA2 | 0xA9 => score += 2,
                0x00 | 0x02 | 0xDB | 0x42 | 0xFF => score -= 2,
                _ => {}
            }
        }
    }
    Some(score)
}

/// Additive 16-bit checksum with the usual mirroring of a non-power-of-two tail.
pub fn compute_checksum(bytes: &[u8]) -> u16 {
    fn sum(bytes: &[u8]) -> u32 {
        bytes.iter().fold(0u32, |acc, &b| acc.wrapping_add(u32::from(b)))
    }
    fn mirrored(bytes: &[u8]) -> u32 {
        let len = bytes.len();
        if len == 0 || len.is_power_of_two() {
            return sum(bytes);
        }
        let base = 1usize << (usize::BITS - 1 - len.leading_zeros());
        let (head, tail) = bytes.split_at(base);
        let repeat = (base / tail.len()).max(1) as u32;
        sum(head).wrapping_add(mirrored(tail).wrapping_mul(repeat))
    }
    (mirrored(bytes) & 0xFFFF) as u16
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorKind {
    Cop,
    Brk,
    Abort,
    Nmi,
    Reset,
    Irq,
}

impl VectorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VectorKind::Cop => "cop",
            VectorKind::Brk => "brk",
            VectorKind::Abort => "abort",
            VectorKind::Nmi => "nmi",
            VectorKind::Reset => "reset",
            VectorKind::Irq => "irq",
        }
    }
}

/// One populated entry of the hardware vector table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vector {
    pub kind: VectorKind,
    /// Taken in emulation mode (`$FFF4-$FFFF`) rather than native mode.
    pub emulation: bool,
    pub target: Address,
    pub offset: usize,
}

impl Vector {
    /// Label name for the handler.
    pub fn label(&self) -> String {
        match (self.kind, self.emulation) {
            (VectorKind::Reset, _) => "vec_reset".to_string(),
            (kind, false) => format!("vec_{}", kind.as_str()),
            (kind, true) => format!("vec_emu_{}", kind.as_str()),
        }
    }
}

const VECTOR_TABLE: [(u16, VectorKind, bool); 10] = [
    (0xFFFC, VectorKind::Reset, true),
    (0xFFEA, VectorKind::Nmi, false),
    (0xFFEE, VectorKind::Irq, false),
    (0xFFE6, VectorKind::Brk, false),
    (0xFFE4, VectorKind::Cop, false),
    (0xFFE8, VectorKind::Abort, false),
    (0xFFFA, VectorKind::Nmi, true),
    (0xFFFE, VectorKind::Irq, true),
    (0xFFF4, VectorKind::Cop, true),
    (0xFFF8, VectorKind::Abort, true),
];

/// Populated vectors, reset first. Empty slots (`$0000`, `$FFFF`) and
/// targets that do not map into ROM are skipped.
pub fn read_vectors(bytes: &[u8], mapper: &AddressMapper) -> Vec<Vector> {
    VECTOR_TABLE
        .iter()
        .filter_map(|&(slot, kind, emulation)| {
            let value = read_word(bytes, mapper, Address::new(0x00, slot))?;
            if value == 0x0000 || value == 0xFFFF {
                return None;
            }
            let target = Address::new(0x00, value);
            let offset = mapper.resolve(target)?;
            Some(Vector { kind, emulation, target, offset })
        })
        .collect()
}

fn read_word(bytes: &[u8], mapper: &AddressMapper, address: Address) -> Option<u16> {
    let offset = mapper.resolve(address)?;
    let lo = *bytes.get(offset)?;
    let hi = *bytes.get(offset + 1)?;
    Some(u16::from_le_bytes([lo, hi]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_mirrors_odd_sized_tail() {
        let mut bytes = vec![1u8; 0x300];
        bytes[0x200..].fill(2);
        // 0x200 * 1 + (0x100 * 2) * 2
        assert_eq!(compute_checksum(&bytes), 0x600);
    }

    #[test]
    fn vector_labels() {
        let v = Vector { kind: VectorKind::Nmi, emulation: true, target: Address::new(0, 0x8000), offset: 0 };
        assert_eq!(v.label(), "vec_emu_nmi");
        let v = Vector { kind: VectorKind::Nmi, emulation: false, ..v };
        assert_eq!(v.label(), "vec_nmi");
    }
}

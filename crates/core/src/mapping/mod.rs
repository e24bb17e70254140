//! Conversion between linear ROM offsets and console (bank:offset) addresses.
//!
//! Three cartridge layouts are supported:
//! - LoROM: 32 KiB banks mapped at `$8000-$FFFF` of banks `$00-$7D` (mirrored at `$80-$FF`).
//! - HiROM: 64 KiB banks mapped at `$C0-$FF` (mirrored at `$40-$7D`, upper halves at `$00-$3F`/`$80-$BF`).
//! - ExHiROM: HiROM for the first 4 MiB, banks `$40-$7D` for the rest.
//!
//! `to_offset` accepts every mirror; `to_address` always answers with the
//! canonical address so that `to_offset(to_address(o)) == o`.

use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MappingError;
use crate::model::Address;

const LOROM_BANK: usize = 0x8000;
const HIROM_BANK: usize = 0x1_0000;
const EXHIROM_SPLIT: usize = 0x40_0000;

/// Memory-mapping mode of a cartridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingMode {
    LoRom,
    HiRom,
    ExHiRom,
}

impl MappingMode {
    pub const ALL: [MappingMode; 3] = [MappingMode::LoRom, MappingMode::HiRom, MappingMode::ExHiRom];

    /// Bank granularity in bytes.
    pub fn bank_size(self) -> usize {
        match self {
            MappingMode::LoRom => LOROM_BANK,
            MappingMode::HiRom | MappingMode::ExHiRom => HIROM_BANK,
        }
    }

    /// Linear offset of the internal header inside the (stripped) image.
    pub fn header_offset(self) -> usize {
        match self {
            MappingMode::LoRom => 0x7FC0,
            MappingMode::HiRom => 0xFFC0,
            MappingMode::ExHiRom => 0x40_FFC0,
        }
    }

    /// Largest image the mode can address without colliding with work RAM.
    pub fn max_image_size(self) -> usize {
        match self {
            MappingMode::LoRom => 0x80 * LOROM_BANK,
            MappingMode::HiRom => 0x40 * HIROM_BANK,
            MappingMode::ExHiRom => EXHIROM_SPLIT + 0x3E * HIROM_BANK,
        }
    }

    /// Interpret the low nibble of the header's map-mode byte.
    pub fn from_map_mode_byte(byte: u8) -> Option<Self> {
        match byte & 0x0F {
            0x00 | 0x02 | 0x03 => Some(MappingMode::LoRom),
            0x01 => Some(MappingMode::HiRom),
            0x05 => Some(MappingMode::ExHiRom),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MappingMode::LoRom => "lorom",
            MappingMode::HiRom => "hirom",
            MappingMode::ExHiRom => "exhirom",
        }
    }
}

impl fmt::Display for MappingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MappingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lorom" | "lo" => Ok(MappingMode::LoRom),
            "hirom" | "hi" => Ok(MappingMode::HiRom),
            "exhirom" | "exhi" => Ok(MappingMode::ExHiRom),
            other => Err(format!("Unknown mapping mode '{other}'. Allowed: lorom, hirom, exhirom")),
        }
    }
}

/// Pure offset <-> address arithmetic for one image size under one mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressMapper {
    mode: MappingMode,
    size: usize,
}

impl AddressMapper {
    pub fn new(mode: MappingMode, size: usize) -> Self {
        Self { mode, size }
    }

    /// Like [`AddressMapper::new`] but rejects sizes the bank arithmetic cannot describe.
    pub fn checked(mode: MappingMode, size: usize) -> Result<Self, MappingError> {
        let mapper = Self::new(mode, size);
        mapper.validate()?;
        Ok(mapper)
    }

    pub fn mode(&self) -> MappingMode {
        self.mode
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of banks, counting a trailing partial bank.
    pub fn bank_count(&self) -> usize {
        self.size.div_ceil(self.mode.bank_size())
    }

    /// Linear range covered by bank number `index` (0-based, not the console bank byte).
    pub fn bank_range(&self, index: usize) -> Range<usize> {
        let bank = self.mode.bank_size();
        let start = (index * bank).min(self.size);
        start..(start + bank).min(self.size)
    }

    /// Check that the image size agrees with the mode's bank arithmetic.
    pub fn validate(&self) -> Result<(), MappingError> {
        let invalid = |reason: String| MappingError::InvalidMapping {
            mode: self.mode,
            size: self.size,
            reason,
        };
        if self.size == 0 {
            return Err(invalid("image is empty".into()));
        }
        if self.size % self.mode.bank_size() != 0 {
            return Err(invalid(format!(
                "size is not a multiple of the {:#X}-byte bank",
                self.mode.bank_size()
            )));
        }
        if self.size > self.mode.max_image_size() {
            return Err(invalid(format!(
                "size exceeds the {:#X}-byte address space",
                self.mode.max_image_size()
            )));
        }
        if self.mode == MappingMode::ExHiRom && self.size <= EXHIROM_SPLIT {
            return Err(invalid("ExHiROM images are larger than 4 MiB".into()));
        }
        Ok(())
    }

    /// Canonical console address of a linear offset.
    pub fn to_address(&self, offset: usize) -> Result<Address, MappingError> {
        if offset >= self.size || offset >= self.mode.max_image_size() {
            return Err(MappingError::OffsetOutOfRange { offset, size: self.size });
        }
        let address = match self.mode {
            MappingMode::LoRom => {
                let index = offset / LOROM_BANK;
                let bank = if index < 0x7E { index as u8 } else { 0x80 | index as u8 };
                Address::new(bank, 0x8000 | (offset % LOROM_BANK) as u16)
            }
            MappingMode::HiRom => {
                Address::new(0xC0 + (offset / HIROM_BANK) as u8, (offset % HIROM_BANK) as u16)
            }
            MappingMode::ExHiRom => {
                if offset < EXHIROM_SPLIT {
                    Address::new(0xC0 + (offset / HIROM_BANK) as u8, (offset % HIROM_BANK) as u16)
                } else {
                    let rel = offset - EXHIROM_SPLIT;
                    Address::new(0x40 + (rel / HIROM_BANK) as u8, (rel % HIROM_BANK) as u16)
                }
            }
        };
        Ok(address)
    }

    /// Linear offset of a console address, accepting mirrors.
    pub fn to_offset(&self, address: Address) -> Result<usize, MappingError> {
        let out_of_range = || MappingError::OutOfRange { address, mode: self.mode };
        let bank = address.bank as usize;
        let addr = address.offset as usize;
        let upper_half = addr >= 0x8000;

        let offset = match self.mode {
            MappingMode::LoRom => {
                if !upper_half || address.bank == 0x7E || address.bank == 0x7F {
                    return Err(out_of_range());
                }
                (bank & 0x7F) * LOROM_BANK + (addr - 0x8000)
            }
            MappingMode::HiRom => match address.bank {
                0xC0..=0xFF => (bank - 0xC0) * HIROM_BANK + addr,
                0x40..=0x7D => (bank - 0x40) * HIROM_BANK + addr,
                0x00..=0x3F | 0x80..=0xBF if upper_half => (bank & 0x3F) * HIROM_BANK + addr,
                _ => return Err(out_of_range()),
            },
            MappingMode::ExHiRom => match address.bank {
                0xC0..=0xFF => (bank - 0xC0) * HIROM_BANK + addr,
                0x40..=0x7D => EXHIROM_SPLIT + (bank - 0x40) * HIROM_BANK + addr,
                0x80..=0xBF if upper_half => (bank - 0x80) * HIROM_BANK + addr,
                0x00..=0x3D if upper_half => EXHIROM_SPLIT + bank * HIROM_BANK + addr,
                _ => return Err(out_of_range()),
            },
        };

        if offset >= self.size {
            return Err(out_of_range());
        }
        Ok(offset)
    }

    /// `to_offset` without the error detail.
    pub fn resolve(&self, address: Address) -> Option<usize> {
        self.to_offset(address).ok()
    }

    pub fn is_mapped(&self, address: Address) -> bool {
        self.resolve(address).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lorom_maps_upper_half_of_each_bank() {
        let mapper = AddressMapper::new(MappingMode::LoRom, 0x10_0000);
        assert_eq!(mapper.to_address(0).unwrap(), Address::new(0x00, 0x8000));
        assert_eq!(mapper.to_address(0x7FFF).unwrap(), Address::new(0x00, 0xFFFF));
        assert_eq!(mapper.to_address(0x8000).unwrap(), Address::new(0x01, 0x8000));
        assert_eq!(mapper.to_offset(Address::new(0x81, 0x8000)).unwrap(), 0x8000);
        assert!(mapper.to_offset(Address::new(0x00, 0x1234)).is_err());
        assert!(mapper.to_offset(Address::new(0x7E, 0x8000)).is_err());
    }

    #[test]
    fn hirom_accepts_all_mirrors() {
        let mapper = AddressMapper::new(MappingMode::HiRom, 0x20_0000);
        assert_eq!(mapper.to_address(0x1_2345).unwrap(), Address::new(0xC1, 0x2345));
        assert_eq!(mapper.to_offset(Address::new(0x41, 0x2345)).unwrap(), 0x1_2345);
        assert_eq!(mapper.to_offset(Address::new(0x01, 0x8000)).unwrap(), 0x1_8000);
        assert_eq!(mapper.to_offset(Address::new(0x81, 0x8000)).unwrap(), 0x1_8000);
        assert!(mapper.to_offset(Address::new(0x01, 0x2345)).is_err());
        assert!(mapper.to_offset(Address::new(0xE0, 0x0000)).is_err(), "past end of image");
    }

    #[test]
    fn exhirom_places_upper_image_in_bank_40() {
        let mapper = AddressMapper::new(MappingMode::ExHiRom, 0x60_0000);
        assert_eq!(mapper.to_address(0x40_0000).unwrap(), Address::new(0x40, 0x0000));
        assert_eq!(mapper.to_offset(Address::new(0x00, 0x8000)).unwrap(), 0x40_8000);
        assert_eq!(mapper.to_offset(Address::new(0x80, 0xFFC0)).unwrap(), 0xFFC0);
        assert!(mapper.validate().is_ok());
    }

    #[test]
    fn validate_rejects_inconsistent_sizes() {
        assert!(AddressMapper::checked(MappingMode::LoRom, 0x8000 + 3).is_err());
        assert!(AddressMapper::checked(MappingMode::HiRom, 0x8000).is_err());
        assert!(AddressMapper::checked(MappingMode::ExHiRom, 0x40_0000).is_err());
        assert!(AddressMapper::checked(MappingMode::HiRom, 0x50_0000).is_err());
        assert!(AddressMapper::checked(MappingMode::LoRom, 0x8000).is_ok());
    }

    #[test]
    fn mode_parses_from_text_and_header_byte() {
        assert_eq!("HiROM".parse::<MappingMode>().unwrap(), MappingMode::HiRom);
        assert!("mode7".parse::<MappingMode>().is_err());
        assert_eq!(MappingMode::from_map_mode_byte(0x20), Some(MappingMode::LoRom));
        assert_eq!(MappingMode::from_map_mode_byte(0x31), Some(MappingMode::HiRom));
        assert_eq!(MappingMode::from_map_mode_byte(0x35), Some(MappingMode::ExHiRom));
        assert_eq!(MappingMode::from_map_mode_byte(0x2A), None);
    }
}
